mod common;

use anyhow::Result;
use common::{fetch_html, ready_surface, settle};
use futures::FutureExt;
use quill_bridge::{
    AssetStager, BridgeError, Command, DirectoryStager, FocusArbiter, Format, ListType,
    ParagraphStyle, Position, Reply, StagingPlan, TableArea, TableBorder,
};
use serde_json::json;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

#[test]
fn bold_then_undo_then_redo() -> Result<()> {
    let arbiter = FocusArbiter::new();
    let (mut surface, engine, events) = ready_surface(&arbiter, "Hello world")?;
    engine.select(0, 5);

    let mut mutation = surface.mutate(Command::ToggleFormat { format: Format::Bold });
    surface.pump();
    assert_eq!(
        (&mut mutation.completion).now_or_never().transpose()?,
        Some(Reply::Done(None))
    );
    // Completed, but not yet on the undo stack.
    assert!((&mut mutation.committed).now_or_never().is_none());

    surface.pump();
    pollster::block_on(mutation.committed)?;
    assert_eq!(events.count("undo_set"), 1);
    assert_eq!(fetch_html(&mut surface, &engine)?, "<b>Hello</b> world");

    let undo = surface.undo();
    settle(&mut surface, &engine);
    pollster::block_on(undo)?;
    assert_eq!(fetch_html(&mut surface, &engine)?, "Hello world");

    let redo = surface.redo();
    settle(&mut surface, &engine);
    pollster::block_on(redo)?;
    assert_eq!(fetch_html(&mut surface, &engine)?, "<b>Hello</b> world");
    Ok(())
}

#[test]
fn every_mutating_command_round_trips_through_undo() -> Result<()> {
    let arbiter = FocusArbiter::new();
    let (mut surface, engine, _events) = ready_surface(&arbiter, "Hello world")?;
    engine.select(0, 5);

    let mut commands: Vec<Command> = Format::ALL
        .iter()
        .map(|format| Command::ToggleFormat { format: *format })
        .collect();
    commands.extend([
        Command::ReplaceStyle {
            old: ParagraphStyle::Paragraph,
            new: ParagraphStyle::H2,
        },
        Command::ToggleList { list: ListType::Bullet },
        Command::Indent,
        Command::Outdent,
        Command::InsertTable { rows: 2, cols: 3 },
        Command::AddRow {
            position: Position::After,
        },
        Command::AddCol {
            position: Position::Before,
        },
        Command::AddHeader { colspan: true },
        Command::DeleteTableArea {
            area: TableArea::Row,
        },
        Command::DeleteTableArea {
            area: TableArea::Col,
        },
        Command::DeleteTableArea {
            area: TableArea::Table,
        },
        Command::BorderTable {
            border: TableBorder::Outer,
        },
        Command::InsertLink {
            href: "https://example.com/?q=\"x\"".to_string(),
        },
        Command::DeleteLink,
        Command::InsertImage {
            src: "x.png".to_string(),
            alt: Some("An x".to_string()),
        },
        Command::ModifyImage {
            src: None,
            alt: None,
            scale: Some(50),
        },
        Command::PasteText {
            text: "pasted </script> text".to_string(),
        },
        Command::PasteHtml {
            html: "<i>pasted</i>".to_string(),
        },
        Command::EmptyDocument,
    ]);

    for command in commands {
        assert!(command.is_mutating(), "{} should mutate", command.name());
        let before = fetch_html(&mut surface, &engine)?;

        let mark = surface.undo_mark();
        let mutation = surface.mutate(command.clone());
        settle(&mut surface, &engine);
        pollster::block_on(mutation.completion)?;
        pollster::block_on(mutation.committed)?;
        assert!(surface.undo_mark() > mark);

        let after = fetch_html(&mut surface, &engine)?;
        assert_ne!(before, after, "{} changed nothing", command.name());

        let undo = surface.undo();
        settle(&mut surface, &engine);
        pollster::block_on(undo)?;
        assert_eq!(
            fetch_html(&mut surface, &engine)?,
            before,
            "undo of {}",
            command.name()
        );

        let redo = surface.redo();
        settle(&mut surface, &engine);
        pollster::block_on(redo)?;
        assert_eq!(
            fetch_html(&mut surface, &engine)?,
            after,
            "redo of {}",
            command.name()
        );
    }
    assert_eq!(surface.pending_count(), 0);
    Ok(())
}

#[test]
fn pipelined_mutations_each_wait_for_their_own_undo_entry() -> Result<()> {
    let arbiter = FocusArbiter::new();
    let (mut surface, engine, _events) = ready_surface(&arbiter, "Hello world")?;
    engine.select(0, 5);
    engine.hold(true);

    let mut bold = surface.mutate(Command::ToggleFormat { format: Format::Bold });
    let mut italic = surface.mutate(Command::ToggleFormat { format: Format::Italic });
    assert_eq!(surface.uncommitted_mutations(), 2);

    // The engine confirms the first entry only.
    surface.on_receive("undoSet");
    assert!((&mut bold.committed).now_or_never().transpose()?.is_some());
    assert!((&mut italic.committed).now_or_never().is_none());
    assert_eq!(surface.uncommitted_mutations(), 1);

    surface.on_receive("undoSet");
    assert!((&mut italic.committed).now_or_never().transpose()?.is_some());
    assert_eq!(surface.uncommitted_mutations(), 0);

    engine.release();
    settle(&mut surface, &engine);
    assert_eq!(pollster::block_on(bold.completion)?, Reply::Done(None));
    assert_eq!(pollster::block_on(italic.completion)?, Reply::Done(None));
    Ok(())
}

#[test]
fn failed_mutation_does_not_take_the_next_commit() -> Result<()> {
    let arbiter = FocusArbiter::new();
    let (mut surface, engine, _events) = ready_surface(&arbiter, "Hello world")?;
    engine.select(0, 5);
    engine.fail("toggleItalic");

    let failed = surface.mutate(Command::ToggleFormat { format: Format::Italic });
    let mut bold = surface.mutate(Command::ToggleFormat { format: Format::Bold });

    // Completions first: the failure leaves the queue before any undoSet.
    surface.pump();
    assert!(matches!(
        pollster::block_on(failed.completion),
        Err(BridgeError::Engine(_))
    ));
    assert!(matches!(
        pollster::block_on(failed.committed),
        Err(BridgeError::InvalidState(_))
    ));
    assert!((&mut bold.committed).now_or_never().is_none());

    settle(&mut surface, &engine);
    pollster::block_on(bold.committed)?;
    assert_eq!(surface.uncommitted_mutations(), 0);

    let undo = surface.undo();
    settle(&mut surface, &engine);
    pollster::block_on(undo)?;
    assert_eq!(fetch_html(&mut surface, &engine)?, "Hello world");
    Ok(())
}

#[test]
fn rejected_paste_mutation_never_commits() -> Result<()> {
    let arbiter = FocusArbiter::new();
    let (mut surface, engine, _events) = ready_surface(&arbiter, "")?;

    let first = surface.mutate(Command::PasteText {
        text: "one".to_string(),
    });
    let second = surface.mutate(Command::PasteText {
        text: "two".to_string(),
    });
    assert!(matches!(
        pollster::block_on(second.completion),
        Err(BridgeError::PasteInFlight)
    ));
    assert!(pollster::block_on(second.committed).is_err());
    assert_eq!(surface.uncommitted_mutations(), 1);

    settle(&mut surface, &engine);
    pollster::block_on(first.committed)?;
    assert_eq!(engine.html(), "one");
    Ok(())
}

#[test]
fn out_of_order_completions_resolve_exactly_once() -> Result<()> {
    let arbiter = FocusArbiter::new();
    let (mut surface, engine, events) = ready_surface(&arbiter, "")?;
    engine.reverse_completions(true);

    let insert_calls = Rc::new(Cell::new(0));
    let modify_calls = Rc::new(Cell::new(0));
    let order = Rc::new(RefCell::new(Vec::new()));

    let (calls, seen) = (insert_calls.clone(), order.clone());
    surface.issue_with(
        Command::InsertImage {
            src: "x.png".to_string(),
            alt: None,
        },
        move |result| {
            assert!(result.is_ok());
            calls.set(calls.get() + 1);
            seen.borrow_mut().push("insertImage");
        },
    );
    let (calls, seen) = (modify_calls.clone(), order.clone());
    surface.issue_with(
        Command::ModifyImage {
            src: None,
            alt: None,
            scale: Some(50),
        },
        move |result| {
            assert!(result.is_ok());
            calls.set(calls.get() + 1);
            seen.borrow_mut().push("modifyImage");
        },
    );
    assert_eq!(surface.pending_count(), 2);

    settle(&mut surface, &engine);
    assert_eq!(insert_calls.get(), 1);
    assert_eq!(modify_calls.get(), 1);
    assert_eq!(*order.borrow(), vec!["modifyImage", "insertImage"]);
    assert_eq!(surface.pending_count(), 0);

    assert!(surface.images().contains("x.png"));
    assert!(events.contains("image_added:x.png"));
    Ok(())
}

#[test]
fn engine_errors_reach_only_their_own_command() -> Result<()> {
    let arbiter = FocusArbiter::new();
    let (mut surface, engine, _events) = ready_surface(&arbiter, "Hello")?;
    engine.fail("indent");

    let failing = surface.request(Command::Indent);
    let fine = surface.request(Command::Outdent);
    surface.issue(Command::Indent);
    settle(&mut surface, &engine);

    assert!(matches!(
        pollster::block_on(failing),
        Err(BridgeError::Engine(_))
    ));
    assert_eq!(pollster::block_on(fine)?, Reply::Done(None));
    assert!(surface.is_ready());
    Ok(())
}

#[test]
fn transport_failure_resolves_the_command() -> Result<()> {
    let arbiter = FocusArbiter::new();
    let (mut surface, engine, _events) = ready_surface(&arbiter, "")?;
    engine.refuse_evaluate(true);

    let reply = surface.request(Command::Indent);
    assert!(matches!(
        pollster::block_on(reply),
        Err(BridgeError::Transport(_))
    ));
    assert_eq!(surface.pending_count(), 0);
    Ok(())
}

#[test]
fn only_one_paste_in_flight() -> Result<()> {
    let arbiter = FocusArbiter::new();
    let (mut surface, engine, _events) = ready_surface(&arbiter, "")?;

    let first = surface.request(Command::PasteText {
        text: "one".to_string(),
    });
    let second = surface.request(Command::PasteHtml {
        html: "<b>two</b>".to_string(),
    });
    assert!(surface.is_paste_in_flight());
    assert!(matches!(
        pollster::block_on(second),
        Err(BridgeError::PasteInFlight)
    ));

    settle(&mut surface, &engine);
    pollster::block_on(first)?;
    assert!(!surface.is_paste_in_flight());

    let third = surface.request(Command::PasteText {
        text: " three".to_string(),
    });
    settle(&mut surface, &engine);
    pollster::block_on(third)?;
    assert_eq!(engine.html(), "one three");
    Ok(())
}

#[test]
fn malformed_messages_leave_selection_untouched() -> Result<()> {
    let arbiter = FocusArbiter::new();
    let (mut surface, engine, events) = ready_surface(&arbiter, "Hello")?;
    engine.set_selection_state(json!({
        "valid": true,
        "selection": "Hello",
        "bold": true,
        "style": "P",
    }));
    let state = surface.get_selection_state();
    settle(&mut surface, &engine);
    let fetched = pollster::block_on(state)?;
    assert!(fetched.has_format(Format::Bold));
    let cached = surface.selection_state().clone();
    assert_eq!(cached, fetched);

    for noise in [
        "",
        "   ",
        "{not json",
        "[1, 2, 3]",
        r#"{"messageType": 7}"#,
        r#"{"bold": false}"#,
        r#"{"messageType": "teleport", "to": "mars"}"#,
        "somethingNew",
        "\"quoted\"",
    ] {
        surface.on_receive(noise);
    }
    settle(&mut surface, &engine);
    assert_eq!(surface.selection_state(), &cached);
    assert!(!events.contains("selection_changed"));
    Ok(())
}

#[test]
fn selection_fetch_is_idempotent() -> Result<()> {
    let arbiter = FocusArbiter::new();
    let (mut surface, engine, _events) = ready_surface(&arbiter, "Hello")?;
    engine.set_selection_state(json!({
        "valid": true,
        "divid": "editor",
        "table": true,
        "rows": 2,
        "cols": "3",
        "border": "outer",
        "href": "https://example.com",
    }));

    let first = surface.get_selection_state();
    settle(&mut surface, &engine);
    let first = pollster::block_on(first)?;
    let second = surface.get_selection_state();
    settle(&mut surface, &engine);
    let second = pollster::block_on(second)?;

    assert_eq!(first, second);
    assert_eq!(surface.selection_state(), &second);
    assert!(second.is_in_table());
    assert_eq!(second.table.cols, 3);
    assert_eq!(second.table.border, TableBorder::Outer);
    Ok(())
}

#[test]
fn failed_selection_fetch_resets_to_invalid() -> Result<()> {
    let arbiter = FocusArbiter::new();
    let (mut surface, engine, _events) = ready_surface(&arbiter, "Hello")?;
    engine.set_selection_state(json!({ "valid": true, "italic": true }));
    let state = surface.get_selection_state();
    settle(&mut surface, &engine);
    pollster::block_on(state)?;
    assert!(surface.selection_state().is_valid());

    engine.fail("getSelectionState");
    let state = surface.get_selection_state();
    settle(&mut surface, &engine);
    assert!(pollster::block_on(state).is_err());
    assert!(!surface.selection_state().is_valid());
    Ok(())
}

#[test]
fn update_height_notifies_on_change_only() -> Result<()> {
    let arbiter = FocusArbiter::new();
    let (mut surface, engine, events) = ready_surface(&arbiter, "")?;
    assert_eq!(surface.height(), None);

    engine.post("updateHeight");
    settle(&mut surface, &engine);
    assert_eq!(surface.height(), Some(120));

    engine.post("updateHeight");
    settle(&mut surface, &engine);
    assert_eq!(events.count("height_changed:120"), 1);
    Ok(())
}

#[test]
fn simple_notifications_reach_the_delegate() -> Result<()> {
    let arbiter = FocusArbiter::new();
    let (mut surface, engine, events) = ready_surface(&arbiter, "")?;
    events.clear();

    for raw in [
        "input",
        "input:title",
        "click",
        "activateSearch",
        "searched",
    ] {
        engine.post(raw);
    }
    settle(&mut surface, &engine);
    assert!(surface.is_search_active());

    engine.post("deactivateSearch");
    settle(&mut surface, &engine);
    assert!(!surface.is_search_active());

    assert_eq!(
        events.all(),
        vec![
            "input:",
            "input:title",
            "clicked",
            "search_activated",
            "searched",
            "search_deactivated",
        ]
    );
    Ok(())
}

#[test]
fn structured_notifications_reach_the_delegate() -> Result<()> {
    let arbiter = FocusArbiter::new();
    let (mut surface, _engine, events) = ready_surface(&arbiter, "")?;
    events.clear();

    let clicks = Rc::new(Cell::new(0.0));
    let seen = clicks.clone();
    surface.register_button("save", move |rect| seen.set(rect.width));

    surface.on_receive(r#"{"messageType":"buttonClicked","id":"save","rect":{"x":1,"y":2,"width":30,"height":10}}"#);
    surface.on_receive(r#"{"messageType":"buttonClicked","id":"ghost"}"#);
    surface.on_receive(r#"{"messageType":"addedImage","src":"a.png","divId":"editor"}"#);
    surface.on_receive(r#"{"messageType":"addedImage","src":"b.png"}"#);
    surface.on_receive(r#"{"messageType":"deletedImage","src":"a.png"}"#);
    surface.on_receive(r#"{"messageType":"copyImage","src":"b.png","dimensions":{"width":4,"height":5}}"#);
    surface.on_receive(r#"{"messageType":"error","code":"E42","message":"boom","alert":true}"#);
    surface.on_receive(r#"{"messageType":"log","log":"hello from the engine"}"#);
    surface.on_receive(r#"{"messageType":"action","action":"bold"}"#);

    assert_eq!(clicks.get(), 30.0);
    assert_eq!(surface.images().iter().collect::<Vec<_>>(), vec!["b.png"]);
    assert_eq!(
        events.all(),
        vec![
            "button_clicked:save",
            "button_clicked:ghost",
            "image_added:a.png",
            "image_added:b.png",
            "image_deleted:a.png",
            "copy_image:b.png",
            "error:E42",
            "action:bold",
        ]
    );

    assert!(surface.unregister_button("save"));
    surface.on_receive(r#"{"messageType":"buttonClicked","id":"save","rect":{"width":99}}"#);
    assert_eq!(clicks.get(), 30.0);
    Ok(())
}

#[test]
fn directory_stager_feeds_the_surface() -> Result<()> {
    let root = tempfile::tempdir()?;
    let staging = tempfile::tempdir()?;
    std::fs::write(root.path().join("markup.html"), "<html></html>")?;
    std::fs::write(root.path().join("markup.css"), "body {}")?;
    std::fs::write(root.path().join("markup.js"), "var MU = {};")?;

    let mut config = quill_config::QuillConfig::default();
    config.resources.root_dir = root.path().to_path_buf();
    config.resources.staging_dir = staging.path().to_path_buf();

    let plan = StagingPlan::from_config(&config.resources);
    let staged = DirectoryStager::new().stage(&plan)?;
    assert!(staged.base_url.ends_with("markup.html"));
    assert!(staging.path().join("markup.css").exists());
    Ok(())
}
