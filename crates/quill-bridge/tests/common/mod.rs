//! Scripted in-memory engine shared by the integration tests.
#![allow(dead_code)]

use anyhow::{Result, bail};
use quill_bridge::{
    AssetStager, BridgeError, Dimensions, EngineError, EvalOutcome, FocusArbiter, Inbound,
    InvocationId, Rect, SelectionState, StagedAssets, StagingPlan, Surface, SurfaceBuilder,
    SurfaceDelegate, SurfaceId, Transport,
};
use serde_json::{Value, json};
use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::rc::Rc;

const FORMAT_TAGS: &[(&str, &str)] = &[
    ("toggleBold", "b"),
    ("toggleItalic", "i"),
    ("toggleUnderline", "u"),
    ("toggleStrike", "s"),
    ("toggleSubscript", "sub"),
    ("toggleSuperscript", "sup"),
    ("toggleCode", "code"),
];

const MARKED_MUTATIONS: &[&str] = &[
    "replaceStyle",
    "toggleListItem",
    "indent",
    "outdent",
    "insertTable",
    "addRow",
    "addCol",
    "addHeader",
    "deleteTableArea",
    "borderTable",
    "insertLink",
    "deleteLink",
    "modifyImage",
];

#[derive(Default)]
struct EngineState {
    loaded_url: Option<String>,
    html: String,
    selection: (usize, usize),
    selection_state: Value,
    focused: bool,
    attributes: Option<Value>,
    placeholder: Option<String>,
    undo: Vec<String>,
    redo: Vec<String>,
    evaluated: Vec<String>,
    fetched_while_focused: Vec<bool>,
    outbox: Vec<Inbound>,
    deferred: Vec<Inbound>,
    held: VecDeque<Inbound>,
    hold: bool,
    reverse: bool,
    failing: HashSet<String>,
    refuse_evaluate: bool,
}

/// A tiny engine: a document string, a selection range and an undo stack.
///
/// Everything it sends back arrives on the next pump; `undoSet` arrives one
/// pump after the completion of the mutation that caused it.
#[derive(Clone, Default)]
pub struct FakeEngine {
    state: Rc<RefCell<EngineState>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        let engine = Self::default();
        engine.state.borrow_mut().selection_state = json!({ "valid": false });
        engine
    }

    pub fn html(&self) -> String {
        self.state.borrow().html.clone()
    }

    pub fn select(&self, start: usize, end: usize) {
        self.state.borrow_mut().selection = (start, end);
    }

    pub fn set_selection_state(&self, state: Value) {
        self.state.borrow_mut().selection_state = state;
    }

    /// Queue a raw message as if the engine posted it.
    pub fn post(&self, raw: &str) {
        self.state
            .borrow_mut()
            .outbox
            .push(Inbound::Posted(raw.to_string()));
    }

    /// Make every call to `name` fail.
    pub fn fail(&self, name: &str) {
        self.state.borrow_mut().failing.insert(name.to_string());
    }

    pub fn refuse_evaluate(&self, refuse: bool) {
        self.state.borrow_mut().refuse_evaluate = refuse;
    }

    /// Deliver each batch in reverse order.
    pub fn reverse_completions(&self, reverse: bool) {
        self.state.borrow_mut().reverse = reverse;
    }

    /// Keep completions back until [`FakeEngine::release`].
    pub fn hold(&self, hold: bool) {
        self.state.borrow_mut().hold = hold;
    }

    pub fn release(&self) {
        let mut state = self.state.borrow_mut();
        state.hold = false;
        let held: Vec<_> = state.held.drain(..).collect();
        state.outbox.extend(held);
    }

    /// Names of every engine function called so far, in order.
    pub fn evaluated(&self) -> Vec<String> {
        self.state.borrow().evaluated.clone()
    }

    pub fn evaluated_count(&self, name: &str) -> usize {
        self.state
            .borrow()
            .evaluated
            .iter()
            .filter(|n| n.as_str() == name)
            .count()
    }

    /// For each selection fetch, whether the engine was focused at the time.
    pub fn fetched_while_focused(&self) -> Vec<bool> {
        self.state.borrow().fetched_while_focused.clone()
    }

    pub fn loaded_url(&self) -> Option<String> {
        self.state.borrow().loaded_url.clone()
    }

    pub fn attributes(&self) -> Option<Value> {
        self.state.borrow().attributes.clone()
    }

    pub fn placeholder(&self) -> Option<String> {
        self.state.borrow().placeholder.clone()
    }

    pub fn is_idle(&self) -> bool {
        let state = self.state.borrow();
        state.outbox.is_empty() && state.deferred.is_empty()
    }
}

impl EngineState {
    fn complete(&mut self, invocation: InvocationId, outcome: EvalOutcome) {
        let item = Inbound::Completed {
            invocation,
            outcome,
        };
        if self.hold {
            self.held.push_back(item);
        } else {
            self.outbox.push(item);
        }
    }

    fn mutate(&mut self, apply: impl FnOnce(&mut String)) {
        self.undo.push(self.html.clone());
        self.redo.clear();
        apply(&mut self.html);
        self.deferred.push(Inbound::Posted("undoSet".to_string()));
    }

    fn run(&mut self, name: &str, args: &[Value]) -> EvalOutcome {
        if self.failing.contains(name) {
            return Err(format!("{} failed", name));
        }
        let text = |i: usize| args.get(i).and_then(Value::as_str).unwrap_or("").to_string();

        if let Some((_, tag)) = FORMAT_TAGS.iter().find(|(n, _)| *n == name) {
            let (start, end) = self.selection;
            let len = self.html.len();
            let (start, end) = (start.min(len), end.min(len).max(start.min(len)));
            self.mutate(|html| {
                let inner = html.get(start..end).unwrap_or("").to_string();
                html.replace_range(start..end, &format!("<{tag}>{inner}</{tag}>"));
            });
            return Ok(None);
        }
        if MARKED_MUTATIONS.contains(&name) {
            self.mutate(|html| html.push_str(&format!("<!--{}-->", name)));
            return Ok(None);
        }

        match name {
            "loadUserFiles" => {
                self.deferred.push(Inbound::Posted("loadedUserFiles".to_string()));
                Ok(None)
            }
            "setTopLevelAttributes" => {
                self.attributes = args.first().cloned();
                Ok(None)
            }
            "setPlaceholder" => {
                self.placeholder = Some(text(0));
                Ok(None)
            }
            "setHTML" => {
                self.html = text(0);
                Ok(None)
            }
            "getHTML" => Ok(Some(Value::String(self.html.clone()))),
            "emptyDocument" => {
                self.mutate(String::clear);
                Ok(None)
            }
            "insertImage" => {
                let src = text(0);
                self.mutate(|html| html.push_str(&format!("<img src=\"{}\">", src)));
                let added = json!({ "messageType": "addedImage", "src": src, "divId": "editor" });
                self.deferred.push(Inbound::Posted(added.to_string()));
                Ok(None)
            }
            "pasteText" | "pasteHTML" => {
                let pasted = text(0);
                self.mutate(|html| html.push_str(&pasted));
                Ok(None)
            }
            "undo" => {
                if let Some(previous) = self.undo.pop() {
                    let current = std::mem::replace(&mut self.html, previous);
                    self.redo.push(current);
                }
                Ok(None)
            }
            "redo" => {
                if let Some(next) = self.redo.pop() {
                    let current = std::mem::replace(&mut self.html, next);
                    self.undo.push(current);
                }
                Ok(None)
            }
            "focus" => {
                self.focused = true;
                self.deferred.push(Inbound::Posted("focus".to_string()));
                Ok(None)
            }
            "getSelectionState" => {
                self.fetched_while_focused.push(self.focused);
                Ok(Some(self.selection_state.clone()))
            }
            "getHeight" => Ok(Some(json!(120))),
            "searchFor" | "resetSelection" | "teardown" => Ok(None),
            other => Err(format!("unknown function {}", other)),
        }
    }
}

fn parse_call(script: &str) -> Option<(String, Vec<Value>)> {
    let (call, rest) = script.split_once('(')?;
    let name = call.rsplit('.').next()?.to_string();
    let args = rest.strip_suffix(')')?;
    let args: Vec<Value> = serde_json::from_str(&format!("[{}]", args)).ok()?;
    Some((name, args))
}

impl Transport for FakeEngine {
    fn load(&mut self, base_url: &str) -> quill_bridge::Result<()> {
        let mut state = self.state.borrow_mut();
        state.loaded_url = Some(base_url.to_string());
        state.outbox.push(Inbound::Posted("ready".to_string()));
        Ok(())
    }

    fn evaluate(&mut self, invocation: InvocationId, script: &str) -> quill_bridge::Result<()> {
        let mut state = self.state.borrow_mut();
        if state.refuse_evaluate {
            return Err(BridgeError::Transport("engine unreachable".to_string()));
        }
        let Some((name, args)) = parse_call(script) else {
            state.complete(invocation, Err(format!("unparseable script {}", script)));
            return Ok(());
        };
        state.evaluated.push(name.clone());
        let outcome = state.run(&name, &args);
        state.complete(invocation, outcome);
        Ok(())
    }

    fn pump(&mut self) -> Vec<Inbound> {
        let mut state = self.state.borrow_mut();
        let mut items: Vec<Inbound> = state.outbox.drain(..).collect();
        let deferred: Vec<Inbound> = state.deferred.drain(..).collect();
        state.outbox.extend(deferred);
        if state.reverse {
            items.reverse();
        }
        items
    }
}

/// Shared record of delegate notifications.
#[derive(Clone, Default)]
pub struct Events(Rc<RefCell<Vec<String>>>);

impl Events {
    pub fn push(&self, event: impl Into<String>) {
        self.0.borrow_mut().push(event.into());
    }

    pub fn all(&self) -> Vec<String> {
        self.0.borrow().clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.0.borrow().iter().filter(|e| e.as_str() == event).count()
    }

    pub fn contains(&self, event: &str) -> bool {
        self.count(event) > 0
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

pub struct RecordingDelegate {
    events: Events,
}

impl RecordingDelegate {
    pub fn new(events: Events) -> Self {
        Self { events }
    }
}

impl SurfaceDelegate for RecordingDelegate {
    fn input_received(&mut self, _: SurfaceId, region: Option<&str>) {
        self.events.push(format!("input:{}", region.unwrap_or("")));
    }

    fn height_changed(&mut self, _: SurfaceId, height: u32) {
        self.events.push(format!("height_changed:{}", height));
    }

    fn took_focus(&mut self, _: SurfaceId) {
        self.events.push("took_focus");
    }

    fn lost_focus(&mut self, _: SurfaceId) {
        self.events.push("lost_focus");
    }

    fn will_load(&mut self, _: SurfaceId) {
        self.events.push("will_load");
    }

    fn did_load(&mut self, _: SurfaceId) {
        self.events.push("did_load");
    }

    fn load_failed(&mut self, _: SurfaceId, _: &BridgeError) {
        self.events.push("load_failed");
    }

    fn selection_changed(&mut self, _: SurfaceId, _: &SelectionState) {
        self.events.push("selection_changed");
    }

    fn clicked(&mut self, _: SurfaceId) {
        self.events.push("clicked");
    }

    fn undo_set(&mut self, _: SurfaceId) {
        self.events.push("undo_set");
    }

    fn link_selected(&mut self, _: SurfaceId, _: &SelectionState) {
        self.events.push("link_selected");
    }

    fn image_selected(&mut self, _: SurfaceId, _: &SelectionState) {
        self.events.push("image_selected");
    }

    fn table_selected(&mut self, _: SurfaceId, _: &SelectionState) {
        self.events.push("table_selected");
    }

    fn image_added(&mut self, _: SurfaceId, src: &str, _: Option<&str>) {
        self.events.push(format!("image_added:{}", src));
    }

    fn image_deleted(&mut self, _: SurfaceId, src: &str, _: Option<&str>) {
        self.events.push(format!("image_deleted:{}", src));
    }

    fn copy_image(&mut self, _: SurfaceId, src: &str, _: Dimensions, _: Option<&str>) {
        self.events.push(format!("copy_image:{}", src));
    }

    fn error_occurred(&mut self, _: SurfaceId, error: &EngineError) {
        self.events.push(format!("error:{}", error.code));
    }

    fn button_clicked(&mut self, _: SurfaceId, id: &str, _: Rect) {
        self.events.push(format!("button_clicked:{}", id));
    }

    fn search_activated(&mut self, _: SurfaceId) {
        self.events.push("search_activated");
    }

    fn search_deactivated(&mut self, _: SurfaceId) {
        self.events.push("search_deactivated");
    }

    fn searched(&mut self, _: SurfaceId) {
        self.events.push("searched");
    }

    fn action(&mut self, _: SurfaceId, action: &str) {
        self.events.push(format!("action:{}", action));
    }
}

/// Pretends the assets were staged somewhere.
pub struct FixedStager;

impl AssetStager for FixedStager {
    fn stage(&mut self, _plan: &StagingPlan) -> quill_bridge::Result<StagedAssets> {
        Ok(StagedAssets {
            base_url: "file:///staged/markup.html".to_string(),
            directory: PathBuf::from("/staged"),
        })
    }
}

pub struct FailingStager;

impl AssetStager for FailingStager {
    fn stage(&mut self, _plan: &StagingPlan) -> quill_bridge::Result<StagedAssets> {
        Err(BridgeError::AssetStaging("markup.js is missing".to_string()))
    }
}

/// Pump until neither side has anything left to say.
pub fn settle(surface: &mut Surface, engine: &FakeEngine) {
    for _ in 0..64 {
        let processed = surface.pump();
        if processed == 0 && engine.is_idle() {
            return;
        }
    }
    panic!("surface did not settle");
}

pub fn build_surface(
    arbiter: &Rc<FocusArbiter>,
    html: &str,
) -> (Surface, FakeEngine, Events) {
    let engine = FakeEngine::new();
    let events = Events::default();
    let surface = SurfaceBuilder::new(arbiter.clone())
        .with_initial_html(html)
        .with_delegate(RecordingDelegate::new(events.clone()))
        .build(engine.clone());
    (surface, engine, events)
}

/// A surface that has finished its startup handshake.
pub fn ready_surface(
    arbiter: &Rc<FocusArbiter>,
    html: &str,
) -> Result<(Surface, FakeEngine, Events)> {
    let (mut surface, engine, events) = build_surface(arbiter, html);
    surface.start(&mut FixedStager)?;
    settle(&mut surface, &engine);
    if !surface.is_ready() {
        bail!("surface stuck in {}", surface.lifecycle_state());
    }
    Ok((surface, engine, events))
}

/// Content as the engine reports it through `getHTML`.
pub fn fetch_html(surface: &mut Surface, engine: &FakeEngine) -> Result<String> {
    let html = surface.get_html(false, false);
    settle(surface, engine);
    Ok(pollster::block_on(html)?)
}
