//! Host-to-engine command vocabulary and script serialization.
//!
//! Every command becomes a call on the engine's namespace object, e.g.
//! `MU.toggleBold()` or `MU.setHTML("<p>hi</p>", true)`. Arguments are
//! emitted as JSON literals, which are also valid script literals once the
//! two line separators JSON leaves raw are escaped.

use crate::selection::{Format, ListType, ParagraphStyle, TableArea, TableBorder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Write as _;

/// Where a row or column is inserted relative to the selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    Before,
    #[default]
    After,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchDirection {
    #[default]
    Forward,
    Backward,
}

/// Commands that may not overlap on the same surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Exclusion {
    Paste,
}

/// A positional argument to an engine call.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Str(String),
    Int(i64),
    Num(f64),
    Bool(bool),
    Json(Value),
    Null,
}

impl Arg {
    fn write_to(&self, out: &mut String) {
        match self {
            Arg::Str(s) => write_json(out, &Value::String(s.clone())),
            Arg::Int(n) => {
                let _ = write!(out, "{}", n);
            }
            Arg::Num(n) if n.is_finite() => {
                let _ = write!(out, "{}", n);
            }
            Arg::Num(_) | Arg::Null => out.push_str("null"),
            Arg::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            Arg::Json(v) => write_json(out, v),
        }
    }
}

impl From<&str> for Arg {
    fn from(s: &str) -> Self {
        Arg::Str(s.to_string())
    }
}

impl From<String> for Arg {
    fn from(s: String) -> Self {
        Arg::Str(s)
    }
}

impl From<Option<String>> for Arg {
    fn from(s: Option<String>) -> Self {
        s.map(Arg::Str).unwrap_or(Arg::Null)
    }
}

impl From<bool> for Arg {
    fn from(b: bool) -> Self {
        Arg::Bool(b)
    }
}

impl From<u32> for Arg {
    fn from(n: u32) -> Self {
        Arg::Int(n as i64)
    }
}

fn write_json(out: &mut String, value: &Value) {
    // Serializing a Value cannot fail.
    let text = serde_json::to_string(value).unwrap_or_else(|_| "null".to_string());
    for ch in text.chars() {
        match ch {
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            _ => out.push(ch),
        }
    }
}

/// A named engine operation.
///
/// Deserializes from `{"command": "<name>", ...fields}` so hosts outside
/// Rust can issue commands as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum Command {
    GetHtml {
        #[serde(default)]
        pretty: bool,
        #[serde(default)]
        clean: bool,
    },
    SetHtml {
        html: String,
        #[serde(default)]
        select: bool,
    },
    EmptyDocument,
    ToggleFormat { format: Format },
    ReplaceStyle { old: ParagraphStyle, new: ParagraphStyle },
    ToggleList { list: ListType },
    Indent,
    Outdent,
    InsertTable { rows: u32, cols: u32 },
    AddRow {
        #[serde(default)]
        position: Position,
    },
    AddCol {
        #[serde(default)]
        position: Position,
    },
    AddHeader {
        #[serde(default)]
        colspan: bool,
    },
    DeleteTableArea { area: TableArea },
    BorderTable { border: TableBorder },
    InsertLink { href: String },
    DeleteLink,
    InsertImage {
        src: String,
        #[serde(default)]
        alt: Option<String>,
    },
    ModifyImage {
        #[serde(default)]
        src: Option<String>,
        #[serde(default)]
        alt: Option<String>,
        #[serde(default)]
        scale: Option<u32>,
    },
    Search {
        text: String,
        #[serde(default)]
        direction: SearchDirection,
        #[serde(default)]
        activate: bool,
    },
    Undo,
    Redo,
    GetSelectionState,
    SetTopLevelAttributes { attributes: Value },
    LoadUserFiles {
        #[serde(default)]
        script: Option<String>,
        #[serde(default)]
        css: Option<String>,
    },
    Focus,
    ResetSelection,
    GetHeight,
    PasteText { text: String },
    PasteHtml { html: String },
    SetPlaceholder { text: String },
    Teardown,
}

impl Command {
    /// Name of the engine function this command calls.
    pub fn name(&self) -> &'static str {
        match self {
            Command::GetHtml { .. } => "getHTML",
            Command::SetHtml { .. } => "setHTML",
            Command::EmptyDocument => "emptyDocument",
            Command::ToggleFormat { format } => match format {
                Format::Bold => "toggleBold",
                Format::Italic => "toggleItalic",
                Format::Underline => "toggleUnderline",
                Format::Strike => "toggleStrike",
                Format::Subscript => "toggleSubscript",
                Format::Superscript => "toggleSuperscript",
                Format::Code => "toggleCode",
            },
            Command::ReplaceStyle { .. } => "replaceStyle",
            Command::ToggleList { .. } => "toggleListItem",
            Command::Indent => "indent",
            Command::Outdent => "outdent",
            Command::InsertTable { .. } => "insertTable",
            Command::AddRow { .. } => "addRow",
            Command::AddCol { .. } => "addCol",
            Command::AddHeader { .. } => "addHeader",
            Command::DeleteTableArea { .. } => "deleteTableArea",
            Command::BorderTable { .. } => "borderTable",
            Command::InsertLink { .. } => "insertLink",
            Command::DeleteLink => "deleteLink",
            Command::InsertImage { .. } => "insertImage",
            Command::ModifyImage { .. } => "modifyImage",
            Command::Search { .. } => "searchFor",
            Command::Undo => "undo",
            Command::Redo => "redo",
            Command::GetSelectionState => "getSelectionState",
            Command::SetTopLevelAttributes { .. } => "setTopLevelAttributes",
            Command::LoadUserFiles { .. } => "loadUserFiles",
            Command::Focus => "focus",
            Command::ResetSelection => "resetSelection",
            Command::GetHeight => "getHeight",
            Command::PasteText { .. } => "pasteText",
            Command::PasteHtml { .. } => "pasteHTML",
            Command::SetPlaceholder { .. } => "setPlaceholder",
            Command::Teardown => "teardown",
        }
    }

    /// Positional arguments, in call order.
    pub fn args(&self) -> Vec<Arg> {
        match self {
            Command::GetHtml { pretty, clean } => vec![(*pretty).into(), (*clean).into()],
            Command::SetHtml { html, select } => vec![html.as_str().into(), (*select).into()],
            Command::ReplaceStyle { old, new } => vec![old.tag().into(), new.tag().into()],
            Command::ToggleList { list } => vec![list.tag().into()],
            Command::InsertTable { rows, cols } => vec![(*rows).into(), (*cols).into()],
            Command::AddRow { position } | Command::AddCol { position } => {
                vec![position_str(*position).into()]
            }
            Command::AddHeader { colspan } => vec![(*colspan).into()],
            Command::DeleteTableArea { area } => vec![area.as_str().into()],
            Command::BorderTable { border } => vec![border.as_str().into()],
            Command::InsertLink { href } => vec![href.as_str().into()],
            Command::InsertImage { src, alt } => vec![src.as_str().into(), alt.clone().into()],
            Command::ModifyImage { src, alt, scale } => vec![
                src.clone().into(),
                alt.clone().into(),
                scale.map(Arg::from).unwrap_or(Arg::Null),
            ],
            Command::Search {
                text,
                direction,
                activate,
            } => vec![
                text.as_str().into(),
                match direction {
                    SearchDirection::Forward => "forward",
                    SearchDirection::Backward => "backward",
                }
                .into(),
                (*activate).into(),
            ],
            Command::SetTopLevelAttributes { attributes } => vec![Arg::Json(attributes.clone())],
            Command::LoadUserFiles { script, css } => vec![script.clone().into(), css.clone().into()],
            Command::PasteText { text } => vec![text.as_str().into()],
            Command::PasteHtml { html } => vec![html.as_str().into()],
            Command::SetPlaceholder { text } => vec![text.as_str().into()],
            Command::EmptyDocument
            | Command::ToggleFormat { .. }
            | Command::Indent
            | Command::Outdent
            | Command::DeleteLink
            | Command::Undo
            | Command::Redo
            | Command::GetSelectionState
            | Command::Focus
            | Command::ResetSelection
            | Command::GetHeight
            | Command::Teardown => Vec::new(),
        }
    }

    /// Whether the engine records this command on its undo stack.
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Command::EmptyDocument
                | Command::ToggleFormat { .. }
                | Command::ReplaceStyle { .. }
                | Command::ToggleList { .. }
                | Command::Indent
                | Command::Outdent
                | Command::InsertTable { .. }
                | Command::AddRow { .. }
                | Command::AddCol { .. }
                | Command::AddHeader { .. }
                | Command::DeleteTableArea { .. }
                | Command::BorderTable { .. }
                | Command::InsertLink { .. }
                | Command::DeleteLink
                | Command::InsertImage { .. }
                | Command::ModifyImage { .. }
                | Command::PasteText { .. }
                | Command::PasteHtml { .. }
        )
    }

    pub fn exclusion(&self) -> Option<Exclusion> {
        match self {
            Command::PasteText { .. } | Command::PasteHtml { .. } => Some(Exclusion::Paste),
            _ => None,
        }
    }

    /// Render the call as script for the engine's `namespace` object.
    pub fn script(&self, namespace: &str) -> String {
        let mut out = String::with_capacity(namespace.len() + 32);
        out.push_str(namespace);
        out.push('.');
        out.push_str(self.name());
        out.push('(');
        for (i, arg) in self.args().iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            arg.write_to(&mut out);
        }
        out.push(')');
        out
    }
}

fn position_str(position: Position) -> &'static str {
    match position {
        Position::Before => "before",
        Position::After => "after",
    }
}
