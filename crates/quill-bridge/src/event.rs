//! Inbound notifications posted by the engine.

use crate::Rect;
use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Tag prefix of the per-keystroke input notification.
pub(crate) const INPUT_TAG: &str = "input";

/// Any notification from the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A bare tag string.
    Simple(SimpleEvent),
    /// A JSON object discriminated by `messageType`.
    Structured(StructuredEvent),
}

/// Bare-tag notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimpleEvent {
    Ready,
    LoadedUserFiles,
    UpdateHeight,
    Blur,
    Focus,
    SelectionChange,
    Click,
    UndoSet,
    Searched,
    ActivateSearch,
    DeactivateSearch,
    /// Content changed; `region` is the editable region id from `input:<id>`.
    Input { region: Option<String> },
}

impl SimpleEvent {
    /// Parse a bare tag. `input` variants are handled by [`SimpleEvent::parse_input`].
    pub fn from_tag(tag: &str) -> Option<Self> {
        let event = match tag {
            "ready" => Self::Ready,
            "loadedUserFiles" => Self::LoadedUserFiles,
            "updateHeight" => Self::UpdateHeight,
            "blur" => Self::Blur,
            "focus" => Self::Focus,
            "selectionChange" => Self::SelectionChange,
            "click" => Self::Click,
            "undoSet" => Self::UndoSet,
            "searched" => Self::Searched,
            "activateSearch" => Self::ActivateSearch,
            "deactivateSearch" => Self::DeactivateSearch,
            _ => return None,
        };
        Some(event)
    }

    /// Fast path for `input` and `input:<regionId>`.
    ///
    /// The region id is taken by fixed offset after the separator; nothing
    /// past the prefix is parsed.
    pub fn parse_input(raw: &str) -> Option<Self> {
        let rest = raw.strip_prefix(INPUT_TAG)?;
        if rest.is_empty() {
            return Some(Self::Input { region: None });
        }
        let region = rest.strip_prefix(':')?;
        Some(Self::Input {
            region: (!region.is_empty()).then(|| region.to_string()),
        })
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::LoadedUserFiles => "loadedUserFiles",
            Self::UpdateHeight => "updateHeight",
            Self::Blur => "blur",
            Self::Focus => "focus",
            Self::SelectionChange => "selectionChange",
            Self::Click => "click",
            Self::UndoSet => "undoSet",
            Self::Searched => "searched",
            Self::ActivateSearch => "activateSearch",
            Self::DeactivateSearch => "deactivateSearch",
            Self::Input { .. } => INPUT_TAG,
        }
    }
}

/// Width/height pair reported with image notifications.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Dimensions {
    pub width: f64,
    pub height: f64,
}

/// An error the engine reported about itself.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineError {
    pub code: String,
    pub message: String,
    pub info: Option<String>,
    /// Only errors with `alert` set are meant for the end user.
    pub alert: bool,
}

/// Notifications carrying a JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "messageType", rename_all = "camelCase")]
pub enum StructuredEvent {
    /// Trace of a user-level action performed inside the engine.
    Action { action: String },
    /// Diagnostic log line from the engine.
    Log { log: String },
    Error(EngineError),
    /// The engine asks the host to put an image on the clipboard.
    CopyImage {
        src: String,
        #[serde(default)]
        dimensions: Dimensions,
        #[serde(default)]
        alt: Option<String>,
    },
    AddedImage {
        src: String,
        #[serde(default, rename = "divId")]
        div_id: Option<String>,
    },
    DeletedImage {
        src: String,
        #[serde(default, rename = "divId")]
        div_id: Option<String>,
    },
    /// A host-registered button inside the document was activated.
    ButtonClicked {
        id: String,
        #[serde(default)]
        rect: Rect,
    },
}

impl StructuredEvent {
    /// Every `messageType` this host understands.
    pub const MESSAGE_TYPES: &'static [&'static str] = &[
        "action",
        "log",
        "error",
        "copyImage",
        "addedImage",
        "deletedImage",
        "buttonClicked",
    ];

    /// Decode a structured payload.
    ///
    /// Returns `Ok(None)` for a well-formed object whose `messageType` is not
    /// recognized, so that newer engines do not break older hosts.
    pub fn decode(object: Map<String, Value>) -> Result<Option<Self>> {
        let message_type = match object.get("messageType") {
            Some(Value::String(t)) => t.clone(),
            Some(_) => {
                return Err(BridgeError::MalformedMessage(
                    "messageType is not a string".to_string(),
                ));
            }
            None => {
                return Err(BridgeError::MalformedMessage(
                    "missing messageType".to_string(),
                ));
            }
        };
        if !Self::MESSAGE_TYPES.contains(&message_type.as_str()) {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(Value::Object(object))?))
    }

    pub fn message_type(&self) -> &'static str {
        match self {
            Self::Action { .. } => "action",
            Self::Log { .. } => "log",
            Self::Error(_) => "error",
            Self::CopyImage { .. } => "copyImage",
            Self::AddedImage { .. } => "addedImage",
            Self::DeletedImage { .. } => "deletedImage",
            Self::ButtonClicked { .. } => "buttonClicked",
        }
    }
}
