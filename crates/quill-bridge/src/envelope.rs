//! Shape detection for raw messages posted by the engine.
//!
//! The engine posts either a bare tag string or a JSON-serialized object.
//! This layer only decides which of the two a payload is; it never blocks
//! and never drops a payload silently.

use crate::error::{BridgeError, Result};
use serde_json::{Map, Value};

/// A raw inbound payload after shape detection.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope<'a> {
    /// A bare tag, not yet matched against the known vocabulary.
    Simple(&'a str),
    /// A decoded JSON object.
    Structured(Map<String, Value>),
}

impl<'a> Envelope<'a> {
    /// Detect the shape of a UTF-8 payload.
    pub fn open(raw: &'a str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(BridgeError::MalformedMessage("empty message".to_string()));
        }
        if !looks_like_json(trimmed) {
            return Ok(Self::Simple(trimmed));
        }
        match serde_json::from_str::<Value>(trimmed)? {
            Value::Object(object) => Ok(Self::Structured(object)),
            other => Err(BridgeError::MalformedMessage(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Detect the shape of a payload that arrived as raw bytes.
    pub fn open_bytes(raw: &'a [u8]) -> Result<Self> {
        let text = std::str::from_utf8(raw)
            .map_err(|e| BridgeError::MalformedMessage(format!("invalid UTF-8: {}", e)))?;
        Self::open(text)
    }
}

fn looks_like_json(text: &str) -> bool {
    matches!(text.as_bytes().first(), Some(b'{' | b'[' | b'"'))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
