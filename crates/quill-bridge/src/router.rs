//! Engine-to-host demultiplexing.
//!
//! `input` fires on every keystroke, so it is matched before anything else
//! and without touching the JSON decoder. Unrecognized vocabulary is logged
//! and dropped; the engine's messages may be newer than this host.

use crate::command::Command;
use crate::envelope::Envelope;
use crate::error::BridgeError;
use crate::event::{Event, SimpleEvent, StructuredEvent};
use crate::lifecycle::Trigger;
use crate::surface::{Step, Surface};
use serde_json::Value;

/// Classification of one raw inbound message.
#[derive(Debug)]
pub enum Routed {
    Event(Event),
    /// A bare tag this host does not know.
    UnknownTag(String),
    /// A structured message with an unrecognized `messageType`.
    UnknownMessageType(String),
    /// The payload could not be read.
    Malformed(BridgeError),
}

/// Classify a raw message without acting on it.
pub fn route(raw: &str) -> Routed {
    match Envelope::open(raw) {
        Ok(Envelope::Simple(tag)) => {
            match SimpleEvent::from_tag(tag).or_else(|| SimpleEvent::parse_input(tag)) {
                Some(event) => Routed::Event(Event::Simple(event)),
                None => Routed::UnknownTag(tag.to_string()),
            }
        }
        Ok(Envelope::Structured(object)) => {
            let message_type = object
                .get("messageType")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            match StructuredEvent::decode(object) {
                Ok(Some(event)) => Routed::Event(Event::Structured(event)),
                Ok(None) => Routed::UnknownMessageType(message_type),
                Err(e) => Routed::Malformed(e),
            }
        }
        Err(e) => Routed::Malformed(e),
    }
}

impl Surface {
    /// Handle one raw message the engine posted.
    ///
    /// Never fails. Malformed payloads are logged and leave all cached state
    /// as it was.
    pub fn on_receive(&mut self, raw: &str) {
        if self.is_torn_down() {
            tracing::debug!(surface = %self.id, "message after teardown dropped");
            return;
        }
        match route(raw) {
            Routed::Event(Event::Simple(event)) => self.handle_simple(event),
            Routed::Event(Event::Structured(event)) => self.handle_structured(event),
            Routed::UnknownTag(tag) => {
                tracing::debug!(surface = %self.id, %tag, "unknown message tag");
            }
            Routed::UnknownMessageType(message_type) => {
                tracing::debug!(surface = %self.id, %message_type, "unknown message type");
            }
            Routed::Malformed(e) => {
                tracing::warn!(surface = %self.id, error = %e, "dropping malformed message");
            }
        }
    }

    fn handle_simple(&mut self, event: SimpleEvent) {
        let id = self.id;
        match event {
            SimpleEvent::Input { region } => self.delegate.input_received(id, region.as_deref()),
            SimpleEvent::Ready => self.lifecycle_event(Trigger::ReadyEvent),
            SimpleEvent::LoadedUserFiles => self.lifecycle_event(Trigger::LoadedUserFiles),
            SimpleEvent::UpdateHeight => {
                if self.is_ready() {
                    self.dispatch(Command::GetHeight, Some(Step::UpdateHeight), None);
                }
            }
            SimpleEvent::Blur => {
                self.focused = false;
                self.delegate.lost_focus(id);
            }
            SimpleEvent::Focus => {
                self.focused = true;
                self.arbiter.select(id);
                self.arbiter.display(&self.selection);
                self.delegate.took_focus(id);
            }
            SimpleEvent::SelectionChange => {
                if self.focused {
                    self.fetch_selection(true);
                } else {
                    // Focus moved on before this arrived; the selection now
                    // belongs to another surface.
                    tracing::debug!(surface = %id, "selectionChange while unfocused ignored");
                }
            }
            SimpleEvent::Click => self.delegate.clicked(id),
            SimpleEvent::UndoSet => {
                self.undo.record_undo_set();
                self.delegate.undo_set(id);
            }
            SimpleEvent::Searched => self.delegate.searched(id),
            SimpleEvent::ActivateSearch => {
                self.search_active = true;
                self.delegate.search_activated(id);
            }
            SimpleEvent::DeactivateSearch => {
                self.search_active = false;
                self.delegate.search_deactivated(id);
            }
        }
    }

    fn handle_structured(&mut self, event: StructuredEvent) {
        let id = self.id;
        match event {
            StructuredEvent::Action { action } => {
                tracing::debug!(surface = %id, %action, "engine action");
                self.delegate.action(id, &action);
            }
            StructuredEvent::Log { log } => {
                tracing::info!(surface = %id, "engine: {}", log);
            }
            StructuredEvent::Error(error) => {
                if error.alert {
                    tracing::error!(surface = %id, code = %error.code, info = ?error.info, "{}", error.message);
                } else {
                    tracing::warn!(surface = %id, code = %error.code, info = ?error.info, "{}", error.message);
                }
                self.delegate.error_occurred(id, &error);
            }
            StructuredEvent::CopyImage {
                src,
                dimensions,
                alt,
            } => self.delegate.copy_image(id, &src, dimensions, alt.as_deref()),
            StructuredEvent::AddedImage { src, div_id } => {
                self.images.insert(src.clone());
                self.delegate.image_added(id, &src, div_id.as_deref());
            }
            StructuredEvent::DeletedImage { src, div_id } => {
                self.images.remove(&src);
                self.delegate.image_deleted(id, &src, div_id.as_deref());
            }
            StructuredEvent::ButtonClicked { id: button, rect } => {
                match self.buttons.get_mut(&button) {
                    Some(handler) => handler(rect),
                    None => tracing::debug!(surface = %id, %button, "click for unregistered button"),
                }
                self.delegate.button_clicked(id, &button, rect);
            }
        }
    }
}
