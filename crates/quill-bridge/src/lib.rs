//! Host-side bridge to an embedded, script-driven rich-text editing surface.
//!
//! The embedded engine owns the document and its DOM. This crate owns
//! everything the host needs to drive it: the command/event protocol, the
//! startup handshake, the cached selection state that toolbars read, the
//! undo commit handshake, and focus arbitration between several surfaces.
//!
//! All bridge state lives on one scheduling domain. [`Surface`] is
//! deliberately `!Send`; hosts that receive engine callbacks on another
//! thread must hop back before calling into it.
//!
//! # Features
//!
//! - `cdp`: Drive headless Chrome over the DevTools Protocol as the engine.

mod assets;
mod command;
mod delegate;
mod envelope;
mod error;
mod event;
mod focus;
mod lifecycle;
mod pending;
mod router;
mod selection;
mod surface;
mod transport;
mod undo;

#[cfg(feature = "cdp")]
mod cdp_backend;

pub use assets::{AssetStager, DirectoryStager, StagedAssets, StagingPlan};
pub use command::{Arg, Command, Exclusion, Position, SearchDirection};
pub use delegate::{NoopDelegate, SurfaceDelegate};
pub use envelope::Envelope;
pub use error::{BridgeError, Result};
pub use event::{Dimensions, EngineError, Event, SimpleEvent, StructuredEvent};
pub use focus::FocusArbiter;
pub use lifecycle::{Lifecycle, LifecycleAction, LifecycleState, Trigger};
pub use pending::{CommandFuture, CommandResult, EvalOutcome, InvocationId, Reply, SkipReason};
pub use router::{Routed, route};
pub use selection::{
    Format, FormatState, ImageState, LinkState, ListType, ParagraphState, ParagraphStyle,
    SelectionState, TableArea, TableBorder, TableState, TextSelection, Validity,
};
pub use surface::Surface;
pub use transport::{Inbound, Transport};
pub use undo::{Mutation, UndoMark, UndoSetFuture};

#[cfg(feature = "cdp")]
pub use cdp_backend::CdpTransport;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one embedded surface within a [`FocusArbiter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SurfaceId(pub u64);

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "surface-{}", self.0)
    }
}

/// Rectangle in engine (CSS pixel) coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Per-surface configuration, usually derived from [`quill_config::QuillConfig`].
#[derive(Debug, Clone)]
pub struct SurfaceOptions {
    /// Engine-side global object that receives commands.
    pub namespace: String,
    /// JSON object pushed while in `AttributesSet`.
    pub top_level_attributes: serde_json::Value,
    /// Document pushed while in `ContentLoading`.
    pub initial_html: String,
    /// Placeholder text pushed alongside the initial content.
    pub placeholder: Option<String>,
    /// Staged file name of the host-supplied script, if any.
    pub user_script: Option<String>,
    /// Staged file name of the host-supplied stylesheet, if any.
    pub user_css: Option<String>,
    /// Become first responder as soon as the surface is ready.
    pub claim_first_responder_on_ready: bool,
    /// Assets to stage before the base document loads.
    pub staging: StagingPlan,
}

impl Default for SurfaceOptions {
    fn default() -> Self {
        Self::from(&quill_config::QuillConfig::default())
    }
}

impl From<&quill_config::QuillConfig> for SurfaceOptions {
    fn from(config: &quill_config::QuillConfig) -> Self {
        let (user_script, user_css) = config.resources.user_file_names();
        Self {
            namespace: config.editor.namespace.clone(),
            top_level_attributes: config.top_level_attributes(),
            initial_html: config.editor.initial_html.clone().unwrap_or_default(),
            placeholder: config.editor.placeholder.clone(),
            user_script,
            user_css,
            claim_first_responder_on_ready: config.bridge.claim_first_responder_on_ready,
            staging: StagingPlan::from_config(&config.resources),
        }
    }
}

/// Builder for creating surfaces.
pub struct SurfaceBuilder {
    options: SurfaceOptions,
    delegate: Box<dyn SurfaceDelegate>,
    arbiter: std::rc::Rc<FocusArbiter>,
}

impl SurfaceBuilder {
    pub fn new(arbiter: std::rc::Rc<FocusArbiter>) -> Self {
        Self {
            options: SurfaceOptions::default(),
            delegate: Box::new(NoopDelegate),
            arbiter,
        }
    }

    pub fn with_options(mut self, options: SurfaceOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_config(mut self, config: &quill_config::QuillConfig) -> Self {
        self.options = SurfaceOptions::from(config);
        self
    }

    pub fn with_initial_html(mut self, html: impl Into<String>) -> Self {
        self.options.initial_html = html.into();
        self
    }

    pub fn with_delegate(mut self, delegate: impl SurfaceDelegate + 'static) -> Self {
        self.delegate = Box::new(delegate);
        self
    }

    pub fn claim_first_responder_on_ready(mut self) -> Self {
        self.options.claim_first_responder_on_ready = true;
        self
    }

    /// Build a surface that talks to the engine through `transport`.
    pub fn build(self, transport: impl Transport + 'static) -> Surface {
        Surface::new(self.options, Box::new(transport), self.delegate, self.arbiter)
    }
}
