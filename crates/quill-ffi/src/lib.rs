//! FFI exports for hosting quill editing surfaces in native applications.
//!
//! The native host owns the web views. It hands this crate callbacks to
//! evaluate script, navigate, and receive notifications, and feeds engine
//! messages and evaluation results back through the functions in [`ffi`].

pub mod ffi;

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use quill_bridge::{
    AssetStager, BridgeError, Command, Dimensions, EngineError, FocusArbiter, Inbound,
    InvocationId, Rect, Reply, SelectionState, SkipReason, Surface, SurfaceBuilder,
    SurfaceDelegate, SurfaceId, Transport,
};
use quill_config::QuillConfig;
use serde::Serialize;
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::ffi::{CString, c_char, c_void};
use std::rc::Rc;

/// Evaluate `script` in the surface's web view, then report the result with
/// `quill_surface_complete(surface, invocation, ...)`.
pub type EvaluateFn =
    extern "C" fn(user_data: *mut c_void, surface: u64, invocation: u64, script: *const c_char);

/// Navigate the surface's web view to `url`.
pub type LoadFn = extern "C" fn(user_data: *mut c_void, surface: u64, url: *const c_char);

/// Receive a JSON notification for the surface.
pub type NotifyFn = extern "C" fn(user_data: *mut c_void, surface: u64, json: *const c_char);

/// Callbacks into the native host, one set per surface.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct HostCallbacks {
    pub user_data: *mut c_void,
    pub evaluate: Option<EvaluateFn>,
    pub load: Option<LoadFn>,
    pub notify: Option<NotifyFn>,
}

fn c_string(text: &str) -> quill_bridge::Result<CString> {
    CString::new(text).map_err(|e| BridgeError::Transport(e.to_string()))
}

/// Transport that forwards to the host's web view.
struct HostTransport {
    callbacks: HostCallbacks,
    surface: Rc<Cell<u64>>,
}

impl Transport for HostTransport {
    fn load(&mut self, base_url: &str) -> quill_bridge::Result<()> {
        let load = self
            .callbacks
            .load
            .ok_or_else(|| BridgeError::Transport("host has no load callback".to_string()))?;
        let url = c_string(base_url)?;
        load(self.callbacks.user_data, self.surface.get(), url.as_ptr());
        Ok(())
    }

    fn evaluate(&mut self, invocation: InvocationId, script: &str) -> quill_bridge::Result<()> {
        let evaluate = self
            .callbacks
            .evaluate
            .ok_or_else(|| BridgeError::Transport("host has no evaluate callback".to_string()))?;
        let script = c_string(script)?;
        evaluate(
            self.callbacks.user_data,
            self.surface.get(),
            invocation.0,
            script.as_ptr(),
        );
        Ok(())
    }
}

/// Notification payloads handed to [`NotifyFn`].
#[derive(Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
enum Notification<'a> {
    InputReceived { region: Option<&'a str> },
    HeightChanged { height: u32 },
    TookFocus,
    LostFocus,
    WillLoad,
    DidLoad,
    LoadFailed { error: String },
    SelectionChanged { selection: &'a SelectionState },
    Clicked,
    UndoSet,
    LinkSelected { selection: &'a SelectionState },
    ImageSelected { selection: &'a SelectionState },
    TableSelected { selection: &'a SelectionState },
    ImageAdded { src: &'a str, region: Option<&'a str> },
    ImageDeleted { src: &'a str, region: Option<&'a str> },
    CopyImage {
        src: &'a str,
        dimensions: Dimensions,
        alt: Option<&'a str>,
    },
    ErrorOccurred { error: &'a EngineError },
    ButtonClicked { id: &'a str, rect: Rect },
    SearchActivated,
    SearchDeactivated,
    Searched,
    Action { action: &'a str },
    /// Outcome of a command issued with `quill_surface_request`.
    CommandCompleted {
        request: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<&'a Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        skipped: Option<SkipReason>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

fn notify_host(callbacks: &HostCallbacks, surface: SurfaceId, notification: &Notification<'_>) {
    let Some(notify) = callbacks.notify else {
        return;
    };
    let json = match serde_json::to_string(notification) {
        Ok(json) => json,
        Err(e) => {
            log::warn!("cannot encode notification for {}: {}", surface, e);
            return;
        }
    };
    match CString::new(json) {
        Ok(json) => notify(callbacks.user_data, surface.0, json.as_ptr()),
        Err(e) => log::warn!("notification for {} contains NUL: {}", surface, e),
    }
}

struct FfiDelegate {
    callbacks: HostCallbacks,
}

impl FfiDelegate {
    fn send(&self, surface: SurfaceId, notification: Notification<'_>) {
        notify_host(&self.callbacks, surface, &notification);
    }
}

impl SurfaceDelegate for FfiDelegate {
    fn input_received(&mut self, surface: SurfaceId, region: Option<&str>) {
        self.send(surface, Notification::InputReceived { region });
    }

    fn height_changed(&mut self, surface: SurfaceId, height: u32) {
        self.send(surface, Notification::HeightChanged { height });
    }

    fn took_focus(&mut self, surface: SurfaceId) {
        self.send(surface, Notification::TookFocus);
    }

    fn lost_focus(&mut self, surface: SurfaceId) {
        self.send(surface, Notification::LostFocus);
    }

    fn will_load(&mut self, surface: SurfaceId) {
        self.send(surface, Notification::WillLoad);
    }

    fn did_load(&mut self, surface: SurfaceId) {
        self.send(surface, Notification::DidLoad);
    }

    fn load_failed(&mut self, surface: SurfaceId, error: &BridgeError) {
        let error = error.to_string();
        self.send(surface, Notification::LoadFailed { error });
    }

    fn selection_changed(&mut self, surface: SurfaceId, selection: &SelectionState) {
        self.send(surface, Notification::SelectionChanged { selection });
    }

    fn clicked(&mut self, surface: SurfaceId) {
        self.send(surface, Notification::Clicked);
    }

    fn undo_set(&mut self, surface: SurfaceId) {
        self.send(surface, Notification::UndoSet);
    }

    fn link_selected(&mut self, surface: SurfaceId, selection: &SelectionState) {
        self.send(surface, Notification::LinkSelected { selection });
    }

    fn image_selected(&mut self, surface: SurfaceId, selection: &SelectionState) {
        self.send(surface, Notification::ImageSelected { selection });
    }

    fn table_selected(&mut self, surface: SurfaceId, selection: &SelectionState) {
        self.send(surface, Notification::TableSelected { selection });
    }

    fn image_added(&mut self, surface: SurfaceId, src: &str, region: Option<&str>) {
        self.send(surface, Notification::ImageAdded { src, region });
    }

    fn image_deleted(&mut self, surface: SurfaceId, src: &str, region: Option<&str>) {
        self.send(surface, Notification::ImageDeleted { src, region });
    }

    fn copy_image(&mut self, surface: SurfaceId, src: &str, dimensions: Dimensions, alt: Option<&str>) {
        self.send(
            surface,
            Notification::CopyImage {
                src,
                dimensions,
                alt,
            },
        );
    }

    fn error_occurred(&mut self, surface: SurfaceId, error: &EngineError) {
        self.send(surface, Notification::ErrorOccurred { error });
    }

    fn button_clicked(&mut self, surface: SurfaceId, id: &str, rect: Rect) {
        self.send(surface, Notification::ButtonClicked { id, rect });
    }

    fn search_activated(&mut self, surface: SurfaceId) {
        self.send(surface, Notification::SearchActivated);
    }

    fn search_deactivated(&mut self, surface: SurfaceId) {
        self.send(surface, Notification::SearchDeactivated);
    }

    fn searched(&mut self, surface: SurfaceId) {
        self.send(surface, Notification::Searched);
    }

    fn action(&mut self, surface: SurfaceId, action: &str) {
        self.send(surface, Notification::Action { action });
    }
}

/// Every surface created through the C API, sharing one focus arbiter.
pub struct Host {
    config: QuillConfig,
    arbiter: Rc<FocusArbiter>,
    surfaces: HashMap<u64, Surface>,
    callbacks: HashMap<u64, HostCallbacks>,
}

impl Host {
    pub fn new(config: QuillConfig) -> Self {
        Self {
            config,
            arbiter: FocusArbiter::new(),
            surfaces: HashMap::new(),
            callbacks: HashMap::new(),
        }
    }

    pub fn config(&self) -> &QuillConfig {
        &self.config
    }

    pub fn arbiter(&self) -> &Rc<FocusArbiter> {
        &self.arbiter
    }

    pub fn create_surface(&mut self, callbacks: HostCallbacks, initial_html: Option<&str>) -> u64 {
        let slot = Rc::new(Cell::new(u64::MAX));
        let mut builder = SurfaceBuilder::new(self.arbiter.clone())
            .with_config(&self.config)
            .with_delegate(FfiDelegate { callbacks });
        if let Some(html) = initial_html {
            builder = builder.with_initial_html(html);
        }
        let surface = builder.build(HostTransport {
            callbacks,
            surface: slot.clone(),
        });
        let id = surface.id().0;
        slot.set(id);
        self.surfaces.insert(id, surface);
        self.callbacks.insert(id, callbacks);
        log::info!("created surface {}", id);
        id
    }

    pub fn surface_mut(&mut self, id: u64) -> Result<&mut Surface> {
        self.surfaces
            .get_mut(&id)
            .with_context(|| format!("no surface with id {}", id))
    }

    pub fn start_surface(&mut self, id: u64, stager: &mut dyn AssetStager) -> Result<()> {
        self.surface_mut(id)?
            .start(stager)
            .with_context(|| format!("failed to start surface {}", id))
    }

    pub fn destroy_surface(&mut self, id: u64) -> bool {
        self.callbacks.remove(&id);
        match self.surfaces.remove(&id) {
            Some(mut surface) => {
                surface.tear_down();
                log::info!("destroyed surface {}", id);
                true
            }
            None => false,
        }
    }

    /// Issue `command` and report its outcome to the host as a
    /// `commandCompleted` notification carrying `request`.
    ///
    /// The notification can arrive before this returns, e.g. when the
    /// surface is not ready yet.
    pub fn request(&mut self, id: u64, request: u64, command: Command) -> Result<()> {
        let callbacks = *self
            .callbacks
            .get(&id)
            .with_context(|| format!("no surface with id {}", id))?;
        let surface = self.surface_mut(id)?;
        let surface_id = surface.id();
        surface.issue_with(command, move |outcome| {
            let notification = match &outcome {
                Ok(Reply::Done(value)) => Notification::CommandCompleted {
                    request,
                    result: value.as_ref(),
                    skipped: None,
                    error: None,
                },
                Ok(Reply::Skipped(reason)) => Notification::CommandCompleted {
                    request,
                    result: None,
                    skipped: Some(*reason),
                    error: None,
                },
                Err(e) => Notification::CommandCompleted {
                    request,
                    result: None,
                    skipped: None,
                    error: Some(e.to_string()),
                },
            };
            notify_host(&callbacks, surface_id, &notification);
        });
        Ok(())
    }

    /// Point the arbiter at `id` (or nobody) and let every surface react.
    pub fn request_first_responder(&mut self, id: Option<u64>) {
        self.arbiter.request_first_responder(id.map(SurfaceId));
        for surface in self.surfaces.values_mut() {
            surface.sync_focus();
        }
    }

    fn deliver(&mut self, id: u64, inbound: Inbound) {
        let Some(surface) = self.surfaces.get_mut(&id) else {
            log::debug!("dropping inbound traffic for unknown surface {}", id);
            return;
        };
        match inbound {
            Inbound::Posted(raw) => surface.on_receive(&raw),
            Inbound::Completed {
                invocation,
                outcome,
            } => surface.complete(invocation, outcome),
        }
    }
}

static CONFIG: once_cell::sync::OnceCell<QuillConfig> = once_cell::sync::OnceCell::new();

static LAST_ERROR: Lazy<Mutex<Option<String>>> = Lazy::new(|| Mutex::new(None));

pub fn config() -> QuillConfig {
    CONFIG.get().cloned().unwrap_or_default()
}

/// Install the process configuration. Only the first call wins; later
/// calls return `false` and leave it untouched.
pub fn set_config(config: QuillConfig) -> bool {
    if CONFIG.set(config).is_err() {
        log::warn!("configuration already set, keeping the first one");
        return false;
    }
    true
}

pub fn set_last_error(error: &anyhow::Error) {
    log::error!("{:#}", error);
    *LAST_ERROR.lock() = Some(format!("{:#}", error));
}

pub fn take_last_error() -> Option<String> {
    LAST_ERROR.lock().take()
}

// Surfaces are !Send; all of them live on the thread that drives the host UI.
thread_local! {
    static HOST: RefCell<Option<Host>> = const { RefCell::new(None) };
    static INBOX: RefCell<VecDeque<(u64, Inbound)>> = const { RefCell::new(VecDeque::new()) };
}

/// Run `f` against the host, then deliver anything queued meanwhile.
///
/// Returns `None` when no host is installed or the host is already in use
/// further up the stack.
pub fn with_host<F, R>(f: F) -> Option<R>
where
    F: FnOnce(&mut Host) -> R,
{
    let result = HOST.with(|h| {
        let Ok(mut borrow) = h.try_borrow_mut() else {
            log::warn!("re-entrant call into the quill host ignored");
            return None;
        };
        borrow.as_mut().map(f)
    });
    drain_inbox();
    result
}

pub fn set_host(host: Option<Host>) {
    let previous = HOST.with(|h| match h.try_borrow_mut() {
        Ok(mut borrow) => Some(std::mem::replace(&mut *borrow, host)),
        Err(_) => {
            log::error!("cannot replace the quill host while it is in use");
            None
        }
    });
    // Dropping tears surfaces down, which calls back into the host.
    drop(previous);
    INBOX.with(|q| q.borrow_mut().clear());
}

/// Queue inbound traffic for a surface and deliver it as soon as possible.
///
/// Safe to call from inside a host callback: delivery then happens when
/// the outer call returns.
pub fn enqueue(surface: u64, inbound: Inbound) {
    INBOX.with(|q| q.borrow_mut().push_back((surface, inbound)));
    drain_inbox();
}

fn drain_inbox() {
    HOST.with(|h| {
        let Ok(mut borrow) = h.try_borrow_mut() else {
            return;
        };
        let Some(host) = borrow.as_mut() else {
            INBOX.with(|q| q.borrow_mut().clear());
            return;
        };
        while let Some((id, inbound)) = INBOX.with(|q| q.borrow_mut().pop_front()) {
            host.deliver(id, inbound);
        }
    });
}
