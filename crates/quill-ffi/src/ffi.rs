//! C exports for hosting quill surfaces from Objective-C, Swift or C++.
//!
//! Every function must be called on the thread that called [`quill_init`].
//! Strings returned to the host are owned by the caller and must be
//! released with [`quill_string_free`].

use std::ffi::{CStr, CString, c_char};

use anyhow::{Context, anyhow};
use quill_bridge::{Command, DirectoryStager, EvalOutcome, Inbound, InvocationId, SelectionState};
use quill_config::QuillConfig;
use serde_json::Value;

use crate::{
    Host, HostCallbacks, config, enqueue, set_config, set_host, set_last_error, take_last_error,
    with_host,
};

/// Returned by [`quill_surface_create`] when no surface was created.
pub const QUILL_INVALID_SURFACE: u64 = u64::MAX;

fn read_str<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(ptr) }.to_str().ok()
}

fn into_c_string(text: String) -> *mut c_char {
    match CString::new(text) {
        Ok(text) => text.into_raw(),
        Err(e) => {
            log::warn!("string for host contains NUL: {}", e);
            std::ptr::null_mut()
        }
    }
}

fn decode_command(command_json: *const c_char) -> anyhow::Result<Command> {
    let raw = read_str(command_json).context("command is null or not UTF-8")?;
    serde_json::from_str::<Command>(raw).context("decoding command")
}

fn report(outcome: Option<anyhow::Result<()>>) -> bool {
    match outcome {
        Some(Ok(())) => true,
        Some(Err(e)) => {
            set_last_error(&e);
            false
        }
        None => false,
    }
}

fn selection_json(selection: &SelectionState) -> *mut c_char {
    match serde_json::to_string(selection) {
        Ok(json) => into_c_string(json),
        Err(e) => {
            set_last_error(&anyhow!(e).context("encoding selection state"));
            std::ptr::null_mut()
        }
    }
}

/// Initialize logging, configuration and the surface registry.
///
/// The configuration is loaded once per process. Calling this again
/// replaces the surface registry but keeps the first configuration; the
/// call still succeeds and [`quill_last_error`] says the new one was ignored.
///
/// # Arguments
/// * `config_path` - Optional path to a quill.toml (null for the default lookup)
///
/// # Returns
/// `true` on success, `false` on failure (see [`quill_last_error`])
#[unsafe(no_mangle)]
pub extern "C" fn quill_init(config_path: *const c_char) -> bool {
    let _ = env_logger::try_init();

    let loaded = match read_str(config_path) {
        Some(path) => QuillConfig::load_from_file(path)
            .map_err(|e| anyhow!(e))
            .with_context(|| format!("loading {}", path))
            .map(|mut config| {
                config.merge_with_env();
                config
            }),
        None => Ok(QuillConfig::load()),
    };

    match loaded {
        Ok(loaded) => {
            if !set_config(loaded) {
                set_last_error(&anyhow!(
                    "quill_init: configuration already loaded, new configuration ignored"
                ));
            }
            set_host(Some(Host::new(config())));
            log::info!("quill_init: ready");
            true
        }
        Err(e) => {
            set_last_error(&e);
            false
        }
    }
}

/// Tear down every surface and release the registry.
#[unsafe(no_mangle)]
pub extern "C" fn quill_shutdown() {
    set_host(None);
    log::info!("quill_shutdown: done");
}

/// Create a surface driven through `callbacks`.
///
/// # Arguments
/// * `callbacks` - Pointer to the host callbacks, copied by value
/// * `initial_html` - Optional initial document (null to use the configured one)
///
/// # Returns
/// The surface id, or [`QUILL_INVALID_SURFACE`] on failure
#[unsafe(no_mangle)]
pub extern "C" fn quill_surface_create(
    callbacks: *const HostCallbacks,
    initial_html: *const c_char,
) -> u64 {
    if callbacks.is_null() {
        set_last_error(&anyhow!("quill_surface_create: callbacks are null"));
        return QUILL_INVALID_SURFACE;
    }
    let callbacks = unsafe { *callbacks };
    let html = read_str(initial_html);
    with_host(|host| host.create_surface(callbacks, html)).unwrap_or_else(|| {
        set_last_error(&anyhow!("quill_surface_create: quill_init was not called"));
        QUILL_INVALID_SURFACE
    })
}

/// Stage the editor assets and load the base document into the surface.
#[unsafe(no_mangle)]
pub extern "C" fn quill_surface_start(surface: u64) -> bool {
    report(with_host(|host| host.start_surface(surface, &mut DirectoryStager::new())))
}

/// Hand a message the engine posted to the bridge.
#[unsafe(no_mangle)]
pub extern "C" fn quill_surface_post_message(surface: u64, message: *const c_char) {
    match read_str(message) {
        Some(message) => enqueue(surface, Inbound::Posted(message.to_string())),
        None => log::warn!("quill_surface_post_message: unreadable message for {}", surface),
    }
}

/// Report the outcome of an evaluation requested through the evaluate callback.
///
/// # Arguments
/// * `result_json` - JSON of the script's value (null when it returned nothing)
/// * `error` - Error description (null on success)
#[unsafe(no_mangle)]
pub extern "C" fn quill_surface_complete(
    surface: u64,
    invocation: u64,
    result_json: *const c_char,
    error: *const c_char,
) {
    let outcome: EvalOutcome = if !error.is_null() {
        Err(read_str(error).unwrap_or("evaluation failed").to_string())
    } else {
        match read_str(result_json) {
            None => Ok(None),
            Some(raw) => Ok(Some(
                serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string())),
            )),
        }
    };
    enqueue(
        surface,
        Inbound::Completed {
            invocation: InvocationId(invocation),
            outcome,
        },
    );
}

/// Issue a command given as JSON, e.g. `{"command":"toggleFormat","format":"bold"}`.
///
/// Fire and forget: failures are only logged. Use [`quill_surface_request`]
/// to get the result.
///
/// # Returns
/// `true` when the command was accepted (it may still be skipped if the
/// surface is not ready), `false` on failure (see [`quill_last_error`])
#[unsafe(no_mangle)]
pub extern "C" fn quill_surface_issue(surface: u64, command_json: *const c_char) -> bool {
    let command = match decode_command(command_json) {
        Ok(command) => command,
        Err(e) => {
            set_last_error(&e);
            return false;
        }
    };
    report(with_host(|host| host.surface_mut(surface).map(|s| s.issue(command))))
}

/// Issue a command given as JSON and report its outcome.
///
/// The outcome arrives through the notify callback as
/// `{"event":"commandCompleted","request":<request>, ...}` with exactly one
/// of `result` (absent when the command returns nothing), `skipped`
/// (`"notReady"` or `"tornDown"`) or `error`. It may arrive before this
/// function returns.
///
/// # Arguments
/// * `request` - Id chosen by the host, echoed back in the notification
/// * `command_json` - The command, as for [`quill_surface_issue`]
///
/// # Returns
/// `true` when a `commandCompleted` notification will follow, `false` on
/// failure (see [`quill_last_error`])
#[unsafe(no_mangle)]
pub extern "C" fn quill_surface_request(
    surface: u64,
    request: u64,
    command_json: *const c_char,
) -> bool {
    let command = match decode_command(command_json) {
        Ok(command) => command,
        Err(e) => {
            set_last_error(&e);
            return false;
        }
    };
    report(with_host(|host| host.request(surface, request, command)))
}

/// Ask for `surface` to become the first responder.
#[unsafe(no_mangle)]
pub extern "C" fn quill_surface_request_focus(surface: u64) {
    with_host(|host| host.request_first_responder(Some(surface)));
}

/// No surface should hold focus.
#[unsafe(no_mangle)]
pub extern "C" fn quill_clear_first_responder() {
    with_host(|host| host.request_first_responder(None));
}

/// The surface's cached selection state as JSON, or null for an unknown surface.
#[unsafe(no_mangle)]
pub extern "C" fn quill_surface_selection_state(surface: u64) -> *mut c_char {
    let state = with_host(|host| host.surface_mut(surface).map(|s| s.selection_state().clone()));
    match state {
        Some(Ok(state)) => selection_json(&state),
        Some(Err(e)) => {
            set_last_error(&e);
            std::ptr::null_mut()
        }
        None => std::ptr::null_mut(),
    }
}

/// The selection state toolbars should display, as JSON.
#[unsafe(no_mangle)]
pub extern "C" fn quill_displayed_selection() -> *mut c_char {
    match with_host(|host| host.arbiter().displayed_selection()) {
        Some(state) => selection_json(&state),
        None => std::ptr::null_mut(),
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn quill_surface_is_ready(surface: u64) -> bool {
    with_host(|host| host.surface_mut(surface).map(|s| s.is_ready()).unwrap_or(false))
        .unwrap_or(false)
}

/// Tear the surface down and forget it.
#[unsafe(no_mangle)]
pub extern "C" fn quill_surface_destroy(surface: u64) -> bool {
    with_host(|host| host.destroy_surface(surface)).unwrap_or(false)
}

/// Free a string returned by this library.
#[unsafe(no_mangle)]
pub extern "C" fn quill_string_free(text: *mut c_char) {
    if !text.is_null() {
        drop(unsafe { CString::from_raw(text) });
    }
}

/// The most recent error message, or null. Clears it.
#[unsafe(no_mangle)]
pub extern "C" fn quill_last_error() -> *mut c_char {
    match take_last_error() {
        Some(message) => into_c_string(message),
        None => std::ptr::null_mut(),
    }
}
