//! Notifications a surface forwards to its host.

use crate::error::BridgeError;
use crate::event::{Dimensions, EngineError};
use crate::selection::SelectionState;
use crate::{Rect, SurfaceId};

/// Host-side observer of one surface.
///
/// Every method has an empty default so hosts implement only what they
/// render. All calls happen on the thread that drives the surface.
#[allow(unused_variables)]
pub trait SurfaceDelegate {
    /// Content changed. `region` is the editable region that changed, if the
    /// engine named one.
    fn input_received(&mut self, surface: SurfaceId, region: Option<&str>) {}

    fn height_changed(&mut self, surface: SurfaceId, height: u32) {}

    fn took_focus(&mut self, surface: SurfaceId) {}

    fn lost_focus(&mut self, surface: SurfaceId) {}

    /// The base document is about to load.
    fn will_load(&mut self, surface: SurfaceId) {}

    /// The surface finished its startup handshake and accepts commands.
    fn did_load(&mut self, surface: SurfaceId) {}

    /// The surface could not start and will never become ready.
    fn load_failed(&mut self, surface: SurfaceId, error: &BridgeError) {}

    fn selection_changed(&mut self, surface: SurfaceId, selection: &SelectionState) {}

    fn clicked(&mut self, surface: SurfaceId) {}

    /// The engine pushed an entry onto its undo stack.
    fn undo_set(&mut self, surface: SurfaceId) {}

    fn link_selected(&mut self, surface: SurfaceId, selection: &SelectionState) {}

    fn image_selected(&mut self, surface: SurfaceId, selection: &SelectionState) {}

    fn table_selected(&mut self, surface: SurfaceId, selection: &SelectionState) {}

    fn image_added(&mut self, surface: SurfaceId, src: &str, region: Option<&str>) {}

    fn image_deleted(&mut self, surface: SurfaceId, src: &str, region: Option<&str>) {}

    /// The engine wants `src` placed on the clipboard.
    fn copy_image(
        &mut self,
        surface: SurfaceId,
        src: &str,
        dimensions: Dimensions,
        alt: Option<&str>,
    ) {
    }

    /// The engine reported an error. Only `alert` errors are user-facing.
    fn error_occurred(&mut self, surface: SurfaceId, error: &EngineError) {}

    fn button_clicked(&mut self, surface: SurfaceId, id: &str, rect: Rect) {}

    fn search_activated(&mut self, surface: SurfaceId) {}

    fn search_deactivated(&mut self, surface: SurfaceId) {}

    fn searched(&mut self, surface: SurfaceId) {}

    /// Trace of a user-level action performed inside the engine.
    fn action(&mut self, surface: SurfaceId, action: &str) {}
}

/// A delegate that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDelegate;

impl SurfaceDelegate for NoopDelegate {}
