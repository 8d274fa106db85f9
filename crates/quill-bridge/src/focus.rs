//! Focus arbitration between surfaces sharing one host window.
//!
//! The arbiter records which surface the host wants focused, which surface
//! actually holds focus, and the selection state shown by the shared
//! toolbar. Surfaces observe a desired-responder change by comparing the
//! arbiter's generation counter against the last one they acted on.

use crate::SurfaceId;
use crate::selection::SelectionState;
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

#[derive(Debug, Default)]
struct ArbiterState {
    next_id: u64,
    registered: BTreeSet<SurfaceId>,
    desired: Option<SurfaceId>,
    generation: u64,
    selected: Option<SurfaceId>,
    displayed: SelectionState,
}

/// Shared focus and toolbar state for a group of surfaces.
#[derive(Debug, Default)]
pub struct FocusArbiter {
    inner: RefCell<ArbiterState>,
}

impl FocusArbiter {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub(crate) fn register(&self) -> SurfaceId {
        let mut state = self.inner.borrow_mut();
        let id = SurfaceId(state.next_id);
        state.next_id += 1;
        state.registered.insert(id);
        tracing::debug!("Registered {}", id);
        id
    }

    pub(crate) fn unregister(&self, id: SurfaceId) {
        let mut state = self.inner.borrow_mut();
        state.registered.remove(&id);
        if state.desired == Some(id) {
            state.desired = None;
            state.generation += 1;
        }
        if state.selected == Some(id) {
            state.selected = None;
            state.displayed = SelectionState::invalid();
        }
        tracing::debug!("Unregistered {}", id);
    }

    /// Ask for `id` to become first responder, or clear the request.
    ///
    /// Surfaces act on this the next time they are pumped.
    pub fn request_first_responder(&self, id: Option<SurfaceId>) {
        let mut state = self.inner.borrow_mut();
        if let Some(id) = id {
            if !state.registered.contains(&id) {
                tracing::warn!("First responder request for unknown {}", id);
                return;
            }
        }
        state.desired = id;
        state.generation += 1;
    }

    pub fn desired_first_responder(&self) -> Option<SurfaceId> {
        self.inner.borrow().desired
    }

    /// Bumped on every first-responder request.
    pub fn generation(&self) -> u64 {
        self.inner.borrow().generation
    }

    /// Surface that most recently gained focus.
    pub fn selected(&self) -> Option<SurfaceId> {
        self.inner.borrow().selected
    }

    pub(crate) fn select(&self, id: SurfaceId) {
        let mut state = self.inner.borrow_mut();
        if state.selected != Some(id) {
            tracing::debug!("Selected surface is now {}", id);
            state.selected = Some(id);
        }
    }

    /// Selection state the shared toolbar should show.
    pub fn displayed_selection(&self) -> SelectionState {
        self.inner.borrow().displayed.clone()
    }

    pub(crate) fn display(&self, selection: &SelectionState) {
        self.inner.borrow_mut().displayed = selection.clone();
    }

    pub fn is_registered(&self, id: SurfaceId) -> bool {
        self.inner.borrow().registered.contains(&id)
    }
}
