//! One embedded editing surface: command dispatch, startup, focus and teardown.
//!
//! Inbound message handling lives in [`crate::router`].

use crate::assets::AssetStager;
use crate::command::{Command, Exclusion};
use crate::delegate::SurfaceDelegate;
use crate::error::{BridgeError, Result};
use crate::focus::FocusArbiter;
use crate::lifecycle::{Lifecycle, LifecycleAction, LifecycleState, Trigger};
use crate::pending::{
    Callback, CommandFuture, CommandResult, EvalOutcome, InvocationId, PendingTable, Reply,
    SkipReason,
};
use crate::selection::SelectionState;
use crate::transport::{Inbound, Transport};
use crate::undo::{CommitTicket, Mutation, UndoCoordinator, UndoMark, UndoSetFuture};
use crate::{Rect, SurfaceId, SurfaceOptions};
use futures::FutureExt;
use futures::future::LocalBoxFuture;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;
use std::time::Duration;

/// Work the surface itself still owes once a command resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    AttributesApplied,
    ContentLoaded,
    FetchSelectionAfterFocus,
    ApplySelection { notify: bool },
    UpdateHeight,
    PasteFinished,
    /// Settle a mutation's undo signal if the command did not succeed.
    Commit { ticket: CommitTicket },
}

pub(crate) type ButtonHandler = Box<dyn FnMut(Rect)>;

/// A single embedded editing surface.
///
/// Commands issued before the startup handshake finishes are never sent to
/// the engine; they resolve as [`Reply::Skipped`] with
/// [`SkipReason::NotReady`]. Every issued command resolves exactly once,
/// including when the surface is torn down first.
pub struct Surface {
    pub(crate) id: SurfaceId,
    pub(crate) options: SurfaceOptions,
    pub(crate) transport: Box<dyn Transport>,
    pub(crate) delegate: Box<dyn SurfaceDelegate>,
    pub(crate) arbiter: Rc<FocusArbiter>,
    pub(crate) lifecycle: Lifecycle,
    pub(crate) pending: PendingTable<Step>,
    pub(crate) selection: SelectionState,
    pub(crate) undo: UndoCoordinator,
    pub(crate) focused: bool,
    pub(crate) paste_in_flight: bool,
    pub(crate) search_active: bool,
    pub(crate) height: Option<u32>,
    pub(crate) base_url: Option<String>,
    pub(crate) images: BTreeSet<String>,
    pub(crate) buttons: HashMap<String, ButtonHandler>,
    seen_focus_generation: u64,
    torn_down: bool,
}

impl Surface {
    pub fn new(
        options: SurfaceOptions,
        transport: Box<dyn Transport>,
        delegate: Box<dyn SurfaceDelegate>,
        arbiter: Rc<FocusArbiter>,
    ) -> Self {
        let id = arbiter.register();
        let seen_focus_generation = arbiter.generation();
        Self {
            id,
            options,
            transport,
            delegate,
            arbiter,
            lifecycle: Lifecycle::new(),
            pending: PendingTable::new(),
            selection: SelectionState::invalid(),
            undo: UndoCoordinator::new(),
            focused: false,
            paste_in_flight: false,
            search_active: false,
            height: None,
            base_url: None,
            images: BTreeSet::new(),
            buttons: HashMap::new(),
            seen_focus_generation,
            torn_down: false,
        }
    }

    // --- startup ---

    /// Stage assets and load the base document.
    ///
    /// The rest of the handshake is driven by engine events. Staging or load
    /// failures move the surface to [`LifecycleState::Failed`] for good.
    pub fn start(&mut self, stager: &mut dyn AssetStager) -> Result<()> {
        if self.torn_down {
            return Err(BridgeError::TornDown);
        }
        if self.lifecycle.apply(Trigger::BeginStaging) != Some(LifecycleAction::StageAssets) {
            return Err(BridgeError::InvalidState(format!(
                "cannot start a surface that is {}",
                self.lifecycle.state()
            )));
        }

        let staged = match stager.stage(&self.options.staging) {
            Ok(staged) => staged,
            Err(e) => {
                self.fail(&e);
                return Err(e);
            }
        };

        if self.lifecycle.apply(Trigger::AssetsStaged) != Some(LifecycleAction::LoadBaseDocument) {
            return Err(BridgeError::InvalidState(
                "asset staging finished out of order".to_string(),
            ));
        }

        tracing::info!(surface = %self.id, url = %staged.base_url, "loading base document");
        self.delegate.will_load(self.id);
        if let Err(e) = self.transport.load(&staged.base_url) {
            self.fail(&e);
            return Err(e);
        }
        self.base_url = Some(staged.base_url);
        Ok(())
    }

    pub(crate) fn lifecycle_event(&mut self, trigger: Trigger) {
        if let Some(action) = self.lifecycle.apply(trigger) {
            self.perform(action);
        }
    }

    fn perform(&mut self, action: LifecycleAction) {
        match action {
            LifecycleAction::LoadUserFiles => {
                let command = Command::LoadUserFiles {
                    script: self.options.user_script.clone(),
                    css: self.options.user_css.clone(),
                };
                self.send(command, Vec::new(), None);
            }
            LifecycleAction::PushAttributes => {
                let command = Command::SetTopLevelAttributes {
                    attributes: self.options.top_level_attributes.clone(),
                };
                self.send(command, vec![Step::AttributesApplied], None);
            }
            LifecycleAction::PushContent => {
                if let Some(text) = self.options.placeholder.clone() {
                    self.send(Command::SetPlaceholder { text }, Vec::new(), None);
                }
                let command = Command::SetHtml {
                    html: self.options.initial_html.clone(),
                    select: false,
                };
                self.send(command, vec![Step::ContentLoaded], None);
            }
            LifecycleAction::NotifyReady => self.on_ready(),
            LifecycleAction::StageAssets
            | LifecycleAction::LoadBaseDocument
            | LifecycleAction::Abort => {}
        }
    }

    fn on_ready(&mut self) {
        tracing::info!(surface = %self.id, "surface ready");
        self.delegate.did_load(self.id);
        if self.options.claim_first_responder_on_ready {
            self.arbiter.request_first_responder(Some(self.id));
        }
        self.sync_focus();
    }

    fn fail(&mut self, error: &BridgeError) {
        tracing::error!(surface = %self.id, error = %error, "surface failed to load");
        if self.lifecycle.apply(Trigger::Fatal).is_some() {
            self.delegate.load_failed(self.id, error);
        }
    }

    // --- commands ---

    /// Issue a command and forget it. Failures are logged.
    pub fn issue(&mut self, command: Command) {
        self.dispatch(command, None, None);
    }

    /// Issue a command; `on_done` runs exactly once with its result.
    pub fn issue_with(&mut self, command: Command, on_done: impl FnOnce(CommandResult) + 'static) {
        self.dispatch(command, None, Some(Box::new(on_done)));
    }

    /// Issue a command and await its result.
    pub fn request(&mut self, command: Command) -> CommandFuture {
        let (callback, future) = CommandFuture::channel();
        self.dispatch(command, None, Some(callback));
        future
    }

    /// Issue a mutating command and get both of its signals.
    ///
    /// `committed` resolves on the `undoSet` that belongs to this command:
    /// mutations issued back to back each wait for their own. Wait for it,
    /// not for `completion`, before undoing.
    pub fn mutate(&mut self, command: Command) -> Mutation {
        if !command.is_mutating() {
            tracing::warn!(surface = %self.id, command = command.name(), "mutate() with a non-mutating command");
        }
        if self.torn_down || !self.lifecycle.is_ready() {
            let error = if self.torn_down {
                BridgeError::TornDown
            } else {
                BridgeError::NotReady
            };
            return Mutation {
                completion: self.request(command),
                committed: UndoSetFuture::rejected(error),
            };
        }
        let (ticket, committed) = self.undo.expect_commit();
        let (callback, completion) = CommandFuture::channel();
        self.dispatch_steps(command, vec![Step::Commit { ticket }], Some(callback));
        Mutation {
            completion,
            committed,
        }
    }

    pub fn undo(&mut self) -> CommandFuture {
        self.request(Command::Undo)
    }

    pub fn redo(&mut self) -> CommandFuture {
        self.request(Command::Redo)
    }

    pub fn get_html(&mut self, pretty: bool, clean: bool) -> LocalBoxFuture<'static, Result<String>> {
        let reply = self.request(Command::GetHtml { pretty, clean });
        async move {
            match reply.await? {
                Reply::Done(Some(Value::String(html))) => Ok(html),
                Reply::Done(None) | Reply::Done(Some(Value::Null)) => Ok(String::new()),
                Reply::Done(Some(other)) => Err(BridgeError::MalformedMessage(format!(
                    "getHTML returned {}",
                    other
                ))),
                Reply::Skipped(reason) => Err(reason.into()),
            }
        }
        .boxed_local()
    }

    /// Fetch the selection state, replacing the cached one.
    pub fn get_selection_state(&mut self) -> LocalBoxFuture<'static, Result<SelectionState>> {
        let (callback, reply) = CommandFuture::channel();
        self.dispatch(
            Command::GetSelectionState,
            Some(Step::ApplySelection { notify: false }),
            Some(callback),
        );
        async move {
            match reply.await? {
                Reply::Done(value) => Ok(SelectionState::from_value(value.unwrap_or(Value::Null))),
                Reply::Skipped(reason) => Err(reason.into()),
            }
        }
        .boxed_local()
    }

    pub(crate) fn fetch_selection(&mut self, notify: bool) {
        self.dispatch(
            Command::GetSelectionState,
            Some(Step::ApplySelection { notify }),
            None,
        );
    }

    /// Gate for every command the host issues.
    pub(crate) fn dispatch(
        &mut self,
        command: Command,
        step: Option<Step>,
        callback: Option<Callback>,
    ) {
        self.dispatch_steps(command, step.into_iter().collect(), callback);
    }

    fn dispatch_steps(&mut self, command: Command, mut steps: Vec<Step>, callback: Option<Callback>) {
        if self.torn_down {
            self.cancel_commits(&steps, "surface torn down");
            Self::resolve_early(callback, Ok(Reply::Skipped(SkipReason::TornDown)));
            return;
        }
        if !self.lifecycle.is_ready() {
            tracing::debug!(
                surface = %self.id,
                command = command.name(),
                state = %self.lifecycle.state(),
                "not ready, command dropped"
            );
            self.cancel_commits(&steps, "surface not ready");
            Self::resolve_early(callback, Ok(Reply::Skipped(SkipReason::NotReady)));
            return;
        }

        if command.exclusion() == Some(Exclusion::Paste) {
            if self.paste_in_flight {
                tracing::debug!(surface = %self.id, command = command.name(), "paste already in flight");
                self.cancel_commits(&steps, "paste already in flight");
                Self::resolve_early(callback, Err(BridgeError::PasteInFlight));
                return;
            }
            self.paste_in_flight = true;
            steps.push(Step::PasteFinished);
        }

        self.send(command, steps, callback);
    }

    fn cancel_commits(&mut self, steps: &[Step], reason: &str) {
        for step in steps {
            if let Step::Commit { ticket } = step {
                self.undo.cancel_commit(*ticket, reason.to_string());
            }
        }
    }

    fn resolve_early(callback: Option<Callback>, result: CommandResult) {
        if let Some(callback) = callback {
            callback(result);
        }
    }

    /// Hand a command to the transport without the readiness gate.
    fn send(&mut self, command: Command, steps: Vec<Step>, callback: Option<Callback>) {
        let script = command.script(&self.options.namespace);
        let name = command.name();
        let invocation = self.pending.insert(name, steps, callback);
        tracing::trace!(surface = %self.id, command = name, %invocation, "evaluating");
        if let Err(e) = self.transport.evaluate(invocation, &script) {
            tracing::warn!(surface = %self.id, command = name, error = %e, "transport rejected command");
            let error = match e {
                BridgeError::Transport(_) => e,
                other => BridgeError::Transport(other.to_string()),
            };
            self.resolve(invocation, Err(error));
        }
    }

    /// Deliver the outcome of an evaluation.
    ///
    /// Unknown or already-resolved invocations are ignored.
    pub fn complete(&mut self, invocation: InvocationId, outcome: EvalOutcome) {
        let result = match outcome {
            Ok(value) => Ok(Reply::Done(value)),
            Err(message) => Err(BridgeError::Engine(message)),
        };
        self.resolve(invocation, result);
    }

    fn resolve(&mut self, invocation: InvocationId, result: CommandResult) {
        let Some(entry) = self.pending.take(invocation) else {
            tracing::debug!(surface = %self.id, %invocation, "completion for unknown invocation");
            return;
        };
        for step in entry.steps {
            self.run_step(step, &result);
        }
        match entry.callback {
            Some(callback) => callback(result),
            None => {
                if let Err(e) = &result {
                    tracing::warn!(surface = %self.id, command = entry.command, error = %e, "command failed");
                }
            }
        }
    }

    fn run_step(&mut self, step: Step, result: &CommandResult) {
        match step {
            Step::AttributesApplied => {
                if let Err(e) = result {
                    tracing::warn!(surface = %self.id, error = %e, "top-level attributes not applied");
                }
                self.lifecycle_event(Trigger::AttributesApplied);
            }
            Step::ContentLoaded => match result {
                Ok(_) => self.lifecycle_event(Trigger::ContentLoaded),
                Err(e) => {
                    let error = BridgeError::InvalidState(format!("initial content rejected: {}", e));
                    self.fail(&error);
                }
            },
            Step::FetchSelectionAfterFocus => {
                if let Err(e) = result {
                    tracing::warn!(surface = %self.id, error = %e, "focus command failed");
                }
                self.fetch_selection(true);
            }
            Step::ApplySelection { notify } => match result {
                Ok(Reply::Done(value)) => {
                    let state = SelectionState::from_value(value.clone().unwrap_or(Value::Null));
                    self.reconcile(state, notify);
                }
                Ok(Reply::Skipped(_)) => {}
                Err(e) => {
                    tracing::warn!(surface = %self.id, error = %e, "selection fetch failed, resetting");
                    self.reconcile(SelectionState::invalid(), notify);
                }
            },
            Step::UpdateHeight => {
                if let Ok(Reply::Done(Some(value))) = result {
                    let height = value
                        .as_u64()
                        .or_else(|| value.as_f64().filter(|h| *h >= 0.0).map(|h| h.round() as u64))
                        .map(|h| h.min(u32::MAX as u64) as u32);
                    match height {
                        Some(height) if self.height != Some(height) => {
                            self.height = Some(height);
                            self.delegate.height_changed(self.id, height);
                        }
                        Some(_) => {}
                        None => tracing::debug!(surface = %self.id, %value, "unusable height"),
                    }
                }
            }
            Step::PasteFinished => self.paste_in_flight = false,
            Step::Commit { ticket } => match result {
                Ok(Reply::Done(_)) => {}
                Ok(Reply::Skipped(reason)) => {
                    self.undo.cancel_commit(ticket, format!("mutation skipped: {:?}", reason));
                }
                Err(e) => self.undo.cancel_commit(ticket, format!("mutation failed: {}", e)),
            },
        }
    }

    /// Replace the cached selection wholesale.
    pub(crate) fn reconcile(&mut self, state: SelectionState, notify: bool) {
        self.selection = state;
        if self.arbiter.selected() == Some(self.id) {
            self.arbiter.display(&self.selection);
        }
        if !notify {
            return;
        }
        self.delegate.selection_changed(self.id, &self.selection);
        if self.selection.is_in_link() {
            self.delegate.link_selected(self.id, &self.selection);
        }
        if self.selection.is_in_image() {
            self.delegate.image_selected(self.id, &self.selection);
        }
        if self.selection.is_in_table() {
            self.delegate.table_selected(self.id, &self.selection);
        }
    }

    // --- inbound and focus ---

    /// Drain the transport and act on any first-responder change.
    ///
    /// Returns how many inbound items were processed.
    pub fn pump(&mut self) -> usize {
        let inbound = self.transport.pump();
        let count = inbound.len();
        for item in inbound {
            match item {
                Inbound::Posted(raw) => self.on_receive(&raw),
                Inbound::Completed {
                    invocation,
                    outcome,
                } => self.complete(invocation, outcome),
            }
        }
        self.sync_focus();
        count
    }

    /// Wait up to `timeout` for engine traffic, then [`pump`](Self::pump).
    pub fn pump_blocking(&mut self, timeout: Duration) -> usize {
        if !self.torn_down {
            self.transport.wait(timeout);
        }
        self.pump()
    }

    /// Claim first responder if the arbiter's request changed to this surface.
    pub fn sync_focus(&mut self) {
        if self.torn_down || !self.lifecycle.is_ready() {
            return;
        }
        let generation = self.arbiter.generation();
        if generation == self.seen_focus_generation {
            return;
        }
        self.seen_focus_generation = generation;
        if self.arbiter.desired_first_responder() == Some(self.id) {
            self.become_first_responder();
        }
    }

    /// Ask the arbiter to make this surface first responder.
    pub fn request_focus(&mut self) {
        self.arbiter.request_first_responder(Some(self.id));
        self.sync_focus();
    }

    /// Take focus, then fetch the selection.
    ///
    /// The fetch waits for the focus command to finish; the engine's
    /// selection means nothing before that.
    pub fn become_first_responder(&mut self) {
        if self.torn_down || !self.lifecycle.is_ready() {
            tracing::debug!(surface = %self.id, "not ready to become first responder");
            return;
        }
        let was_focused = self.focused;
        self.focused = true;
        self.arbiter.select(self.id);
        if was_focused {
            self.fetch_selection(true);
        } else {
            self.dispatch(Command::Focus, Some(Step::FetchSelectionAfterFocus), None);
        }
    }

    /// Run `handler` when the engine reports button `id` was clicked.
    pub fn register_button(&mut self, id: impl Into<String>, handler: impl FnMut(Rect) + 'static) {
        self.buttons.insert(id.into(), Box::new(handler));
    }

    pub fn unregister_button(&mut self, id: &str) -> bool {
        self.buttons.remove(id).is_some()
    }

    // --- undo marks ---

    pub fn undo_mark(&self) -> UndoMark {
        self.undo.mark()
    }

    /// Resolves once an `undoSet` later than `mark` has arrived.
    pub fn undo_set_since(&mut self, mark: UndoMark) -> UndoSetFuture {
        if self.torn_down {
            return UndoSetFuture::rejected(BridgeError::TornDown);
        }
        self.undo.since(mark)
    }

    // --- teardown ---

    /// Tell the engine to tear down and resolve everything still pending.
    pub fn tear_down(&mut self) {
        if self.torn_down {
            return;
        }
        if self.base_url.is_some() && !self.lifecycle.is_failed() {
            self.send(Command::Teardown, Vec::new(), None);
        }
        self.torn_down = true;

        let pending = self.pending.drain();
        if !pending.is_empty() {
            tracing::debug!(surface = %self.id, count = pending.len(), "resolving pending commands on teardown");
        }
        for entry in pending {
            if let Some(callback) = entry.callback {
                callback(Ok(Reply::Skipped(SkipReason::TornDown)));
            }
        }
        self.paste_in_flight = false;
        self.focused = false;
        self.undo.abandon();
        self.arbiter.unregister(self.id);
        if let Err(e) = self.transport.shutdown() {
            tracing::warn!(surface = %self.id, error = %e, "transport shutdown failed");
        }
    }

    // --- accessors ---

    pub fn id(&self) -> SurfaceId {
        self.id
    }

    pub fn is_ready(&self) -> bool {
        self.lifecycle.is_ready() && !self.torn_down
    }

    pub fn lifecycle_state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    pub fn selection_state(&self) -> &SelectionState {
        &self.selection
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    pub fn is_search_active(&self) -> bool {
        self.search_active
    }

    pub fn is_paste_in_flight(&self) -> bool {
        self.paste_in_flight
    }

    /// Last content height the engine reported.
    pub fn height(&self) -> Option<u32> {
        self.height
    }

    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    /// Images the engine reported as added and not yet deleted.
    pub fn images(&self) -> &BTreeSet<String> {
        &self.images
    }

    /// Mutations still waiting for their `undoSet`.
    pub fn uncommitted_mutations(&self) -> usize {
        self.undo.outstanding_commits()
    }

    /// Commands still waiting for the engine.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn arbiter(&self) -> &Rc<FocusArbiter> {
        &self.arbiter
    }

    pub fn options(&self) -> &SurfaceOptions {
        &self.options
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        self.tear_down();
    }
}

impl std::fmt::Debug for Surface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Surface")
            .field("id", &self.id)
            .field("state", &self.lifecycle.state())
            .field("focused", &self.focused)
            .field("pending", &self.pending.len())
            .field("torn_down", &self.torn_down)
            .finish()
    }
}
