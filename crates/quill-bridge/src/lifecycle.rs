//! Startup handshake from surface creation to edit-ready.
//!
//! The machine only decides; it never performs I/O. Each accepted trigger
//! yields the action the owning surface must carry out next.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Created,
    RootAssetsLoading,
    AwaitingReady,
    UserAssetsLoading,
    AttributesSet,
    ContentLoading,
    Ready,
    /// Terminal. A surface that failed to start is never retried.
    Failed,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Created => "created",
            LifecycleState::RootAssetsLoading => "root-assets-loading",
            LifecycleState::AwaitingReady => "awaiting-ready",
            LifecycleState::UserAssetsLoading => "user-assets-loading",
            LifecycleState::AttributesSet => "attributes-set",
            LifecycleState::ContentLoading => "content-loading",
            LifecycleState::Ready => "ready",
            LifecycleState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Something that happened to the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    BeginStaging,
    AssetsStaged,
    /// The engine posted `ready`.
    ReadyEvent,
    /// The engine posted `loadedUserFiles`.
    LoadedUserFiles,
    AttributesApplied,
    ContentLoaded,
    Fatal,
}

/// Work the surface owes after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    StageAssets,
    LoadBaseDocument,
    LoadUserFiles,
    PushAttributes,
    PushContent,
    NotifyReady,
    Abort,
}

#[derive(Debug, Clone)]
pub struct Lifecycle {
    state: LifecycleState,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: LifecycleState::Created,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == LifecycleState::Ready
    }

    pub fn is_failed(&self) -> bool {
        self.state == LifecycleState::Failed
    }

    /// Feed a trigger. Returns the follow-up action, or `None` when the
    /// trigger does not apply in the current state.
    pub fn apply(&mut self, trigger: Trigger) -> Option<LifecycleAction> {
        use LifecycleAction as A;
        use LifecycleState as S;

        let (next, action) = match (self.state, trigger) {
            (S::Failed, _) => return None,
            (_, Trigger::Fatal) => (S::Failed, A::Abort),
            (S::Created, Trigger::BeginStaging) => (S::RootAssetsLoading, A::StageAssets),
            (S::RootAssetsLoading, Trigger::AssetsStaged) => {
                (S::AwaitingReady, A::LoadBaseDocument)
            }
            (S::AwaitingReady, Trigger::ReadyEvent) => (S::UserAssetsLoading, A::LoadUserFiles),
            (S::UserAssetsLoading, Trigger::LoadedUserFiles) => {
                (S::AttributesSet, A::PushAttributes)
            }
            (S::AttributesSet, Trigger::AttributesApplied) => {
                (S::ContentLoading, A::PushContent)
            }
            (S::ContentLoading, Trigger::ContentLoaded) => (S::Ready, A::NotifyReady),
            (state, trigger) => {
                tracing::debug!(%state, ?trigger, "ignoring out-of-order lifecycle trigger");
                return None;
            }
        };

        tracing::debug!(from = %self.state, to = %next, "lifecycle transition");
        self.state = next;
        Some(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drive(lifecycle: &mut Lifecycle, triggers: &[Trigger]) -> Vec<Option<LifecycleAction>> {
        triggers.iter().map(|t| lifecycle.apply(*t)).collect()
    }

    #[test]
    fn test_happy_path() {
        let mut lifecycle = Lifecycle::new();
        let actions = drive(
            &mut lifecycle,
            &[
                Trigger::BeginStaging,
                Trigger::AssetsStaged,
                Trigger::ReadyEvent,
                Trigger::LoadedUserFiles,
                Trigger::AttributesApplied,
            ],
        );
        assert!(actions.iter().all(Option::is_some));
        assert!(!lifecycle.is_ready());

        assert_eq!(
            lifecycle.apply(Trigger::ContentLoaded),
            Some(LifecycleAction::NotifyReady)
        );
        assert!(lifecycle.is_ready());
    }

    #[test]
    fn test_out_of_order_events_are_ignored() {
        let mut lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.apply(Trigger::ReadyEvent), None);
        assert_eq!(lifecycle.apply(Trigger::LoadedUserFiles), None);
        assert_eq!(lifecycle.state(), LifecycleState::Created);

        lifecycle.apply(Trigger::BeginStaging);
        lifecycle.apply(Trigger::AssetsStaged);
        assert_eq!(lifecycle.apply(Trigger::LoadedUserFiles), None);
        assert_eq!(lifecycle.state(), LifecycleState::AwaitingReady);
    }

    #[test]
    fn test_ready_events_after_ready_are_noops() {
        let mut lifecycle = Lifecycle::new();
        drive(
            &mut lifecycle,
            &[
                Trigger::BeginStaging,
                Trigger::AssetsStaged,
                Trigger::ReadyEvent,
                Trigger::LoadedUserFiles,
                Trigger::AttributesApplied,
                Trigger::ContentLoaded,
            ],
        );
        assert_eq!(lifecycle.apply(Trigger::ReadyEvent), None);
        assert_eq!(lifecycle.apply(Trigger::LoadedUserFiles), None);
        assert_eq!(lifecycle.apply(Trigger::ContentLoaded), None);
        assert!(lifecycle.is_ready());
    }

    #[test]
    fn test_failure_is_terminal() {
        let mut lifecycle = Lifecycle::new();
        lifecycle.apply(Trigger::BeginStaging);
        assert_eq!(lifecycle.apply(Trigger::Fatal), Some(LifecycleAction::Abort));
        assert!(lifecycle.is_failed());
        assert_eq!(lifecycle.apply(Trigger::AssetsStaged), None);
        assert_eq!(lifecycle.apply(Trigger::Fatal), None);
        assert!(!lifecycle.is_ready());
    }
}
