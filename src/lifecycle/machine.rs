//! Engine lifecycle state machine
//!
//! `Inactive -> Activating -> Active -> Inactivating -> Inactive`, with
//! `Activating -> Inactive` when the hook cannot be installed. Every
//! transition is validated and published on a watch channel.

use std::time::Instant;

use tokio::sync::watch;
use tracing::info;

use crate::error::LifecycleError;

/// The four lifecycle states of an engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecycleState {
    /// No hook installed; registrations may still be added
    #[default]
    Inactive,
    /// Hook installation in progress
    Activating,
    /// Hook installed, events flowing
    Active,
    /// Hook removal and dispatch drain in progress
    Inactivating,
}

impl LifecycleState {
    /// Whether `next` is a legal successor of this state
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;

        matches!(
            (self, next),
            (Inactive, Activating)
                | (Activating, Active)
                | (Activating, Inactive)
                | (Active, Inactivating)
                | (Inactivating, Inactive)
        )
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleState::Inactive => write!(f, "Inactive"),
            LifecycleState::Activating => write!(f, "Activating"),
            LifecycleState::Active => write!(f, "Active"),
            LifecycleState::Inactivating => write!(f, "Inactivating"),
        }
    }
}

/// Current lifecycle state plus its observers
#[derive(Debug)]
pub struct Lifecycle {
    state: LifecycleState,
    entered_at: Instant,
    state_tx: watch::Sender<LifecycleState>,
}

impl Lifecycle {
    pub fn new() -> Self {
        let (state_tx, _) = watch::channel(LifecycleState::Inactive);
        Self {
            state: LifecycleState::Inactive,
            entered_at: Instant::now(),
            state_tx,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state_tx.subscribe()
    }

    /// Move to `next`, or fail without changing state
    pub fn transition_to(&mut self, next: LifecycleState) -> Result<(), LifecycleError> {
        let from = self.state;
        if !from.can_transition_to(next) {
            return Err(LifecycleError::InvalidTransition { from, to: next });
        }

        let duration_ms = self.entered_at.elapsed().as_millis() as u64;
        info!(
            from = %from,
            to = %next,
            duration_ms = duration_ms,
            "lifecycle transition"
        );

        self.state = next;
        self.entered_at = Instant::now();
        self.state_tx.send_replace(next);
        Ok(())
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.state(), LifecycleState::Inactive);
    }

    #[test]
    fn test_full_cycle() {
        let mut lifecycle = Lifecycle::new();
        for next in [
            LifecycleState::Activating,
            LifecycleState::Active,
            LifecycleState::Inactivating,
            LifecycleState::Inactive,
        ] {
            lifecycle.transition_to(next).unwrap();
            assert_eq!(lifecycle.state(), next);
        }
    }

    #[test]
    fn test_failed_activation_returns_to_inactive() {
        let mut lifecycle = Lifecycle::new();
        lifecycle.transition_to(LifecycleState::Activating).unwrap();
        lifecycle.transition_to(LifecycleState::Inactive).unwrap();
        assert_eq!(lifecycle.state(), LifecycleState::Inactive);
    }

    #[test]
    fn test_invalid_transition_is_rejected() {
        let mut lifecycle = Lifecycle::new();
        let err = lifecycle.transition_to(LifecycleState::Active).unwrap_err();
        assert_eq!(
            err,
            LifecycleError::InvalidTransition {
                from: LifecycleState::Inactive,
                to: LifecycleState::Active,
            }
        );
        assert_eq!(lifecycle.state(), LifecycleState::Inactive);
    }

    #[test]
    fn test_active_cannot_reactivate() {
        assert!(!LifecycleState::Active.can_transition_to(LifecycleState::Activating));
        assert!(!LifecycleState::Inactivating.can_transition_to(LifecycleState::Active));
        assert!(!LifecycleState::Inactive.can_transition_to(LifecycleState::Inactive));
    }

    #[test]
    fn test_watchers_see_transitions() {
        let mut lifecycle = Lifecycle::new();
        let rx = lifecycle.subscribe();
        lifecycle.transition_to(LifecycleState::Activating).unwrap();
        assert_eq!(*rx.borrow(), LifecycleState::Activating);
    }
}
