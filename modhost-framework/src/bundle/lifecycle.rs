//! The bundle state machine.
//!
//! ```text
//!               install                        start
//! INSTALLED  ───────────► RESOLVED  ─────────────► STARTING ──► ACTIVE
//!     ▲                      ▲  ▲                      │           │
//!     │                      │  │      stop            │           │
//!     │                      │  └──────────── STOPPING ◄───────────┘
//!     │                      │                         │
//!     │ uninstall            │ refresh                 │
//!     └──────────────────────┘                         │
//!                                                      ▼
//!                                                  UNINSTALLED (terminal)
//! ```

use std::fmt;

use chrono::{DateTime, Utc};

/// The kind of a single lifecycle transition delivered to a bundle
/// listener. Distinct from [`BundleState`]: a bundle listener observes
/// the transition (e.g. `Starting` then `Started`), not a snapshot of
/// `Bundle::state()`, which only ever reports `Starting` or `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleEventKind {
    Installed,
    Resolved,
    Starting,
    Started,
    Stopping,
    Stopped,
    Updated,
    Uninstalled,
}

impl fmt::Display for BundleEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BundleEventKind::Installed => "INSTALLED",
            BundleEventKind::Resolved => "RESOLVED",
            BundleEventKind::Starting => "STARTING",
            BundleEventKind::Started => "STARTED",
            BundleEventKind::Stopping => "STOPPING",
            BundleEventKind::Stopped => "STOPPED",
            BundleEventKind::Updated => "UPDATED",
            BundleEventKind::Uninstalled => "UNINSTALLED",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleState {
    Installed,
    Resolved,
    Starting,
    Active,
    Stopping,
    Uninstalled,
}

impl BundleState {
    /// Whether `self -> next` is one of the transitions the state
    /// diagram allows.
    pub fn can_transition_to(self, next: BundleState) -> bool {
        use BundleState::*;
        matches!(
            (self, next),
            (Installed, Resolved)
                | (Resolved, Starting)
                | (Starting, Active)
                | (Active, Stopping)
                | (Stopping, Resolved)
                | (Resolved, Installed) // refresh
                | (Installed, Uninstalled)
                | (Resolved, Uninstalled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, BundleState::Uninstalled)
    }

    pub fn is_active(self) -> bool {
        matches!(self, BundleState::Active)
    }
}

/// Tracks the current state plus when it was last entered, for
/// diagnostics and the framework's bundle-changed event payload.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    state: BundleState,
    entered_at: DateTime<Utc>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: BundleState::Installed,
            entered_at: Utc::now(),
        }
    }

    pub fn state(&self) -> BundleState {
        self.state
    }

    pub fn entered_at(&self) -> DateTime<Utc> {
        self.entered_at
    }

    /// Applies a transition, returning an error describing the
    /// rejected move if the state diagram disallows it.
    pub fn transition_to(&mut self, next: BundleState) -> Result<(), (BundleState, BundleState)> {
        if !self.state.can_transition_to(next) {
            return Err((self.state, next));
        }
        self.state = next;
        self.entered_at = Utc::now();
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
    fn starts_installed() {
        assert_eq!(Lifecycle::new().state(), BundleState::Installed);
    }

    #[test]
    fn happy_path_install_to_active_to_uninstalled() {
        let mut l = Lifecycle::new();
        l.transition_to(BundleState::Resolved).unwrap();
        l.transition_to(BundleState::Starting).unwrap();
        l.transition_to(BundleState::Active).unwrap();
        l.transition_to(BundleState::Stopping).unwrap();
        l.transition_to(BundleState::Resolved).unwrap();
        l.transition_to(BundleState::Uninstalled).unwrap();
        assert!(l.state().is_terminal());
    }

    #[test]
    fn rejects_skipping_states() {
        let mut l = Lifecycle::new();
        let err = l.transition_to(BundleState::Active).unwrap_err();
        assert_eq!(err, (BundleState::Installed, BundleState::Active));
    }

    #[test]
    fn refresh_returns_resolved_to_installed() {
        let mut l = Lifecycle::new();
        l.transition_to(BundleState::Resolved).unwrap();
        l.transition_to(BundleState::Installed).unwrap();
        assert_eq!(l.state(), BundleState::Installed);
    }

    #[test]
    fn uninstalled_is_terminal_and_rejects_further_transitions() {
        let mut l = Lifecycle::new();
        l.transition_to(BundleState::Uninstalled).unwrap();
        assert!(l.transition_to(BundleState::Resolved).is_err());
    }
}
