//! # Connection States
//!
//! The named states of a [`crate::Connection`] and the allow-list that says
//! which state may follow which.
//!
//! ## Transition Table
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Connection State Machine                            │
//! │                                                                         │
//! │             connect()                                                   │
//! │    ┌──────┐ ─────────► ┌────────────────┐  granted   ┌───────────┐      │
//! │    │ Idle │            │ Authenticating │ ─────────► │ Connected │      │
//! │    └──────┘ ◄───────── └────────────────┘            └─────┬─────┘      │
//! │              rejected                                      │            │
//! │                                          update_catalog()  │            │
//! │                         ┌──────────────────────────────────┘            │
//! │                         ▼                                               │
//! │              ┌─────────────────┐  update:complete  ┌─────────┐          │
//! │              │ UpdatingCatalog │ ────────────────► │ Running │          │
//! │              └─────────────────┘ ◄──────────────── └─────────┘          │
//! │                                   update_catalog()                      │
//! │                                                                         │
//! │    Connected / Running / UpdatingCatalog ── transport closed ──►       │
//! │    Reconnecting ── transport opened ──► Connected                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `Running` is marked as expected to change at any time: it accepts any
//! follow-up state except itself and `Authenticating`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Named state of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Idle,
    Authenticating,
    Connected,
    Running,
    UpdatingCatalog,
    Reconnecting,
}

impl ConnectionState {
    /// Returns true if this state is expected to be replaced at any moment.
    pub fn will_transition(self) -> bool {
        matches!(self, ConnectionState::Running)
    }

    /// Returns true if `next` may replace `self`.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;

        if self.will_transition() {
            return next != self && next != Authenticating;
        }

        matches!(
            (self, next),
            (Idle, Authenticating)
                | (Authenticating, Connected)
                | (Authenticating, Idle)
                | (Connected, UpdatingCatalog)
                | (Connected, Reconnecting)
                | (UpdatingCatalog, Running)
                | (UpdatingCatalog, Reconnecting)
                | (Reconnecting, Connected)
        )
    }

    /// Returns true once the user session exists.
    pub fn is_signed_in(self) -> bool {
        !matches!(self, ConnectionState::Idle | ConnectionState::Authenticating)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Authenticating => "authenticating",
            ConnectionState::Connected => "connected",
            ConnectionState::Running => "running",
            ConnectionState::UpdatingCatalog => "updating_catalog",
            ConnectionState::Reconnecting => "reconnecting",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConnectionState::*;

    const ALL: [ConnectionState; 6] = [
        Idle,
        Authenticating,
        Connected,
        Running,
        UpdatingCatalog,
        Reconnecting,
    ];

    #[test]
    fn test_idle_only_authenticates() {
        for next in ALL {
            assert_eq!(Idle.can_transition_to(next), next == Authenticating);
        }
    }

    #[test]
    fn test_connected_rejects_connect() {
        assert!(!Connected.can_transition_to(Authenticating));
        assert!(Connected.can_transition_to(UpdatingCatalog));
        assert!(Connected.can_transition_to(Reconnecting));
    }

    #[test]
    fn test_running_accepts_any_other_state() {
        assert!(Running.can_transition_to(UpdatingCatalog));
        assert!(Running.can_transition_to(Reconnecting));
        assert!(Running.can_transition_to(Connected));
        assert!(!Running.can_transition_to(Running));
        assert!(!Running.can_transition_to(Authenticating));
    }

    #[test]
    fn test_no_self_transitions() {
        for state in ALL {
            assert!(!state.can_transition_to(state), "{} -> {}", state, state);
        }
    }

    #[test]
    fn test_reconnecting_returns_to_connected() {
        for next in ALL {
            assert_eq!(Reconnecting.can_transition_to(next), next == Connected);
        }
    }

    #[test]
    fn test_serialization() {
        let json = serde_json::to_string(&UpdatingCatalog).unwrap();
        assert_eq!(json, "\"updating_catalog\"");
        assert_eq!(UpdatingCatalog.to_string(), "updating_catalog");
    }
}
