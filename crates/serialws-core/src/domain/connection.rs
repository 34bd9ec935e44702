//! Lifecycle of one websocket leg (the outbound client link, or one server peer).
//!
//! ```text
//!                 connect ok
//! Disconnected ──► Connecting ──────────► Connected
//!      ▲               │                      │
//!      └───────────────┴──── failure/close ───┘
//! ```
//!
//! The cycle repeats indefinitely for the client link.  A server peer walks it
//! once and is then discarded.

use serde::Serialize;
use thiserror::Error;

/// State of a single websocket connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No connection and no attempt in flight.
    #[default]
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Handshake complete; lines may be written.
    Connected,
}

/// Returned when a transition is not part of the lifecycle above.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid connection state transition: {from:?} -> {to:?}")]
pub struct StateError {
    pub from: ConnectionState,
    pub to: ConnectionState,
}

impl ConnectionState {
    /// Whether `self → next` is a legal transition.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Connected)
                | (Connecting, Disconnected)
                | (Connected, Disconnected)
        )
    }

    /// Performs the transition, or explains why it is not allowed.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] for any transition outside the lifecycle,
    /// including "transitions" to the current state.
    pub fn transition(self, next: ConnectionState) -> Result<ConnectionState, StateError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(StateError { from: self, to: next })
        }
    }

    /// `true` only in [`ConnectionState::Connected`].
    pub fn is_connected(self) -> bool {
        self == ConnectionState::Connected
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::ConnectionState::*;
    use super::*;

    #[test]
    fn test_default_state_is_disconnected() {
        assert_eq!(ConnectionState::default(), Disconnected);
    }

    #[test]
    fn test_full_cycle_is_allowed() {
        let state = Disconnected
            .transition(Connecting)
            .and_then(|s| s.transition(Connected))
            .and_then(|s| s.transition(Disconnected));
        assert_eq!(state, Ok(Disconnected));
    }

    #[test]
    fn test_connect_failure_returns_to_disconnected() {
        assert_eq!(Connecting.transition(Disconnected), Ok(Disconnected));
    }

    #[test]
    fn test_skipping_connecting_is_rejected() {
        let err = Disconnected.transition(Connected).unwrap_err();
        assert_eq!(
            err,
            StateError {
                from: Disconnected,
                to: Connected
            }
        );
    }

    #[test]
    fn test_self_transitions_are_rejected() {
        for state in [Disconnected, Connecting, Connected] {
            assert!(!state.can_transition_to(state), "{state:?} -> {state:?}");
        }
    }

    #[test]
    fn test_connected_cannot_go_back_to_connecting() {
        assert!(Connected.transition(Connecting).is_err());
    }

    #[test]
    fn test_is_connected_only_in_connected() {
        assert!(Connected.is_connected());
        assert!(!Connecting.is_connected());
        assert!(!Disconnected.is_connected());
    }
}
