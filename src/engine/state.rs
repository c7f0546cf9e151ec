//! Engine connection state machine
//!
//! Pure transition function in the same shape as a reducer: the engine feeds
//! lifecycle events in and stores whatever comes out.

use tracing::{debug, info, warn};

/// Connection lifecycle of the protocol engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineState {
    /// Transport not yet initialized
    #[default]
    Uninitialized,
    /// Transport started, waiting for the broker
    Connecting,
    /// Session established; publishing allowed
    Connected,
    /// Session lost; publishing rejected until the next connect
    Disconnected,
}

/// Lifecycle inputs to the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateEvent {
    /// Transport initialized and started
    TransportStarted,
    /// Connect event from the transport
    ConnectionEstablished,
    /// Disconnect event from the transport
    ConnectionLost,
    /// Transport is retrying the connection
    ReconnectAttempt,
}

/// Compute the next state. Unexpected combinations keep the current state.
pub fn next_state(current: EngineState, event: StateEvent) -> EngineState {
    use EngineState::*;
    use StateEvent::*;

    let next = match (current, event) {
        (Uninitialized, TransportStarted) => Connecting,
        // The broker may accept before we ever observed Connecting after a retry.
        (Connecting | Disconnected | Connected, ConnectionEstablished) => Connected,
        (Connecting | Connected | Disconnected, ConnectionLost) => Disconnected,
        (Disconnected, ReconnectAttempt) => Connecting,
        (state, event) => {
            warn!(?state, ?event, "Ignoring state event");
            state
        }
    };

    if next != current {
        info!(from = ?current, to = ?next, "Engine state transition");
    } else {
        debug!(state = ?current, ?event, "Engine state unchanged");
    }
    next
}

/// Only a connected engine may publish
pub fn can_publish(state: EngineState) -> bool {
    matches!(state, EngineState::Connected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_is_uninitialized() {
        assert_eq!(EngineState::default(), EngineState::Uninitialized);
    }

    #[test]
    fn test_happy_path() {
        let state = next_state(EngineState::Uninitialized, StateEvent::TransportStarted);
        assert_eq!(state, EngineState::Connecting);
        let state = next_state(state, StateEvent::ConnectionEstablished);
        assert_eq!(state, EngineState::Connected);
        let state = next_state(state, StateEvent::ConnectionLost);
        assert_eq!(state, EngineState::Disconnected);
        let state = next_state(state, StateEvent::ReconnectAttempt);
        assert_eq!(state, EngineState::Connecting);
        let state = next_state(state, StateEvent::ConnectionEstablished);
        assert_eq!(state, EngineState::Connected);
    }

    #[test]
    fn test_reconnect_without_observed_attempt() {
        assert_eq!(
            next_state(EngineState::Disconnected, StateEvent::ConnectionEstablished),
            EngineState::Connected
        );
    }

    #[test]
    fn test_repeated_disconnect_is_stable() {
        assert_eq!(
            next_state(EngineState::Disconnected, StateEvent::ConnectionLost),
            EngineState::Disconnected
        );
    }

    #[test]
    fn test_uninitialized_ignores_connection_events() {
        assert_eq!(
            next_state(EngineState::Uninitialized, StateEvent::ConnectionEstablished),
            EngineState::Uninitialized
        );
        assert_eq!(
            next_state(EngineState::Uninitialized, StateEvent::ConnectionLost),
            EngineState::Uninitialized
        );
    }

    #[test]
    fn test_can_publish_only_when_connected() {
        assert!(can_publish(EngineState::Connected));
        assert!(!can_publish(EngineState::Connecting));
        assert!(!can_publish(EngineState::Disconnected));
        assert!(!can_publish(EngineState::Uninitialized));
    }
}
