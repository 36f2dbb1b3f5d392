//! The connection's lifecycle state machine.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crate::error::{ClientErrorKind, RedisError};

/// One connection's lifecycle state. Numeric values are stored in an [`Arc<AtomicU8>`] snapshot
/// so other tasks can read the current state without touching the actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Init = 0,
    Connecting = 1,
    Open = 2,
    Failed = 3,
    Reconnecting = 4,
    Closing = 5,
    Closed = 6,
}

impl ConnectionState {
    fn from_u8(v: u8) -> ConnectionState {
        match v {
            0 => ConnectionState::Init,
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Open,
            3 => ConnectionState::Failed,
            4 => ConnectionState::Reconnecting,
            5 => ConnectionState::Closing,
            _ => ConnectionState::Closed,
        }
    }

    /// The client error reported when an enqueue is attempted while in this state.
    pub fn reject_reason(self) -> ClientErrorKind {
        match self {
            ConnectionState::Init | ConnectionState::Connecting => ClientErrorKind::NotConnected,
            ConnectionState::Failed | ConnectionState::Reconnecting => ClientErrorKind::ConnectionLost,
            ConnectionState::Closing | ConnectionState::Closed => ClientErrorKind::ConnectionClosed,
            ConnectionState::Open => unreachable!("Open accepts enqueue"),
        }
    }

    pub fn accepts_enqueue(self) -> bool {
        matches!(self, ConnectionState::Open)
    }
}

/// A cheaply cloneable, read-only snapshot of the actor's current state, for diagnostics from
/// any task.
#[derive(Clone)]
pub struct StateSnapshot(Arc<AtomicU8>);

impl StateSnapshot {
    pub fn new(initial: ConnectionState) -> Self {
        StateSnapshot(Arc::new(AtomicU8::new(initial as u8)))
    }

    pub fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, state: ConnectionState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// `Err` with the state-appropriate client error if an enqueue would currently be rejected.
    pub fn check_accepts_enqueue(&self) -> Result<(), RedisError> {
        let state = self.get();
        if state.accepts_enqueue() {
            Ok(())
        } else {
            Err(RedisError::client(state.reject_reason()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_snapshot_rejects_enqueue_as_not_connected() {
        let snap = StateSnapshot::new(ConnectionState::Init);
        let err = snap.check_accepts_enqueue().unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Client(ClientErrorKind::NotConnected));
    }

    #[test]
    fn open_accepts_enqueue() {
        let snap = StateSnapshot::new(ConnectionState::Open);
        assert!(snap.check_accepts_enqueue().is_ok());
    }

    #[test]
    fn failed_rejects_as_connection_lost() {
        let snap = StateSnapshot::new(ConnectionState::Open);
        snap.set(ConnectionState::Failed);
        let err = snap.check_accepts_enqueue().unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Client(ClientErrorKind::ConnectionLost));
    }
}
