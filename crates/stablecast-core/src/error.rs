//! Error types for the protocol core.

use thiserror::Error;

/// Errors raised by the codec, the registry and the group state machine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// A join past the fixed group capacity. This is the protocol
    /// violation raised by admission, kept separate so callers can tell a
    /// full group from a misbehaving peer.
    #[error("Group capacity exceeded: registry already holds {capacity} members")]
    CapacityExceeded { capacity: usize },

    #[error("Local process has not completed the join handshake")]
    NotJoined,
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::MalformedMessage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
