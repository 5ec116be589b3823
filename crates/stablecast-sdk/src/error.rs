//! Error types for the stablecast SDK.

use stablecast_core::{CoreError, MemberId};
use thiserror::Error;

/// Error type for SDK operations.
#[derive(Error, Debug)]
pub enum SdkError {
    /// Codec or protocol-state error from the core.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Socket-level failure or a datagram the transport refused.
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown member: {0}")]
    UnknownMember(MemberId),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl SdkError {
    /// True for datagrams that failed to decode; receive loops skip these.
    pub fn is_malformed(&self) -> bool {
        matches!(self, SdkError::Core(CoreError::MalformedMessage(_)))
    }
}

/// Result type for SDK operations.
pub type Result<T> = std::result::Result<T, SdkError>;
