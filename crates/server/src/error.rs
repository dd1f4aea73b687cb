//! Error types for the protocol core.

use conduit_api::{BoxError, SinkError};
use thiserror::Error;

/// Result type alias for session operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced to the protocol layer.
#[derive(Debug, Error)]
pub enum Error {
    /// The transaction id is unknown, or was already committed or aborted.
    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    /// The subscription id is not registered.
    #[error("invalid subscription: {0}")]
    InvalidSubscription(String),

    /// The transport is not ready to accept a write. Retryable.
    #[error("transport is not writable")]
    Backpressure,

    /// The backend conduit rejected the operation.
    #[error("backend failure: {0}")]
    Backend(#[source] BoxError),

    /// The session has already disconnected.
    #[error("session is not connected")]
    NotConnected,

    /// None of the versions offered by the client is supported.
    #[error("unsupported protocol version(s): {0}")]
    UnsupportedVersion(String),

    /// A handshake header could not be parsed.
    #[error("invalid {name} header: {value}")]
    InvalidHeader {
        /// The header name.
        name: &'static str,
        /// The offending value.
        value: String,
    },
}

impl Error {
    /// Whether the caller may retry the operation unchanged.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Backpressure)
    }
}

impl From<SinkError> for Error {
    fn from(error: SinkError) -> Self {
        match error {
            SinkError::Backpressure => Self::Backpressure,
            SinkError::Closed => Self::NotConnected,
            other @ SinkError::Transport(_) => Self::Backend(Box::new(other)),
        }
    }
}
