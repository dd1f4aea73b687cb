use crate::acknowledger::Acknowledger;
use crate::message::Message;

use std::sync::Arc;

use thiserror::Error;

/// Errors surfaced by an [`AcknowledgeableSink`].
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SinkError {
    /// The transport cannot accept a write right now. Nothing was sent.
    #[error("transport is not writable")]
    Backpressure,

    /// The connection behind the sink has gone away.
    #[error("sink is closed")]
    Closed,

    /// The transport rejected the write.
    #[error("transport error: {0}")]
    Transport(String),
}

impl SinkError {
    /// Whether the caller may retry the same send later.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Backpressure)
    }
}

/// Outbound path from the backend toward one client connection.
///
/// Implementations never block: a sink that cannot write right away fails with
/// [`SinkError::Backpressure`] and leaves retry policy to the caller.
pub trait AcknowledgeableSink: Send + Sync + 'static {
    /// Hands a message to the connection, optionally with the handler the
    /// client's acknowledgement should be routed to.
    ///
    /// # Errors
    /// Returns [`SinkError::Backpressure`] if the transport is not writable and
    /// [`SinkError::Closed`] once the connection has disconnected.
    fn send(
        &self,
        message: Message,
        acknowledger: Option<Arc<dyn Acknowledger>>,
    ) -> Result<(), SinkError>;
}
