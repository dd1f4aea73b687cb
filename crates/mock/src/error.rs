//! Error types for the mock conduit backend.

use thiserror::Error;

/// The result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures the mock backend can be told to produce.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// Conduit creation refused.
    #[error("connection refused")]
    ConnectRefused,

    /// A send was rejected.
    #[error("send rejected: {0}")]
    SendRejected(String),

    /// No transaction could be started.
    #[error("begin failed")]
    BeginFailed,

    /// The transaction could not be committed.
    #[error("commit failed")]
    CommitFailed,

    /// The transaction could not be rolled back.
    #[error("rollback failed")]
    RollbackFailed,

    /// A subscription could not be cancelled.
    #[error("cancel failed for subscription {0}")]
    CancelFailed(String),
}
