use conduit_api::BoxError;
use thiserror::Error;

/// The result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the in-memory broker.
#[derive(Debug, Error)]
pub enum Error {
    /// The queue consumer chosen for a message refused it.
    #[error("delivery to {subscriber} failed: {source}")]
    Delivery {
        /// The consumer that refused the message.
        subscriber: String,
        /// Why it refused.
        source: BoxError,
    },
}
