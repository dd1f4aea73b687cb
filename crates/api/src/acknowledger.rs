use crate::BoxError;

use std::fmt::Debug;

use async_trait::async_trait;

/// Completion handler a backend attaches to a message handed to the sink.
///
/// The client's later ACK or NACK for that message is routed back here.
#[async_trait]
pub trait Acknowledger: Debug + Send + Sync + 'static {
    /// Positively acknowledges the message.
    async fn ack(&self) -> Result<(), BoxError>;

    /// Negatively acknowledges the message.
    async fn nack(&self) -> Result<(), BoxError>;
}
