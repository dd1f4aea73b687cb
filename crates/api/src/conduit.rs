use crate::BoxError;
use crate::message::{Headers, Message};
use crate::session::ConduitSession;
use crate::sink::AcknowledgeableSink;
use crate::subscription::Subscription;
use crate::transaction::TransactionalConduitFactory;

use std::sync::Arc;

use async_trait::async_trait;

/// The backend handle one client session exchanges messages through.
#[async_trait]
pub trait MessageConduit: Send + Sync + 'static {
    /// Publishes a message to the backend.
    async fn send(&self, message: Message) -> Result<(), BoxError>;

    /// Registers interest in a destination.
    ///
    /// Returns `Ok(None)` when the backend declines the destination.
    async fn subscribe(
        &self,
        id: &str,
        destination: &str,
        headers: &Headers,
    ) -> Result<Option<Arc<dyn Subscription>>, BoxError>;

    /// The backend-side session this conduit belongs to.
    fn session(&self) -> Arc<ConduitSession>;
}

/// Creates one conduit per client session.
#[async_trait]
pub trait MessageConduitFactory: Send + Sync + 'static {
    /// Creates a conduit bound to the given outbound sink.
    async fn create_conduit(
        &self,
        sink: Arc<dyn AcknowledgeableSink>,
        headers: &Headers,
    ) -> Result<Arc<dyn MessageConduit>, BoxError>;

    /// The native transactional capability of this factory, if any.
    ///
    /// Consulted once when the server is configured.
    fn transactional(self: Arc<Self>) -> Option<Arc<dyn TransactionalConduitFactory>> {
        None
    }
}
