//! Transaction emulation for backends without native transaction support.
//!
//! Atomicity is client-local only: [`Transaction`](crate::Transaction) buffers
//! everything until commit, but if the backend fails midway through replay the
//! operations that already landed stay applied. The handles here have nothing
//! to commit or roll back.

use std::sync::Arc;

use async_trait::async_trait;
use conduit_api::{
    AcknowledgeableSink, BoxError, ConduitSession, Headers, Message, MessageConduit,
    MessageConduitFactory, Subscription, TransactionHandle, TransactionalConduit,
    TransactionalConduitFactory,
};
use tracing::trace;
use uuid::Uuid;

/// Presents a plain conduit factory as a transactional one.
pub struct PseudoTransactionalConduitFactory {
    inner: Arc<dyn MessageConduitFactory>,
}

impl PseudoTransactionalConduitFactory {
    /// Wraps a non-transactional factory.
    #[must_use]
    pub fn new(inner: Arc<dyn MessageConduitFactory>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl TransactionalConduitFactory for PseudoTransactionalConduitFactory {
    async fn create_transactional_conduit(
        &self,
        sink: Arc<dyn AcknowledgeableSink>,
        headers: &Headers,
    ) -> Result<Arc<dyn TransactionalConduit>, BoxError> {
        let inner = self.inner.create_conduit(sink, headers).await?;
        Ok(Arc::new(PseudoTransactionalConduit { inner }))
    }
}

/// A plain conduit whose transactions are emulated.
pub struct PseudoTransactionalConduit {
    inner: Arc<dyn MessageConduit>,
}

#[async_trait]
impl MessageConduit for PseudoTransactionalConduit {
    async fn send(&self, message: Message) -> Result<(), BoxError> {
        self.inner.send(message).await
    }

    async fn subscribe(
        &self,
        id: &str,
        destination: &str,
        headers: &Headers,
    ) -> Result<Option<Arc<dyn Subscription>>, BoxError> {
        self.inner.subscribe(id, destination, headers).await
    }

    fn session(&self) -> Arc<ConduitSession> {
        self.inner.session()
    }
}

#[async_trait]
impl TransactionalConduit for PseudoTransactionalConduit {
    async fn begin(&self) -> Result<Box<dyn TransactionHandle>, BoxError> {
        let handle = PseudoTransactionHandle::new();
        trace!("began pseudo transaction {}", handle.id);
        Ok(Box::new(handle))
    }
}

/// A transaction handle with no backend resource behind it.
#[derive(Debug)]
pub struct PseudoTransactionHandle {
    id: Uuid,
}

impl PseudoTransactionHandle {
    fn new() -> Self {
        Self { id: Uuid::new_v4() }
    }
}

#[async_trait]
impl TransactionHandle for PseudoTransactionHandle {
    async fn resume(&self) -> Result<(), BoxError> {
        Ok(())
    }

    async fn suspend(&self) -> Result<(), BoxError> {
        Ok(())
    }

    async fn commit(&self) -> Result<(), BoxError> {
        trace!("pseudo transaction {} committed", self.id);
        Ok(())
    }

    async fn rollback(&self) -> Result<(), BoxError> {
        trace!("pseudo transaction {} rolled back", self.id);
        Ok(())
    }
}
