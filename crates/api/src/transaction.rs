use crate::BoxError;
use crate::conduit::MessageConduit;
use crate::message::Headers;
use crate::sink::AcknowledgeableSink;

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;

/// Handle to one backend transaction.
///
/// Conduit operations issued between [`resume`](Self::resume) and
/// [`suspend`](Self::suspend) are enlisted in the transaction.
#[async_trait]
pub trait TransactionHandle: Debug + Send + Sync + 'static {
    /// Associates subsequent operations on the owning conduit with this transaction.
    async fn resume(&self) -> Result<(), BoxError>;

    /// Ends the association started by `resume`.
    async fn suspend(&self) -> Result<(), BoxError>;

    /// Commits everything enlisted so far.
    async fn commit(&self) -> Result<(), BoxError>;

    /// Rolls back everything enlisted so far.
    async fn rollback(&self) -> Result<(), BoxError>;
}

/// A conduit that can open transactions.
#[async_trait]
pub trait TransactionalConduit: MessageConduit {
    /// Begins a new transaction.
    async fn begin(&self) -> Result<Box<dyn TransactionHandle>, BoxError>;
}

/// Creates transactional conduits.
#[async_trait]
pub trait TransactionalConduitFactory: Send + Sync + 'static {
    /// Creates a transactional conduit bound to the given outbound sink.
    async fn create_transactional_conduit(
        &self,
        sink: Arc<dyn AcknowledgeableSink>,
        headers: &Headers,
    ) -> Result<Arc<dyn TransactionalConduit>, BoxError>;
}
