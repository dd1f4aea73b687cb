use crate::error::{Error, Result};

use std::fmt;
use std::sync::Arc;

use conduit_api::{Acknowledger, Message, TransactionHandle, TransactionalConduit};
use tracing::{debug, error};

/// One operation deferred until the transaction's outcome is known.
#[derive(Debug)]
pub enum BufferedOperation {
    /// A message to publish.
    Send(Message),
    /// A positive acknowledgement.
    Ack(Arc<dyn Acknowledger>),
    /// A negative acknowledgement.
    Nack(Arc<dyn Acknowledger>),
}

/// Client-visible atomicity for one transaction id.
///
/// Sends and acknowledgements are buffered and only replayed against the
/// backend on [`commit`](Self::commit). [`abort`](Self::abort) discards them.
pub struct Transaction {
    id: String,
    handle: Box<dyn TransactionHandle>,
    conduit: Arc<dyn TransactionalConduit>,
    operations: Vec<BufferedOperation>,
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("handle", &self.handle)
            .field("operations", &self.operations.len())
            .finish_non_exhaustive()
    }
}

impl Transaction {
    /// Wraps a freshly begun transaction handle.
    pub fn new<I>(
        id: I,
        handle: Box<dyn TransactionHandle>,
        conduit: Arc<dyn TransactionalConduit>,
    ) -> Self
    where
        I: Into<String>,
    {
        Self {
            id: id.into(),
            handle,
            conduit,
            operations: Vec::new(),
        }
    }

    /// The client-supplied transaction id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The operations buffered so far, in issue order.
    #[must_use]
    pub fn operations(&self) -> &[BufferedOperation] {
        &self.operations
    }

    /// Buffers a send.
    pub fn send(&mut self, message: Message) {
        self.operations.push(BufferedOperation::Send(message));
    }

    /// Buffers an acknowledgement.
    pub fn ack(&mut self, acknowledger: Arc<dyn Acknowledger>) {
        self.operations.push(BufferedOperation::Ack(acknowledger));
    }

    /// Buffers a negative acknowledgement.
    pub fn nack(&mut self, acknowledger: Arc<dyn Acknowledger>) {
        self.operations.push(BufferedOperation::Nack(acknowledger));
    }

    /// Replays the buffered operations in order, then commits the handle.
    ///
    /// # Errors
    /// Returns [`Error::Backend`] if the handle cannot be resumed, any replayed
    /// operation fails, or the commit itself fails. Any of these rolls the
    /// handle back.
    pub async fn commit(self) -> Result<()> {
        let Self {
            id,
            handle,
            conduit,
            operations,
        } = self;
        debug!("committing transaction {} ({} operations)", id, operations.len());

        let committed = match Self::replay(handle.as_ref(), conduit.as_ref(), operations).await {
            Ok(()) => handle.commit().await.map_err(Error::Backend),
            Err(e) => Err(e),
        };
        if let Err(e) = committed {
            error!("rolling back transaction {}: {}", id, e);
            if let Err(rollback) = handle.rollback().await {
                error!("cannot roll back transaction {}: {}", id, rollback);
            }
            return Err(e);
        }
        Ok(())
    }

    /// Discards the buffered operations and rolls the handle back.
    ///
    /// # Errors
    /// Returns [`Error::Backend`] if the rollback fails.
    pub async fn abort(self) -> Result<()> {
        debug!(
            "aborting transaction {} (discarding {} operations)",
            self.id,
            self.operations.len()
        );
        self.handle.rollback().await.map_err(Error::Backend)
    }

    async fn replay(
        handle: &dyn TransactionHandle,
        conduit: &dyn TransactionalConduit,
        operations: Vec<BufferedOperation>,
    ) -> Result<()> {
        handle.resume().await.map_err(Error::Backend)?;

        let mut outcome = Ok(());
        for operation in operations {
            let applied = match operation {
                BufferedOperation::Send(message) => conduit.send(message).await,
                BufferedOperation::Ack(acknowledger) => acknowledger.ack().await,
                BufferedOperation::Nack(acknowledger) => acknowledger.nack().await,
            };
            if let Err(e) = applied {
                outcome = Err(Error::Backend(e));
                break;
            }
        }

        let suspended = handle.suspend().await.map_err(Error::Backend);
        outcome.and(suspended)
    }
}
