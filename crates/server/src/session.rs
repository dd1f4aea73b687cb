use crate::ack_tracker::AckTracker;
use crate::error::{Error, Result};
use crate::heartbeat::Heartbeat;
use crate::registry::SessionRegistry;
use crate::transaction::Transaction;
use crate::version::Version;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use conduit_api::{
    Acknowledger, ConduitSession, Headers, Message, Subscription, TransactionalConduit,
};
use tokio::sync::Mutex;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Lifecycle state of a [`Session`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Between handshake and disconnect.
    Active,
    /// Terminal.
    Disconnected,
}

/// What happened to an acknowledgement addressed by message id.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AckOutcome {
    /// Applied against the backend.
    Applied,
    /// Buffered in a transaction.
    Buffered,
    /// The message id was unknown or already acknowledged. Benign.
    Duplicate,
}

#[derive(Clone, Copy, Debug)]
enum AckKind {
    Ack,
    Nack,
}

#[derive(Debug)]
struct Inner {
    state: SessionState,
    subscriptions: HashMap<String, Arc<dyn Subscription>>,
    transactions: HashMap<String, Transaction>,
}

/// Server-side state of one client connection.
///
/// Every operation holds the session lock for its whole duration, so the
/// subscriptions and transactions of one connection are never mutated
/// concurrently. Separate sessions share nothing and run in parallel.
pub struct Session {
    id: Uuid,
    version: Version,
    heartbeat: Option<Heartbeat>,
    conduit: Arc<dyn TransactionalConduit>,
    acks: Arc<AckTracker>,
    registry: Weak<SessionRegistry>,
    inner: Mutex<Inner>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("version", &self.version)
            .field("heartbeat", &self.heartbeat)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Creates an active session.
    ///
    /// `acks` must be the tracker the session's outbound sink registers with.
    pub fn new(
        conduit: Arc<dyn TransactionalConduit>,
        acks: Arc<AckTracker>,
        version: Version,
        heartbeat: Option<Heartbeat>,
        registry: &Arc<SessionRegistry>,
    ) -> Self {
        let id = *conduit.session().id();
        debug!("new session {} ({})", id, version);
        Self {
            id,
            version,
            heartbeat,
            conduit,
            acks,
            registry: Arc::downgrade(registry),
            inner: Mutex::new(Inner {
                state: SessionState::Active,
                subscriptions: HashMap::new(),
                transactions: HashMap::new(),
            }),
        }
    }

    /// The session id (shared with the backend session).
    #[must_use]
    pub const fn id(&self) -> &Uuid {
        &self.id
    }

    /// The negotiated protocol version.
    #[must_use]
    pub const fn version(&self) -> Version {
        self.version
    }

    /// The negotiated heartbeat, if any.
    #[must_use]
    pub const fn heartbeat(&self) -> Option<&Heartbeat> {
        self.heartbeat.as_ref()
    }

    /// The backend-side session.
    #[must_use]
    pub fn conduit_session(&self) -> Arc<ConduitSession> {
        self.conduit.session()
    }

    /// The tracker for this connection's in-flight messages.
    #[must_use]
    pub const fn ack_tracker(&self) -> &Arc<AckTracker> {
        &self.acks
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state
    }

    /// Ids of the active subscriptions.
    pub async fn subscription_ids(&self) -> Vec<String> {
        self.inner.lock().await.subscriptions.keys().cloned().collect()
    }

    /// Ids of the open transactions.
    pub async fn transaction_ids(&self) -> Vec<String> {
        self.inner.lock().await.transactions.keys().cloned().collect()
    }

    /// Subscribes to a destination through the backend.
    ///
    /// Returns `Ok(None)` without registering anything when the backend
    /// declines the destination. A subscription already registered under the
    /// same id is cancelled and replaced.
    ///
    /// # Errors
    /// Returns [`Error::NotConnected`] after disconnect, or
    /// [`Error::Backend`] if the backend fails.
    pub async fn subscribe(
        &self,
        destination: &str,
        subscription_id: &str,
        headers: &Headers,
    ) -> Result<Option<Arc<dyn Subscription>>> {
        let mut inner = self.inner.lock().await;
        ensure_active(&inner)?;

        let Some(subscription) = self
            .conduit
            .subscribe(subscription_id, destination, headers)
            .await
            .map_err(Error::Backend)?
        else {
            debug!("unable to create subscription for destination {}", destination);
            return Ok(None);
        };

        if let Some(previous) = inner
            .subscriptions
            .insert(subscription_id.to_string(), subscription.clone())
        {
            warn!("subscription {} replaced, cancelling previous", subscription_id);
            if let Err(e) = previous.cancel().await {
                error!("cannot cancel replaced subscription {}: {}", subscription_id, e);
            }
        }
        Ok(Some(subscription))
    }

    /// Removes and cancels a subscription.
    ///
    /// # Errors
    /// Returns [`Error::InvalidSubscription`] if the id is not registered, or
    /// [`Error::Backend`] if cancelling fails.
    pub async fn unsubscribe(&self, subscription_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let subscription = inner
            .subscriptions
            .remove(subscription_id)
            .ok_or_else(|| Error::InvalidSubscription(subscription_id.to_string()))?;

        subscription.cancel().await.map_err(Error::Backend)
    }

    /// Opens a transaction under `transaction_id`.
    ///
    /// # Errors
    /// Returns [`Error::NotConnected`] after disconnect, or
    /// [`Error::Backend`] if no transaction handle could be obtained.
    pub async fn begin(&self, transaction_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        ensure_active(&inner)?;

        let handle = self.conduit.begin().await.map_err(Error::Backend)?;
        let transaction = Transaction::new(transaction_id, handle, self.conduit.clone());
        if let Some(previous) = inner
            .transactions
            .insert(transaction_id.to_string(), transaction)
        {
            warn!("transaction {} restarted, aborting previous", transaction_id);
            if let Err(e) = previous.abort().await {
                error!("cannot abort replaced transaction {}: {}", transaction_id, e);
            }
        }
        Ok(())
    }

    /// Commits a transaction.
    ///
    /// # Errors
    /// Returns [`Error::InvalidTransaction`] if the id is unknown, or
    /// [`Error::Backend`] if replay or commit fails (the transaction is rolled
    /// back and gone either way).
    pub async fn commit(&self, transaction_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let transaction = take_transaction(&mut inner, transaction_id)?;
        transaction.commit().await
    }

    /// Aborts a transaction.
    ///
    /// # Errors
    /// Returns [`Error::InvalidTransaction`] if the id is unknown, or
    /// [`Error::Backend`] if the rollback fails.
    pub async fn abort(&self, transaction_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let transaction = take_transaction(&mut inner, transaction_id)?;
        transaction.abort().await
    }

    /// Sends a message, buffering it when a transaction id is given.
    ///
    /// # Errors
    /// Returns [`Error::InvalidTransaction`] for an unknown transaction,
    /// [`Error::NotConnected`] after disconnect, or [`Error::Backend`] if the
    /// backend rejects an immediate send.
    pub async fn send(&self, message: Message, transaction_id: Option<&str>) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if let Some(transaction_id) = transaction_id {
            transaction_mut(&mut inner, transaction_id)?.send(message);
            return Ok(());
        }

        ensure_active(&inner)?;
        let message_id = message.id().to_string();
        self.conduit.send(message).await.map_err(|e| {
            error!("cannot send message {}: {}", message_id, e);
            Error::Backend(e)
        })
    }

    /// Acknowledges through the given acknowledger.
    ///
    /// # Errors
    /// See [`send`](Self::send).
    pub async fn ack(
        &self,
        acknowledger: Arc<dyn Acknowledger>,
        transaction_id: Option<&str>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        self.acknowledge(&mut inner, AckKind::Ack, acknowledger, transaction_id)
            .await
    }

    /// Negatively acknowledges through the given acknowledger.
    ///
    /// # Errors
    /// See [`send`](Self::send).
    pub async fn nack(
        &self,
        acknowledger: Arc<dyn Acknowledger>,
        transaction_id: Option<&str>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        self.acknowledge(&mut inner, AckKind::Nack, acknowledger, transaction_id)
            .await
    }

    /// Acknowledges a delivered message by id.
    ///
    /// # Errors
    /// See [`send`](Self::send).
    pub async fn ack_message(
        &self,
        message_id: &str,
        transaction_id: Option<&str>,
    ) -> Result<AckOutcome> {
        self.acknowledge_message(AckKind::Ack, message_id, transaction_id)
            .await
    }

    /// Negatively acknowledges a delivered message by id.
    ///
    /// # Errors
    /// See [`send`](Self::send).
    pub async fn nack_message(
        &self,
        message_id: &str,
        transaction_id: Option<&str>,
    ) -> Result<AckOutcome> {
        self.acknowledge_message(AckKind::Nack, message_id, transaction_id)
            .await
    }

    /// Tears the session down.
    ///
    /// Stops the heartbeat, aborts every open transaction, cancels every
    /// subscription, drops pending acknowledgements and leaves the registry.
    /// Individual failures are logged and never stop the remaining cleanup.
    /// Calling it again is a no-op.
    pub async fn disconnect(&self) {
        let mut inner = self.inner.lock().await;
        if inner.state == SessionState::Disconnected {
            return;
        }
        inner.state = SessionState::Disconnected;

        if let Some(heartbeat) = &self.heartbeat {
            heartbeat.stop();
        }

        for (id, transaction) in inner.transactions.drain() {
            if let Err(e) = transaction.abort().await {
                error!("cannot abort transaction {} on disconnect: {}", id, e);
            }
        }

        for (id, subscription) in inner.subscriptions.drain() {
            if let Err(e) = subscription.cancel().await {
                error!("cannot cancel subscription {} on disconnect: {}", id, e);
            }
        }

        self.acks.close();

        if let Some(registry) = self.registry.upgrade() {
            registry.unregister(&self.id);
        }
        debug!("session {} disconnected", self.id);
    }

    async fn acknowledge_message(
        &self,
        kind: AckKind,
        message_id: &str,
        transaction_id: Option<&str>,
    ) -> Result<AckOutcome> {
        let mut inner = self.inner.lock().await;
        if let Some(transaction_id) = transaction_id {
            transaction_mut(&mut inner, transaction_id)?;
        } else {
            ensure_active(&inner)?;
        }

        let Some(acknowledger) = self.acks.resolve(message_id) else {
            warn!("ignoring {:?} for unknown message {}", kind, message_id);
            return Ok(AckOutcome::Duplicate);
        };

        self.acknowledge(&mut inner, kind, acknowledger, transaction_id)
            .await?;
        Ok(if transaction_id.is_some() {
            AckOutcome::Buffered
        } else {
            AckOutcome::Applied
        })
    }

    async fn acknowledge(
        &self,
        inner: &mut Inner,
        kind: AckKind,
        acknowledger: Arc<dyn Acknowledger>,
        transaction_id: Option<&str>,
    ) -> Result<()> {
        if let Some(transaction_id) = transaction_id {
            let transaction = transaction_mut(inner, transaction_id)?;
            match kind {
                AckKind::Ack => transaction.ack(acknowledger),
                AckKind::Nack => transaction.nack(acknowledger),
            }
            return Ok(());
        }

        ensure_active(inner)?;
        let applied = match kind {
            AckKind::Ack => acknowledger.ack().await,
            AckKind::Nack => acknowledger.nack().await,
        };
        applied.map_err(Error::Backend)
    }
}

fn ensure_active(inner: &Inner) -> Result<()> {
    match inner.state {
        SessionState::Active => Ok(()),
        SessionState::Disconnected => Err(Error::NotConnected),
    }
}

fn transaction_mut<'a>(inner: &'a mut Inner, transaction_id: &str) -> Result<&'a mut Transaction> {
    inner
        .transactions
        .get_mut(transaction_id)
        .ok_or_else(|| Error::InvalidTransaction(transaction_id.to_string()))
}

fn take_transaction(inner: &mut Inner, transaction_id: &str) -> Result<Transaction> {
    inner
        .transactions
        .remove(transaction_id)
        .ok_or_else(|| Error::InvalidTransaction(transaction_id.to_string()))
}
