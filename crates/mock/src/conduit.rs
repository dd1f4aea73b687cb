use crate::error::Error;
use crate::state::{MockEvent, Shared};

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use conduit_api::{
    AcknowledgeableSink, Acknowledger, BoxError, ConduitSession, Headers, Message,
    MessageConduit, SinkError, Subscription, TransactionHandle, TransactionalConduit,
};
use tracing::trace;
use uuid::Uuid;

/// One client session's handle onto the mock backend.
pub struct MockConduit {
    headers: Headers,
    session: Arc<ConduitSession>,
    shared: Shared,
    sink: Arc<dyn AcknowledgeableSink>,
}

impl fmt::Debug for MockConduit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockConduit")
            .field("session", &self.session.id())
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl MockConduit {
    pub(crate) fn new(sink: Arc<dyn AcknowledgeableSink>, headers: Headers, shared: Shared) -> Self {
        Self {
            headers,
            session: Arc::new(ConduitSession::new()),
            shared,
            sink,
        }
    }

    /// Headers the conduit was created with.
    #[must_use]
    pub const fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Pushes a message toward the client through the session's sink.
    ///
    /// With `acknowledge` set, the message carries a [`MockAcknowledger`]
    /// that logs the client's verdict.
    ///
    /// # Errors
    /// Whatever the sink refuses the message with.
    pub fn deliver(&self, message: Message, acknowledge: bool) -> Result<(), SinkError> {
        let acknowledger = acknowledge.then(|| {
            Arc::new(MockAcknowledger::new(message.id(), self.shared.clone()))
                as Arc<dyn Acknowledger>
        });
        self.sink.send(message, acknowledger)
    }
}

#[async_trait]
impl MessageConduit for MockConduit {
    async fn send(&self, message: Message) -> Result<(), BoxError> {
        let mut state = self.shared.lock();
        let body = String::from_utf8_lossy(message.body()).into_owned();
        if state.failures.send_bodies.contains(&body) {
            return Err(Error::SendRejected(body).into());
        }

        match state.resumed {
            Some(transaction) => {
                trace!("staging message {} in {}", message.id(), transaction);
                state.staged.entry(transaction).or_default().push(message);
            }
            None => state.events.push(MockEvent::Send(message)),
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        id: &str,
        destination: &str,
        _headers: &Headers,
    ) -> Result<Option<Arc<dyn Subscription>>, BoxError> {
        let mut state = self.shared.lock();
        if state.failures.declined.contains(destination) {
            return Ok(None);
        }

        state.events.push(MockEvent::Subscribe {
            id: id.to_string(),
            destination: destination.to_string(),
        });
        Ok(Some(Arc::new(MockSubscription {
            id: id.to_string(),
            destination: destination.to_string(),
            shared: self.shared.clone(),
        })))
    }

    fn session(&self) -> Arc<ConduitSession> {
        self.session.clone()
    }
}

#[async_trait]
impl TransactionalConduit for MockConduit {
    async fn begin(&self) -> Result<Box<dyn TransactionHandle>, BoxError> {
        let mut state = self.shared.lock();
        if state.failures.begin {
            return Err(Error::BeginFailed.into());
        }

        state.events.push(MockEvent::Begin);
        Ok(Box::new(MockTransactionHandle {
            id: Uuid::new_v4(),
            shared: self.shared.clone(),
        }))
    }
}

/// A subscription on the mock backend.
pub struct MockSubscription {
    id: String,
    destination: String,
    shared: Shared,
}

impl fmt::Debug for MockSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockSubscription")
            .field("id", &self.id)
            .field("destination", &self.destination)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Subscription for MockSubscription {
    fn id(&self) -> &str {
        &self.id
    }

    fn destination(&self) -> &str {
        &self.destination
    }

    async fn cancel(&self) -> Result<(), BoxError> {
        let mut state = self.shared.lock();
        if state.failures.cancel {
            return Err(Error::CancelFailed(self.id.clone()).into());
        }

        state.events.push(MockEvent::Cancel {
            id: self.id.clone(),
        });
        Ok(())
    }
}

/// A native transaction on the mock backend.
///
/// Sends made while the handle is resumed are staged and only reach the event
/// log on commit.
pub struct MockTransactionHandle {
    id: Uuid,
    shared: Shared,
}

impl fmt::Debug for MockTransactionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockTransactionHandle")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TransactionHandle for MockTransactionHandle {
    async fn resume(&self) -> Result<(), BoxError> {
        self.shared.lock().resumed = Some(self.id);
        Ok(())
    }

    async fn suspend(&self) -> Result<(), BoxError> {
        let mut state = self.shared.lock();
        if state.resumed == Some(self.id) {
            state.resumed = None;
        }
        Ok(())
    }

    async fn commit(&self) -> Result<(), BoxError> {
        let mut state = self.shared.lock();
        if state.failures.commit {
            return Err(Error::CommitFailed.into());
        }

        let staged = state.staged.remove(&self.id).unwrap_or_default();
        state.events.extend(staged.into_iter().map(MockEvent::Send));
        state.events.push(MockEvent::Commit);
        Ok(())
    }

    async fn rollback(&self) -> Result<(), BoxError> {
        let mut state = self.shared.lock();
        state.staged.remove(&self.id);
        if state.resumed == Some(self.id) {
            state.resumed = None;
        }
        if state.failures.rollback {
            return Err(Error::RollbackFailed.into());
        }

        state.events.push(MockEvent::Rollback);
        Ok(())
    }
}

/// Logs the client's verdict on one delivered message.
pub struct MockAcknowledger {
    message_id: String,
    shared: Shared,
}

impl MockAcknowledger {
    pub(crate) fn new(message_id: &str, shared: Shared) -> Self {
        Self {
            message_id: message_id.to_string(),
            shared,
        }
    }

    /// The message this acknowledger settles.
    #[must_use]
    pub fn message_id(&self) -> &str {
        &self.message_id
    }
}

impl fmt::Debug for MockAcknowledger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockAcknowledger")
            .field("message_id", &self.message_id)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Acknowledger for MockAcknowledger {
    async fn ack(&self) -> Result<(), BoxError> {
        self.shared
            .lock()
            .events
            .push(MockEvent::Ack(self.message_id.clone()));
        Ok(())
    }

    async fn nack(&self) -> Result<(), BoxError> {
        self.shared
            .lock()
            .events
            .push(MockEvent::Nack(self.message_id.clone()));
        Ok(())
    }
}
