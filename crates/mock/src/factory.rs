use crate::conduit::{MockAcknowledger, MockConduit};
use crate::error::Error;
use crate::state::{MockEvent, Shared};

use std::sync::Arc;

use async_trait::async_trait;
use conduit_api::{
    AcknowledgeableSink, Acknowledger, BoxError, Headers, Message, MessageConduit,
    MessageConduitFactory, TransactionalConduit, TransactionalConduitFactory,
};
use parking_lot::Mutex;
use tracing::debug;

/// Creates [`MockConduit`]s that share one event log and one set of injected
/// failures.
#[derive(Debug, Default)]
pub struct MockConduitFactory {
    conduits: Mutex<Vec<Arc<MockConduit>>>,
    native: bool,
    shared: Shared,
}

impl MockConduitFactory {
    /// A backend without native transactions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend that advertises native transactions.
    #[must_use]
    pub fn native() -> Self {
        Self {
            native: true,
            ..Self::default()
        }
    }

    /// Every backend effect so far, in order.
    #[must_use]
    pub fn events(&self) -> Vec<MockEvent> {
        self.shared.lock().events.clone()
    }

    /// Messages that reached the backend, in order.
    #[must_use]
    pub fn sent(&self) -> Vec<Message> {
        self.shared
            .lock()
            .events
            .iter()
            .filter_map(|event| match event {
                MockEvent::Send(message) => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of logged events equal to `event`.
    #[must_use]
    pub fn count(&self, event: &MockEvent) -> usize {
        self.shared
            .lock()
            .events
            .iter()
            .filter(|logged| *logged == event)
            .count()
    }

    /// Conduits created so far.
    #[must_use]
    pub fn conduits(&self) -> Vec<Arc<MockConduit>> {
        self.conduits.lock().clone()
    }

    /// The most recently created conduit.
    #[must_use]
    pub fn last_conduit(&self) -> Option<Arc<MockConduit>> {
        self.conduits.lock().last().cloned()
    }

    /// An acknowledger for `message_id` that logs into this backend.
    #[must_use]
    pub fn acknowledger(&self, message_id: &str) -> Arc<dyn Acknowledger> {
        Arc::new(MockAcknowledger::new(message_id, self.shared.clone()))
    }

    /// Refuse every new conduit.
    pub fn refuse_connections(&self) {
        self.shared.lock().failures.connect = true;
    }

    /// Reject sends whose body is `body`.
    pub fn reject_sends_with(&self, body: &str) {
        self.shared.lock().failures.send_bodies.insert(body.to_string());
    }

    /// Decline subscriptions to `destination`.
    pub fn decline(&self, destination: &str) {
        self.shared.lock().failures.declined.insert(destination.to_string());
    }

    /// Fail every native `begin`.
    pub fn fail_begin(&self) {
        self.shared.lock().failures.begin = true;
    }

    /// Fail every native commit.
    pub fn fail_commit(&self) {
        self.shared.lock().failures.commit = true;
    }

    /// Fail every native rollback.
    pub fn fail_rollback(&self) {
        self.shared.lock().failures.rollback = true;
    }

    /// Fail every subscription cancel.
    pub fn fail_cancel(&self) {
        self.shared.lock().failures.cancel = true;
    }

    fn create(
        &self,
        sink: Arc<dyn AcknowledgeableSink>,
        headers: &Headers,
    ) -> Result<Arc<MockConduit>, Error> {
        if self.shared.lock().failures.connect {
            return Err(Error::ConnectRefused);
        }

        let conduit = Arc::new(MockConduit::new(sink, headers.clone(), self.shared.clone()));
        debug!("created mock conduit {}", conduit.session().id());
        self.conduits.lock().push(conduit.clone());
        Ok(conduit)
    }
}

#[async_trait]
impl MessageConduitFactory for MockConduitFactory {
    async fn create_conduit(
        &self,
        sink: Arc<dyn AcknowledgeableSink>,
        headers: &Headers,
    ) -> Result<Arc<dyn MessageConduit>, BoxError> {
        let conduit: Arc<dyn MessageConduit> = self.create(sink, headers)?;
        Ok(conduit)
    }

    fn transactional(self: Arc<Self>) -> Option<Arc<dyn TransactionalConduitFactory>> {
        if !self.native {
            return None;
        }
        let factory: Arc<dyn TransactionalConduitFactory> = self;
        Some(factory)
    }
}

#[async_trait]
impl TransactionalConduitFactory for MockConduitFactory {
    async fn create_transactional_conduit(
        &self,
        sink: Arc<dyn AcknowledgeableSink>,
        headers: &Headers,
    ) -> Result<Arc<dyn TransactionalConduit>, BoxError> {
        let conduit: Arc<dyn TransactionalConduit> = self.create(sink, headers)?;
        Ok(conduit)
    }
}
