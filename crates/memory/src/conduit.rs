use crate::broker::MemoryBroker;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use conduit_api::{
    AcknowledgeableSink, Acknowledger, BoxError, ConduitSession, Headers, Message,
    MessageConduit, MessageConduitFactory, Subscriber, Subscription,
};
use tracing::{debug, trace};

/// Hands out conduits onto one shared [`MemoryBroker`].
#[derive(Clone, Debug)]
pub struct MemoryConduitFactory {
    broker: Arc<MemoryBroker>,
}

impl MemoryConduitFactory {
    /// Creates a factory for `broker`.
    #[must_use]
    pub const fn new(broker: Arc<MemoryBroker>) -> Self {
        Self { broker }
    }

    /// The broker behind every conduit.
    #[must_use]
    pub const fn broker(&self) -> &Arc<MemoryBroker> {
        &self.broker
    }
}

#[async_trait]
impl MessageConduitFactory for MemoryConduitFactory {
    async fn create_conduit(
        &self,
        sink: Arc<dyn AcknowledgeableSink>,
        _headers: &Headers,
    ) -> Result<Arc<dyn MessageConduit>, BoxError> {
        let conduit = MemoryConduit {
            broker: self.broker.clone(),
            next_subscriber: AtomicU64::new(0),
            session: Arc::new(ConduitSession::new()),
            sink,
        };
        debug!("opened memory conduit {}", conduit.session.id());
        Ok(Arc::new(conduit))
    }
}

/// One session's view of the broker.
pub struct MemoryConduit {
    broker: Arc<MemoryBroker>,
    next_subscriber: AtomicU64,
    session: Arc<ConduitSession>,
    sink: Arc<dyn AcknowledgeableSink>,
}

impl fmt::Debug for MemoryConduit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryConduit")
            .field("session", &self.session.id())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl MessageConduit for MemoryConduit {
    async fn send(&self, message: Message) -> Result<(), BoxError> {
        self.broker.publish(&message)?;
        Ok(())
    }

    async fn subscribe(
        &self,
        id: &str,
        destination: &str,
        headers: &Headers,
    ) -> Result<Option<Arc<dyn Subscription>>, BoxError> {
        if !destination.starts_with('/') {
            return Ok(None);
        }

        let client_ack = matches!(
            headers.get("ack").map(String::as_str),
            Some("client" | "client-individual")
        );
        let subscriber = Arc::new(MemorySubscriber {
            key: format!(
                "{}/{}#{}",
                self.session.id(),
                id,
                self.next_subscriber.fetch_add(1, Ordering::Relaxed)
            ),
            id: id.to_string(),
            destination: destination.to_string(),
            client_ack,
            broker: Arc::downgrade(&self.broker),
            sink: self.sink.clone(),
        });
        self.broker.register(subscriber.clone());

        Ok(Some(Arc::new(MemorySubscription {
            broker: self.broker.clone(),
            subscriber,
        })))
    }

    fn session(&self) -> Arc<ConduitSession> {
        self.session.clone()
    }
}

/// A session's subscription on the broker.
#[derive(Debug)]
pub struct MemorySubscription {
    broker: Arc<MemoryBroker>,
    subscriber: Arc<MemorySubscriber>,
}

#[async_trait]
impl Subscription for MemorySubscription {
    fn id(&self) -> &str {
        &self.subscriber.id
    }

    fn destination(&self) -> &str {
        &self.subscriber.destination
    }

    async fn cancel(&self) -> Result<(), BoxError> {
        self.broker.unregister(self.subscriber.as_ref());
        Ok(())
    }
}

struct MemorySubscriber {
    /// Unique across sessions and resubscriptions; `id` is only unique within
    /// one session at a time.
    key: String,
    id: String,
    destination: String,
    client_ack: bool,
    broker: Weak<MemoryBroker>,
    sink: Arc<dyn AcknowledgeableSink>,
}

impl fmt::Debug for MemorySubscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemorySubscriber")
            .field("key", &self.key)
            .field("destination", &self.destination)
            .field("client_ack", &self.client_ack)
            .finish_non_exhaustive()
    }
}

impl Subscriber for MemorySubscriber {
    fn id(&self) -> &str {
        &self.key
    }

    fn destination(&self) -> &str {
        &self.destination
    }

    fn send(&self, message: Message) -> Result<(), BoxError> {
        let acknowledger = self.client_ack.then(|| {
            Arc::new(MemoryAcknowledger {
                message_id: message.id().to_string(),
                broker: self.broker.clone(),
            }) as Arc<dyn Acknowledger>
        });
        let message = message.with_header("subscription", self.id.as_str());
        trace!("delivering {} to {}", message.id(), self.key);
        self.sink.send(message, acknowledger)?;
        Ok(())
    }
}

#[derive(Debug)]
struct MemoryAcknowledger {
    message_id: String,
    broker: Weak<MemoryBroker>,
}

#[async_trait]
impl Acknowledger for MemoryAcknowledger {
    async fn ack(&self) -> Result<(), BoxError> {
        if let Some(broker) = self.broker.upgrade() {
            broker.record_ack(&self.message_id);
        }
        Ok(())
    }

    async fn nack(&self) -> Result<(), BoxError> {
        if let Some(broker) = self.broker.upgrade() {
            broker.record_nack(&self.message_id);
        }
        Ok(())
    }
}
