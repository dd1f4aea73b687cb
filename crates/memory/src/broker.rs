use crate::error::{Error, Result};

use conduit_api::{Message, Subscriber};
use conduit_server::FanoutPolicy;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, warn};

/// Options for a [`MemoryBroker`].
#[derive(Clone, Debug)]
pub struct MemoryBrokerOptions {
    /// Destinations starting with this prefix are point-to-point queues.
    pub queue_prefix: String,
    /// How many acknowledged (and, separately, negatively acknowledged)
    /// message ids the broker remembers. Oldest ids are forgotten first.
    pub ack_history: usize,
}

impl Default for MemoryBrokerOptions {
    fn default() -> Self {
        Self {
            queue_prefix: "/queue/".to_string(),
            ack_history: 1024,
        }
    }
}

/// Routes published messages to the subscribers of each destination.
#[derive(Debug, Default)]
pub struct MemoryBroker {
    acked: Mutex<VecDeque<String>>,
    fanout: FanoutPolicy,
    nacked: Mutex<VecDeque<String>>,
    options: MemoryBrokerOptions,
}

impl MemoryBroker {
    /// Creates a broker.
    #[must_use]
    pub fn new(options: MemoryBrokerOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// Whether `destination` is a queue.
    #[must_use]
    pub fn is_queue(&self, destination: &str) -> bool {
        destination.starts_with(&self.options.queue_prefix)
    }

    /// Routes a message and returns how many subscribers received it.
    ///
    /// A message nobody listens for is dropped. Topic deliveries that fail for
    /// some subscribers are logged and do not fail the publish.
    ///
    /// # Errors
    /// Returns [`Error::Delivery`] if the queue consumer picked for the
    /// message refuses it.
    pub fn publish(&self, message: &Message) -> Result<usize> {
        if self.is_queue(message.destination()) {
            return match self.fanout.deliver_to_one(message) {
                Ok(Some(_)) => Ok(1),
                Ok(None) => {
                    debug!("no consumer on {}, dropping {}", message.destination(), message.id());
                    Ok(0)
                }
                Err(failure) => Err(Error::Delivery {
                    subscriber: failure.subscriber_id,
                    source: failure.error,
                }),
            };
        }

        let report = self.fanout.deliver_to_all(message);
        if !report.is_complete() {
            warn!(
                "{} of {} deliveries failed on {}",
                report.failures.len(),
                report.delivered + report.failures.len(),
                message.destination()
            );
        }
        Ok(report.delivered)
    }

    /// Number of subscribers on `destination`.
    #[must_use]
    pub fn subscriber_count(&self, destination: &str) -> usize {
        self.fanout.subscriber_count(destination)
    }

    /// Most recently acknowledged message ids, oldest first.
    #[must_use]
    pub fn acked(&self) -> Vec<String> {
        self.acked.lock().iter().cloned().collect()
    }

    /// Most recently negatively acknowledged message ids, oldest first.
    #[must_use]
    pub fn nacked(&self) -> Vec<String> {
        self.nacked.lock().iter().cloned().collect()
    }

    pub(crate) fn register(&self, subscriber: Arc<dyn Subscriber>) {
        self.fanout.register(subscriber);
    }

    pub(crate) fn unregister(&self, subscriber: &dyn Subscriber) {
        self.fanout.unregister(subscriber);
    }

    pub(crate) fn record_ack(&self, message_id: &str) {
        self.remember(&self.acked, message_id);
    }

    pub(crate) fn record_nack(&self, message_id: &str) {
        self.remember(&self.nacked, message_id);
    }

    fn remember(&self, history: &Mutex<VecDeque<String>>, message_id: &str) {
        if self.options.ack_history == 0 {
            return;
        }
        let mut history = history.lock();
        while history.len() >= self.options.ack_history {
            history.pop_front();
        }
        history.push_back(message_id.to_string());
    }
}
