use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use arc_swap::ArcSwap;
use conduit_api::{BoxError, Message, Subscriber};
use dashmap::DashMap;
use tracing::{debug, error, trace};

/// A failed delivery to one subscriber.
#[derive(Debug)]
pub struct DeliveryFailure {
    /// The subscriber the message could not be handed to.
    pub subscriber_id: String,
    /// Why delivery failed.
    pub error: BoxError,
}

/// Outcome of a broadcast delivery.
#[derive(Debug, Default)]
pub struct FanoutReport {
    /// Number of subscribers the message was handed to.
    pub delivered: usize,
    /// Subscribers that could not be reached.
    pub failures: Vec<DeliveryFailure>,
}

impl FanoutReport {
    /// Whether every subscriber received the message.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Copy-on-write subscriber list for one destination.
///
/// Deliveries iterate a snapshot, so registration and removal never tear an
/// in-progress iteration.
#[derive(Debug)]
struct SubscriberList {
    subscribers: ArcSwap<Vec<Arc<dyn Subscriber>>>,
    cursor: AtomicUsize,
}

impl SubscriberList {
    fn new() -> Self {
        Self {
            subscribers: ArcSwap::from_pointee(Vec::new()),
            cursor: AtomicUsize::new(0),
        }
    }

    fn add(&self, subscriber: &Arc<dyn Subscriber>) {
        self.subscribers.rcu(|current| {
            let mut next = Vec::clone(current);
            if !next.iter().any(|s| s.id() == subscriber.id()) {
                next.push(subscriber.clone());
            }
            next
        });
    }

    fn remove(&self, subscriber_id: &str) {
        self.subscribers.rcu(|current| {
            current
                .iter()
                .filter(|s| s.id() != subscriber_id)
                .cloned()
                .collect::<Vec<_>>()
        });
    }

    fn snapshot(&self) -> Arc<Vec<Arc<dyn Subscriber>>> {
        self.subscribers.load_full()
    }

    fn next(&self) -> Option<Arc<dyn Subscriber>> {
        let snapshot = self.subscribers.load();
        if snapshot.is_empty() {
            return None;
        }
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % snapshot.len();
        Some(snapshot[index].clone())
    }
}

/// Per-destination subscriber registry with broadcast and rotating delivery.
#[derive(Debug, Default)]
pub struct FanoutPolicy {
    destinations: DashMap<String, Arc<SubscriberList>>,
}

impl FanoutPolicy {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a subscriber to its destination. Registering twice is a no-op.
    pub fn register(&self, subscriber: Arc<dyn Subscriber>) {
        // Lists are never removed from the map, even when empty: removal could
        // race a register that already cloned the list and lose it.
        let list = self
            .destinations
            .entry(subscriber.destination().to_string())
            .or_insert_with(|| Arc::new(SubscriberList::new()))
            .clone();
        list.add(&subscriber);
        debug!(
            "registered subscriber {} on {}",
            subscriber.id(),
            subscriber.destination()
        );
    }

    /// Removes a subscriber from its destination. No-op if absent.
    pub fn unregister(&self, subscriber: &dyn Subscriber) {
        if let Some(list) = self.list(subscriber.destination()) {
            list.remove(subscriber.id());
            debug!(
                "unregistered subscriber {} from {}",
                subscriber.id(),
                subscriber.destination()
            );
        }
    }

    /// Number of subscribers currently registered on a destination.
    #[must_use]
    pub fn subscriber_count(&self, destination: &str) -> usize {
        self.list(destination)
            .map_or(0, |list| list.snapshot().len())
    }

    /// Hands the message to every current subscriber of its destination.
    ///
    /// A failing subscriber does not stop delivery to the others.
    pub fn deliver_to_all(&self, message: &Message) -> FanoutReport {
        let mut report = FanoutReport::default();
        let Some(list) = self.list(message.destination()) else {
            trace!("no subscribers for {}", message.destination());
            return report;
        };

        for subscriber in list.snapshot().iter() {
            match subscriber.send(message.clone()) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    error!(
                        "failed to deliver message {} to subscriber {}: {}",
                        message.id(),
                        subscriber.id(),
                        e
                    );
                    report.failures.push(DeliveryFailure {
                        subscriber_id: subscriber.id().to_string(),
                        error: e,
                    });
                }
            }
        }

        report
    }

    /// Hands the message to exactly one subscriber, rotating across calls.
    ///
    /// Returns the chosen subscriber's id, or `None` if the destination has no
    /// subscribers.
    ///
    /// # Errors
    /// Returns the chosen subscriber's failure.
    pub fn deliver_to_one(&self, message: &Message) -> Result<Option<String>, DeliveryFailure> {
        let Some(subscriber) = self
            .list(message.destination())
            .and_then(|list| list.next())
        else {
            trace!("no subscribers for {}", message.destination());
            return Ok(None);
        };

        subscriber
            .send(message.clone())
            .map(|()| Some(subscriber.id().to_string()))
            .map_err(|error| DeliveryFailure {
                subscriber_id: subscriber.id().to_string(),
                error,
            })
    }

    fn list(&self, destination: &str) -> Option<Arc<SubscriberList>> {
        self.destinations
            .get(destination)
            .map(|entry| entry.value().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;
    use std::thread;

    use parking_lot::Mutex;

    #[derive(Debug)]
    struct Recorder {
        id: String,
        destination: String,
        fail: bool,
        received: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn new(id: &str, destination: &str) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_string(),
                destination: destination.to_string(),
                fail: false,
                received: Mutex::new(Vec::new()),
            })
        }

        fn failing(id: &str, destination: &str) -> Arc<Self> {
            Arc::new(Self {
                fail: true,
                ..Arc::into_inner(Self::new(id, destination)).unwrap()
            })
        }

        fn count(&self) -> usize {
            self.received.lock().len()
        }
    }

    impl Subscriber for Recorder {
        fn id(&self) -> &str {
            &self.id
        }

        fn destination(&self) -> &str {
            &self.destination
        }

        fn send(&self, message: Message) -> Result<(), BoxError> {
            if self.fail {
                return Err("subscriber unavailable".into());
            }
            self.received.lock().push(message.id().to_string());
            Ok(())
        }
    }

    #[test]
    fn test_deliver_to_all_reaches_every_subscriber() {
        let policy = FanoutPolicy::new();
        let a = Recorder::new("a", "/topic/news");
        let b = Recorder::new("b", "/topic/news");
        let other = Recorder::new("c", "/topic/sport");
        policy.register(a.clone());
        policy.register(b.clone());
        policy.register(other.clone());

        let report = policy.deliver_to_all(&Message::new("/topic/news", "hello"));

        assert_eq!(report.delivered, 2);
        assert!(report.is_complete());
        assert_eq!(a.count(), 1);
        assert_eq!(b.count(), 1);
        assert_eq!(other.count(), 0);
    }

    #[test]
    fn test_deliver_to_all_isolates_failures() {
        let policy = FanoutPolicy::new();
        let first = Recorder::new("first", "/topic/news");
        let broken = Recorder::failing("broken", "/topic/news");
        let last = Recorder::new("last", "/topic/news");
        policy.register(first.clone());
        policy.register(broken);
        policy.register(last.clone());

        let report = policy.deliver_to_all(&Message::new("/topic/news", "hello"));

        assert_eq!(report.delivered, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].subscriber_id, "broken");
        assert_eq!(first.count(), 1);
        assert_eq!(last.count(), 1);
    }

    #[test]
    fn test_deliver_to_one_round_robin() {
        let policy = FanoutPolicy::new();
        let subscribers = [
            Recorder::new("a", "/queue/work"),
            Recorder::new("b", "/queue/work"),
            Recorder::new("c", "/queue/work"),
        ];
        for subscriber in &subscribers {
            policy.register(subscriber.clone());
        }

        let mut chosen: HashMap<String, usize> = HashMap::new();
        for _ in 0..31 {
            let id = policy
                .deliver_to_one(&Message::new("/queue/work", "job"))
                .unwrap()
                .unwrap();
            *chosen.entry(id).or_default() += 1;
        }

        for subscriber in &subscribers {
            let count = subscriber.count();
            assert!((10..=11).contains(&count), "uneven rotation: {count}");
            assert_eq!(chosen[&subscriber.id], count);
        }
    }

    #[test]
    fn test_deliver_to_one_without_subscribers_is_noop() {
        let policy = FanoutPolicy::new();
        assert!(
            policy
                .deliver_to_one(&Message::new("/queue/empty", "job"))
                .unwrap()
                .is_none()
        );

        let only = Recorder::new("only", "/queue/empty");
        policy.register(only.clone());
        policy.unregister(only.as_ref());

        assert!(
            policy
                .deliver_to_one(&Message::new("/queue/empty", "job"))
                .unwrap()
                .is_none()
        );
        assert_eq!(only.count(), 0);
    }

    #[test]
    fn test_deliver_to_one_reports_failure() {
        let policy = FanoutPolicy::new();
        policy.register(Recorder::failing("broken", "/queue/work"));

        let failure = policy
            .deliver_to_one(&Message::new("/queue/work", "job"))
            .unwrap_err();

        assert_eq!(failure.subscriber_id, "broken");
    }

    #[test]
    fn test_subscriber_registered_at_most_once() {
        let policy = FanoutPolicy::new();
        let a = Recorder::new("a", "/topic/news");
        policy.register(a.clone());
        policy.register(a.clone());

        assert_eq!(policy.subscriber_count("/topic/news"), 1);
        assert_eq!(
            policy.deliver_to_all(&Message::new("/topic/news", "x")).delivered,
            1
        );

        policy.unregister(a.as_ref());
        policy.unregister(a.as_ref());
        assert_eq!(policy.subscriber_count("/topic/news"), 0);
    }

    #[test]
    fn test_concurrent_registration_and_delivery() {
        let policy = Arc::new(FanoutPolicy::new());
        let stable = Recorder::new("stable", "/topic/busy");
        policy.register(stable.clone());

        let churn = {
            let policy = policy.clone();
            thread::spawn(move || {
                for i in 0..200 {
                    let subscriber = Recorder::new(&format!("churn-{i}"), "/topic/busy");
                    policy.register(subscriber.clone());
                    policy.unregister(subscriber.as_ref());
                }
            })
        };

        for _ in 0..200 {
            let report = policy.deliver_to_all(&Message::new("/topic/busy", "x"));
            assert!(report.is_complete());
        }
        churn.join().unwrap();

        assert_eq!(stable.count(), 200);
        assert_eq!(policy.subscriber_count("/topic/busy"), 1);
    }
}
