use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use conduit_api::Acknowledger;
use dashmap::DashMap;
use tracing::{debug, trace};

/// Correlates in-flight message ids with the acknowledger the backend attached.
///
/// Registration happens on the outbound path (backend contexts) while
/// resolution happens on the owning session's inbound path, so the map is a
/// concurrent one.
#[derive(Default)]
pub struct AckTracker {
    pending: DashMap<String, Arc<dyn Acknowledger>>,
    closed: AtomicBool,
}

impl fmt::Debug for AckTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AckTracker")
            .field("pending", &self.pending.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl AckTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Associates a message id with its acknowledger. Last registration wins.
    pub fn register_acknowledger<I>(&self, message_id: I, acknowledger: Arc<dyn Acknowledger>)
    where
        I: Into<String>,
    {
        let message_id = message_id.into();
        if self.pending.insert(message_id.clone(), acknowledger).is_some() {
            trace!("replaced acknowledger for redelivered message {}", message_id);
        }
    }

    /// Removes and returns the acknowledger for a message id.
    ///
    /// A handler is handed out at most once; a second call returns `None`.
    pub fn resolve(&self, message_id: &str) -> Option<Arc<dyn Acknowledger>> {
        self.pending.remove(message_id).map(|(_, acknowledger)| acknowledger)
    }

    /// Removes the entry for `message_id` only if it is still `acknowledger`.
    pub(crate) fn unregister(&self, message_id: &str, acknowledger: &Arc<dyn Acknowledger>) {
        self.pending
            .remove_if(message_id, |_, current| Arc::ptr_eq(current, acknowledger));
    }

    /// Whether an acknowledger is pending for the message id.
    #[must_use]
    pub fn contains(&self, message_id: &str) -> bool {
        self.pending.contains_key(message_id)
    }

    /// Number of pending acknowledgements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drops every pending entry and refuses further deliveries.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let dropped = self.pending.len();
        self.pending.clear();
        if dropped > 0 {
            debug!("dropped {} pending acknowledgements on close", dropped);
        }
    }

    /// Whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use conduit_api::BoxError;

    #[derive(Debug)]
    struct NoopAcknowledger;

    #[async_trait]
    impl Acknowledger for NoopAcknowledger {
        async fn ack(&self) -> Result<(), BoxError> {
            Ok(())
        }

        async fn nack(&self) -> Result<(), BoxError> {
            Ok(())
        }
    }

    fn acknowledger() -> Arc<dyn Acknowledger> {
        Arc::new(NoopAcknowledger)
    }

    #[test]
    fn test_resolve_returns_handler_exactly_once() {
        let tracker = AckTracker::new();
        let handler = acknowledger();

        tracker.register_acknowledger("m1", handler.clone());

        let resolved = tracker.resolve("m1").expect("handler should be pending");
        assert!(Arc::ptr_eq(&resolved, &handler));
        assert!(tracker.resolve("m1").is_none());
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_last_registration_wins() {
        let tracker = AckTracker::new();
        let first = acknowledger();
        let second = acknowledger();

        tracker.register_acknowledger("m1", first);
        tracker.register_acknowledger("m1", second.clone());

        assert_eq!(tracker.len(), 1);
        assert!(Arc::ptr_eq(&tracker.resolve("m1").unwrap(), &second));
    }

    #[test]
    fn test_unregister_only_removes_matching_handler() {
        let tracker = AckTracker::new();
        let stale = acknowledger();
        let current = acknowledger();

        tracker.register_acknowledger("m1", current.clone());
        tracker.unregister("m1", &stale);
        assert!(tracker.contains("m1"));

        tracker.unregister("m1", &current);
        assert!(!tracker.contains("m1"));
    }

    #[test]
    fn test_unknown_id_resolves_to_none() {
        let tracker = AckTracker::new();
        assert!(tracker.resolve("never-registered").is_none());
    }

    #[test]
    fn test_close_clears_pending() {
        let tracker = AckTracker::new();
        tracker.register_acknowledger("m1", acknowledger());
        tracker.register_acknowledger("m2", acknowledger());

        tracker.close();

        assert!(tracker.is_closed());
        assert!(tracker.is_empty());
    }
}
