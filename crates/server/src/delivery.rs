use crate::ack_tracker::AckTracker;

use std::fmt::Debug;
use std::sync::Arc;

use conduit_api::{AcknowledgeableSink, Acknowledger, Message, SinkError};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{trace, warn};

/// The connection-side writer a [`DeliverySink`] hands messages to.
///
/// Both methods must be non-blocking.
pub trait OutboundTransport: Debug + Send + Sync + 'static {
    /// Whether a write would currently be accepted.
    fn is_writable(&self) -> bool;

    /// Writes one message.
    ///
    /// # Errors
    /// Returns a [`SinkError`] if the message was not accepted.
    fn write(&self, message: Message) -> Result<(), SinkError>;
}

/// Transport backed by a bounded tokio channel drained by the connection writer.
#[derive(Clone, Debug)]
pub struct ChannelTransport {
    sender: mpsc::Sender<Message>,
}

impl ChannelTransport {
    /// Wraps an existing sender.
    #[must_use]
    pub const fn new(sender: mpsc::Sender<Message>) -> Self {
        Self { sender }
    }

    /// Creates a transport and the receiver the connection writer drains.
    ///
    /// A zero `capacity` is treated as one.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Message>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self::new(sender), receiver)
    }
}

impl OutboundTransport for ChannelTransport {
    fn is_writable(&self) -> bool {
        !self.sender.is_closed() && self.sender.capacity() > 0
    }

    fn write(&self, message: Message) -> Result<(), SinkError> {
        self.sender.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => SinkError::Backpressure,
            TrySendError::Closed(_) => SinkError::Closed,
        })
    }
}

/// Outbound sink for one connection.
///
/// Registers acknowledgers with the connection's [`AckTracker`] before the
/// write so that a completion racing the write always finds its handler. When
/// the write does not happen the registration made by that call is rolled back.
#[derive(Debug)]
pub struct DeliverySink<T>
where
    T: OutboundTransport,
{
    acks: Arc<AckTracker>,
    transport: T,
}

impl<T> DeliverySink<T>
where
    T: OutboundTransport,
{
    /// Creates a sink writing to `transport` and registering with `acks`.
    pub const fn new(transport: T, acks: Arc<AckTracker>) -> Self {
        Self { acks, transport }
    }

    /// The tracker acknowledgers are registered with.
    #[must_use]
    pub const fn ack_tracker(&self) -> &Arc<AckTracker> {
        &self.acks
    }

    fn rollback(&self, message_id: &str, registered: Option<&Arc<dyn Acknowledger>>) {
        if let Some(acknowledger) = registered {
            self.acks.unregister(message_id, acknowledger);
        }
    }
}

impl<T> AcknowledgeableSink for DeliverySink<T>
where
    T: OutboundTransport,
{
    fn send(
        &self,
        message: Message,
        acknowledger: Option<Arc<dyn Acknowledger>>,
    ) -> Result<(), SinkError> {
        if self.acks.is_closed() {
            return Err(SinkError::Closed);
        }

        let message_id = message.id().to_string();
        if let Some(acknowledger) = &acknowledger {
            self.acks
                .register_acknowledger(message_id.clone(), acknowledger.clone());
            // A close() between the check above and the insert must not leave
            // the entry behind.
            if self.acks.is_closed() {
                self.rollback(&message_id, Some(acknowledger));
                return Err(SinkError::Closed);
            }
        }

        if !self.transport.is_writable() {
            warn!(
                "transport {:?} is not writable, rejecting message {}",
                self.transport, message_id
            );
            self.rollback(&message_id, acknowledger.as_ref());
            return Err(SinkError::Backpressure);
        }

        if let Err(e) = self.transport.write(message) {
            self.rollback(&message_id, acknowledger.as_ref());
            return Err(e);
        }

        trace!("delivered message {}", message_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use assert_matches::assert_matches;
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

    #[derive(Debug, Default)]
    struct SwitchTransport {
        blocked: AtomicBool,
        writes: AtomicUsize,
    }

    impl OutboundTransport for Arc<SwitchTransport> {
        fn is_writable(&self) -> bool {
            !self.blocked.load(Ordering::SeqCst)
        }

        fn write(&self, _message: Message) -> Result<(), SinkError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn sink() -> (DeliverySink<Arc<SwitchTransport>>, Arc<SwitchTransport>) {
        let transport = Arc::new(SwitchTransport::default());
        let sink = DeliverySink::new(transport.clone(), Arc::new(AckTracker::new()));
        (sink, transport)
    }

    #[test]
    fn test_send_registers_before_write() {
        let (sink, transport) = sink();

        sink.send(
            Message::with_id("m1", "/queue/a", "x"),
            Some(Arc::new(NoopAcknowledger)),
        )
        .unwrap();

        assert!(sink.ack_tracker().contains("m1"));
        assert_eq!(transport.writes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backpressure_rolls_back_registration() {
        let (sink, transport) = sink();
        transport.blocked.store(true, Ordering::SeqCst);

        let result = sink.send(
            Message::with_id("m1", "/queue/a", "x"),
            Some(Arc::new(NoopAcknowledger)),
        );

        assert_matches!(result, Err(SinkError::Backpressure));
        assert!(sink.ack_tracker().resolve("m1").is_none());
        assert_eq!(transport.writes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_send_without_acknowledger_registers_nothing() {
        let (sink, transport) = sink();

        sink.send(Message::with_id("m1", "/topic/a", "x"), None)
            .unwrap();

        assert!(sink.ack_tracker().is_empty());
        assert_eq!(transport.writes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_closed_tracker_rejects_sends() {
        let (sink, transport) = sink();
        sink.ack_tracker().close();

        let result = sink.send(
            Message::with_id("m1", "/queue/a", "x"),
            Some(Arc::new(NoopAcknowledger)),
        );

        assert_matches!(result, Err(SinkError::Closed));
        assert!(sink.ack_tracker().is_empty());
        assert_eq!(transport.writes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_channel_transport_full_channel_is_backpressure() {
        let (transport, mut receiver) = ChannelTransport::channel(1);
        let sink = DeliverySink::new(transport, Arc::new(AckTracker::new()));

        sink.send(Message::with_id("m1", "/queue/a", "1"), None)
            .unwrap();
        let result = sink.send(
            Message::with_id("m2", "/queue/a", "2"),
            Some(Arc::new(NoopAcknowledger)),
        );

        assert_matches!(result, Err(SinkError::Backpressure));
        assert!(!sink.ack_tracker().contains("m2"));
        assert_eq!(receiver.try_recv().unwrap().id(), "m1");
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn test_channel_transport_closed_receiver() {
        let (transport, receiver) = ChannelTransport::channel(4);
        drop(receiver);

        assert!(!transport.is_writable());
        assert_matches!(
            transport.write(Message::new("/queue/a", "x")),
            Err(SinkError::Closed)
        );
    }

    #[test]
    fn test_zero_capacity_channel_holds_one_message() {
        let (transport, mut receiver) = ChannelTransport::channel(0);

        assert!(transport.is_writable());
        transport.write(Message::with_id("m1", "/queue/a", "x")).unwrap();
        assert!(!transport.is_writable());
        assert_eq!(receiver.try_recv().unwrap().id(), "m1");
    }

    #[test]
    fn test_close_racing_sends_leaves_nothing_pending() {
        let (sink, _transport) = sink();
        let sink = &sink;

        std::thread::scope(|scope| {
            let sender = scope.spawn(move || {
                let mut sent = 0_u64;
                loop {
                    let result = sink.send(
                        Message::with_id(sent.to_string(), "/queue/a", "x"),
                        Some(Arc::new(NoopAcknowledger)),
                    );
                    if matches!(result, Err(SinkError::Closed)) {
                        return sent;
                    }
                    sent += 1;
                }
            });

            while sink.ack_tracker().len() < 100 {
                std::thread::yield_now();
            }
            sink.ack_tracker().close();
            assert!(sender.join().unwrap() >= 100);
        });

        assert!(sink.ack_tracker().is_empty());
    }
}
