use crate::ack_tracker::AckTracker;
use crate::delivery::{ChannelTransport, DeliverySink, OutboundTransport};
use crate::error::{Error, Result};
use crate::heartbeat::Heartbeat;
use crate::options::ConduitServerOptions;
use crate::pseudo::PseudoTransactionalConduitFactory;
use crate::registry::SessionRegistry;
use crate::session::Session;
use crate::version::Version;

use std::sync::Arc;

use conduit_api::{
    AcknowledgeableSink, Headers, Message, MessageConduitFactory, TransactionalConduitFactory,
};
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

/// Adapts a backend conduit factory to protocol sessions.
///
/// Whether the backend is natively transactional is decided once, here; every
/// session afterwards talks to a uniform transactional factory.
pub struct ConduitServer {
    factory: Arc<dyn TransactionalConduitFactory>,
    native_transactions: bool,
    options: ConduitServerOptions,
    registry: Arc<SessionRegistry>,
}

impl ConduitServer {
    /// Creates a server over `factory`, wrapping it in pseudo transactions if
    /// it has no native transactional capability.
    #[must_use]
    pub fn new(factory: Arc<dyn MessageConduitFactory>, options: ConduitServerOptions) -> Self {
        let (factory, native_transactions) = match factory.clone().transactional() {
            Some(transactional) => (transactional, true),
            None => (
                Arc::new(PseudoTransactionalConduitFactory::new(factory))
                    as Arc<dyn TransactionalConduitFactory>,
                false,
            ),
        };
        info!(
            "conduit server configured with {} transactions",
            if native_transactions { "native" } else { "pseudo" }
        );

        Self {
            factory,
            native_transactions,
            options,
            registry: Arc::new(SessionRegistry::new()),
        }
    }

    /// Whether the backend runs transactions natively.
    #[must_use]
    pub const fn supports_native_transactions(&self) -> bool {
        self.native_transactions
    }

    /// The server's options.
    #[must_use]
    pub const fn options(&self) -> &ConduitServerOptions {
        &self.options
    }

    /// Completes a client handshake over an existing transport.
    ///
    /// Negotiates version and heart-beat from the `accept-version` and
    /// `heart-beat` headers, creates the backend conduit and registers the
    /// new session.
    ///
    /// # Errors
    /// Returns [`Error::UnsupportedVersion`] or [`Error::InvalidHeader`] for a
    /// bad handshake, or [`Error::Backend`] if the conduit cannot be created.
    pub async fn connect<T>(&self, transport: T, headers: &Headers) -> Result<Arc<Session>>
    where
        T: OutboundTransport,
    {
        let version = Version::negotiate(
            headers.get("accept-version").map(String::as_str),
            &self.options.supported_versions,
        )?;
        let heartbeat = if version.supports_heartbeat() {
            Heartbeat::negotiate(
                headers.get("heart-beat").map(String::as_str),
                self.options.heartbeat,
            )?
        } else {
            None
        };

        let acks = Arc::new(AckTracker::new());
        let sink: Arc<dyn AcknowledgeableSink> =
            Arc::new(DeliverySink::new(transport, acks.clone()));
        let conduit = self
            .factory
            .create_transactional_conduit(sink, headers)
            .await
            .map_err(Error::Backend)?;

        let session = Arc::new(Session::new(
            conduit,
            acks,
            version,
            heartbeat,
            &self.registry,
        ));
        self.registry.register(session.clone());
        Ok(session)
    }

    /// Like [`connect`](Self::connect), over a fresh [`ChannelTransport`] sized
    /// by [`ConduitServerOptions::outbound_buffer`]. The receiver yields the
    /// messages destined for the client.
    ///
    /// # Errors
    /// See [`connect`](Self::connect).
    pub async fn connect_channel(
        &self,
        headers: &Headers,
    ) -> Result<(Arc<Session>, mpsc::Receiver<Message>)> {
        let (transport, receiver) = ChannelTransport::channel(self.options.outbound_buffer);
        let session = self.connect(transport, headers).await?;
        Ok((session, receiver))
    }

    /// Looks up a live session.
    #[must_use]
    pub fn session(&self, id: &Uuid) -> Option<Arc<Session>> {
        self.registry.get(id)
    }

    /// Number of live sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.registry.len()
    }

    /// Disconnects every live session.
    pub async fn shutdown(&self) {
        let sessions = self.registry.sessions();
        debug!("shutting down {} sessions", sessions.len());
        for session in sessions {
            session.disconnect().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use assert_matches::assert_matches;
    use conduit_mock::MockConduitFactory;
    use tracing_test::traced_test;

    use crate::session::SessionState;

    fn headers(pairs: &[(&str, &str)]) -> Headers {
        pairs
            .iter()
            .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
            .collect()
    }

    fn server(factory: MockConduitFactory) -> ConduitServer {
        ConduitServer::new(Arc::new(factory), ConduitServerOptions::default())
    }

    #[test]
    #[traced_test]
    fn test_capability_detection() {
        assert!(!server(MockConduitFactory::new()).supports_native_transactions());
        assert!(logs_contain("pseudo transactions"));

        assert!(server(MockConduitFactory::native()).supports_native_transactions());
        assert!(logs_contain("native transactions"));
    }

    #[tokio::test]
    async fn test_connect_negotiates_version_and_heartbeat() {
        let server = server(MockConduitFactory::new());
        let (session, _outbound) = server
            .connect_channel(&headers(&[
                ("accept-version", "1.0,1.2"),
                ("heart-beat", "1000,30000"),
            ]))
            .await
            .unwrap();

        assert_eq!(session.version(), Version::V1_2);
        let heartbeat = session.heartbeat().unwrap();
        assert_eq!(heartbeat.outgoing, Duration::from_millis(30_000));
        assert_eq!(heartbeat.incoming, Duration::from_millis(10_000));

        assert_eq!(server.session_count(), 1);
        assert!(server.session(session.id()).is_some());
    }

    #[tokio::test]
    async fn test_version_1_0_has_no_heartbeat() {
        let server = server(MockConduitFactory::new());
        let (session, _outbound) = server
            .connect_channel(&headers(&[("heart-beat", "1000,1000")]))
            .await
            .unwrap();

        assert_eq!(session.version(), Version::V1_0);
        assert!(session.heartbeat().is_none());
    }

    #[tokio::test]
    async fn test_bad_handshakes_are_rejected() {
        let server = server(MockConduitFactory::new());

        let result = server
            .connect_channel(&headers(&[("accept-version", "2.0")]))
            .await;
        assert_matches!(result, Err(Error::UnsupportedVersion(_)));

        let result = server
            .connect_channel(&headers(&[
                ("accept-version", "1.2"),
                ("heart-beat", "fast"),
            ]))
            .await;
        assert_matches!(result, Err(Error::InvalidHeader { name: "heart-beat", .. }));

        assert_eq!(server.session_count(), 0);
    }

    #[tokio::test]
    async fn test_zero_outbound_buffer() {
        let options = ConduitServerOptions {
            outbound_buffer: 0,
            ..ConduitServerOptions::default()
        };
        let factory = Arc::new(MockConduitFactory::new());
        let server = ConduitServer::new(factory.clone(), options);

        let (_session, mut outbound) = server.connect_channel(&Headers::new()).await.unwrap();
        factory
            .last_conduit()
            .unwrap()
            .deliver(Message::with_id("m1", "/queue/a", "x"), false)
            .unwrap();

        assert_eq!(outbound.recv().await.unwrap().id(), "m1");
    }

    #[tokio::test]
    async fn test_backend_refusal() {
        let factory = Arc::new(MockConduitFactory::new());
        factory.refuse_connections();
        let server = ConduitServer::new(factory, ConduitServerOptions::default());

        let result = server.connect_channel(&Headers::new()).await;

        assert_matches!(result, Err(Error::Backend(_)));
        assert_eq!(server.session_count(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_disconnects_everything() {
        let server = server(MockConduitFactory::new());
        let (first, _first_outbound) = server
            .connect_channel(&headers(&[("accept-version", "1.2"), ("heart-beat", "0,1000")]))
            .await
            .unwrap();
        let (second, _second_outbound) = server.connect_channel(&Headers::new()).await.unwrap();
        assert_eq!(server.session_count(), 2);

        server.shutdown().await;

        assert_eq!(server.session_count(), 0);
        assert_eq!(first.state().await, SessionState::Disconnected);
        assert_eq!(second.state().await, SessionState::Disconnected);
        assert!(first.heartbeat().unwrap().is_stopped());
    }
}
