use crate::session::Session;

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

/// Live sessions of one server, keyed by session id.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<Uuid, Arc<Session>>,
}

impl SessionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&self, session: Arc<Session>) {
        debug!("registered session {}", session.id());
        self.sessions.insert(*session.id(), session);
    }

    pub(crate) fn unregister(&self, id: &Uuid) {
        if self.sessions.remove(id).is_some() {
            debug!("unregistered session {}", id);
        }
    }

    /// Looks up a live session.
    #[must_use]
    pub fn get(&self, id: &Uuid) -> Option<Arc<Session>> {
        self.sessions.get(id).map(|entry| entry.value().clone())
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether there are no live sessions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Snapshot of every live session.
    #[must_use]
    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }
}
