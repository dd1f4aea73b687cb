use std::collections::HashMap;

use parking_lot::RwLock;
use uuid::Uuid;

/// Backend-visible identity of one client session.
///
/// Carries a small attribute bag backends can use to stash per-session data.
#[derive(Debug)]
pub struct ConduitSession {
    id: Uuid,
    attributes: RwLock<HashMap<String, String>>,
}

impl Default for ConduitSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ConduitSession {
    /// Creates a session with a random id.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            attributes: RwLock::new(HashMap::new()),
        }
    }

    /// The session id.
    #[must_use]
    pub const fn id(&self) -> &Uuid {
        &self.id
    }

    /// Reads an attribute.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<String> {
        self.attributes.read().get(name).cloned()
    }

    /// Sets an attribute, returning the previous value.
    pub fn set_attribute<K, V>(&self, name: K, value: V) -> Option<String>
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.attributes.write().insert(name.into(), value.into())
    }

    /// Removes an attribute.
    pub fn remove_attribute(&self, name: &str) -> Option<String> {
        self.attributes.write().remove(name)
    }
}
