use std::collections::HashMap;

use bytes::Bytes;
use uuid::Uuid;

/// Frame headers.
pub type Headers = HashMap<String, String>;

/// A message travelling between a client connection and the backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    id: String,
    destination: String,
    headers: Headers,
    body: Bytes,
}

impl Message {
    /// Creates a message with a freshly generated id.
    pub fn new<D, B>(destination: D, body: B) -> Self
    where
        D: Into<String>,
        B: Into<Bytes>,
    {
        Self::with_id(Uuid::new_v4().to_string(), destination, body)
    }

    /// Creates a message with the given id.
    pub fn with_id<I, D, B>(id: I, destination: D, body: B) -> Self
    where
        I: Into<String>,
        D: Into<String>,
        B: Into<Bytes>,
    {
        Self {
            id: id.into(),
            destination: destination.into(),
            headers: Headers::new(),
            body: body.into(),
        }
    }

    /// Adds a header, replacing any previous value.
    #[must_use]
    pub fn with_header<K, V>(mut self, name: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// The message id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The destination the message is addressed to.
    #[must_use]
    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// The message headers.
    #[must_use]
    pub const fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Mutable access to the message headers.
    pub const fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    /// Looks up a single header.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// The message body.
    #[must_use]
    pub const fn body(&self) -> &Bytes {
        &self.body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique() {
        let first = Message::new("/queue/a", "x");
        let second = Message::new("/queue/a", "x");

        assert_ne!(first.id(), second.id());
        assert_ne!(first, second);
    }

    #[test]
    fn test_headers() {
        let message = Message::with_id("m1", "/topic/news", Bytes::from_static(b"hello"))
            .with_header("content-type", "text/plain")
            .with_header("content-type", "application/json");

        assert_eq!(message.id(), "m1");
        assert_eq!(message.destination(), "/topic/news");
        assert_eq!(message.header("content-type"), Some("application/json"));
        assert_eq!(message.header("missing"), None);
        assert_eq!(message.body(), &Bytes::from_static(b"hello"));
    }
}
