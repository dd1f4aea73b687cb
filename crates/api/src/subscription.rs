use crate::BoxError;
use crate::message::Message;

use std::fmt::Debug;

use async_trait::async_trait;

/// A registered interest in a destination, owned by a client session.
#[async_trait]
pub trait Subscription: Debug + Send + Sync + 'static {
    /// The session-scoped subscription id.
    fn id(&self) -> &str;

    /// The destination subscribed to.
    fn destination(&self) -> &str;

    /// Stops delivery for this subscription.
    async fn cancel(&self) -> Result<(), BoxError>;
}

/// A delivery target registered with a destination's fanout.
pub trait Subscriber: Debug + Send + Sync + 'static {
    /// Identity of the subscriber, unique per destination.
    fn id(&self) -> &str;

    /// The destination this subscriber listens on.
    fn destination(&self) -> &str;

    /// Delivers one message. Must not block.
    ///
    /// # Errors
    /// Returns an error if the message could not be handed on.
    fn send(&self, message: Message) -> Result<(), BoxError>;
}
