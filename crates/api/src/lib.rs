//! Abstract interface between the protocol core and a backend message broker.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Completion handlers attached to outbound messages.
pub mod acknowledger;

/// Per-session backend handles.
pub mod conduit;

/// Messages and headers.
pub mod message;

/// Backend-visible session identity.
pub mod session;

/// The outbound path from the backend toward a connection.
pub mod sink;

/// Subscribers and subscriptions.
pub mod subscription;

/// Transactional capability of a backend.
pub mod transaction;

pub use acknowledger::Acknowledger;
pub use conduit::{MessageConduit, MessageConduitFactory};
pub use message::{Headers, Message};
pub use session::ConduitSession;
pub use sink::{AcknowledgeableSink, SinkError};
pub use subscription::{Subscriber, Subscription};
pub use transaction::{TransactionHandle, TransactionalConduit, TransactionalConduitFactory};

/// Boxed error returned across the backend seam.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
