//! Session, transaction and acknowledgement engine that lets a STOMP-style
//! protocol drive any backend reachable through a message conduit.
//!
//! Inbound operations flow from the protocol layer into a [`Session`], which
//! routes them either into a buffered [`Transaction`] or straight to the
//! backend. Outbound messages flow from the backend through a [`DeliverySink`]
//! (and, for backends that need it, a [`FanoutPolicy`]) to the transport.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod ack_tracker;
mod delivery;
mod error;
mod fanout;
mod heartbeat;
mod options;
mod pseudo;
mod registry;
mod server;
mod session;
mod transaction;
mod version;

pub use ack_tracker::AckTracker;
pub use delivery::{ChannelTransport, DeliverySink, OutboundTransport};
pub use error::{Error, Result};
pub use fanout::{DeliveryFailure, FanoutPolicy, FanoutReport};
pub use heartbeat::Heartbeat;
pub use options::ConduitServerOptions;
pub use pseudo::{
    PseudoTransactionHandle, PseudoTransactionalConduit, PseudoTransactionalConduitFactory,
};
pub use registry::SessionRegistry;
pub use server::ConduitServer;
pub use session::{AckOutcome, Session, SessionState};
pub use transaction::{BufferedOperation, Transaction};
pub use version::Version;
