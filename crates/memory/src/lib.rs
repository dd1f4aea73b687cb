//! In-process message broker behind the conduit interface.
//!
//! Destinations under the queue prefix deliver each message to one
//! subscriber, round-robin. Every other destination is a topic and broadcasts.
//! The broker has no transactions of its own, so a server built on it runs
//! pseudo transactions.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod broker;
mod conduit;
mod error;

pub use broker::{MemoryBroker, MemoryBrokerOptions};
pub use conduit::{MemoryConduit, MemoryConduitFactory, MemorySubscription};
pub use error::{Error, Result};
