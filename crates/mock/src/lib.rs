//! Recording mock of a conduit backend, for exercising the protocol core.
//!
//! Every backend effect is appended to a shared event log that tests can
//! inspect. Failures are injected per operation.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod conduit;
mod error;
mod factory;
mod state;

pub use conduit::{MockAcknowledger, MockConduit, MockSubscription, MockTransactionHandle};
pub use error::{Error, Result};
pub use factory::MockConduitFactory;
pub use state::MockEvent;
