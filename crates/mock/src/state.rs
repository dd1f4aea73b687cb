use std::collections::{HashMap, HashSet};

use conduit_api::Message;
use parking_lot::Mutex;
use uuid::Uuid;

/// A backend effect observed by the mock.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MockEvent {
    /// A message reached the backend.
    Send(Message),
    /// A subscription was created.
    Subscribe {
        /// Subscription id.
        id: String,
        /// Destination subscribed to.
        destination: String,
    },
    /// A subscription was cancelled.
    Cancel {
        /// Subscription id.
        id: String,
    },
    /// A message was acknowledged.
    Ack(String),
    /// A message was negatively acknowledged.
    Nack(String),
    /// A native transaction began.
    Begin,
    /// A native transaction committed.
    Commit,
    /// A native transaction rolled back.
    Rollback,
}

#[derive(Debug, Default)]
pub(crate) struct Failures {
    pub connect: bool,
    pub send_bodies: HashSet<String>,
    pub declined: HashSet<String>,
    pub begin: bool,
    pub commit: bool,
    pub rollback: bool,
    pub cancel: bool,
}

#[derive(Debug, Default)]
pub(crate) struct State {
    pub events: Vec<MockEvent>,
    pub failures: Failures,
    /// Native transaction currently associated with the caller, if any.
    pub resumed: Option<Uuid>,
    /// Sends made inside native transactions, keyed by transaction.
    pub staged: HashMap<Uuid, Vec<Message>>,
}

pub(crate) type Shared = std::sync::Arc<Mutex<State>>;
