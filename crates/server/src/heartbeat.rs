use crate::error::{Error, Result};

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Negotiated heart-beat intervals for one connection.
///
/// The timers themselves are run by the connection layer; it watches
/// [`token`](Self::token) and stops when the session disconnects.
#[derive(Clone, Debug)]
pub struct Heartbeat {
    /// How often the server must send something to the client.
    pub outgoing: Duration,
    /// How often the server expects something from the client.
    pub incoming: Duration,
    token: CancellationToken,
}

impl Heartbeat {
    /// Creates a running heartbeat with the given intervals.
    #[must_use]
    pub fn new(outgoing: Duration, incoming: Duration) -> Self {
        Self {
            outgoing,
            incoming,
            token: CancellationToken::new(),
        }
    }

    /// Negotiates intervals from the client's `heart-beat` header (`cx,cy` in
    /// milliseconds) and the server's own `(sx, sy)` preference.
    ///
    /// Returns `None` when neither direction heart-beats.
    ///
    /// # Errors
    /// Returns [`Error::InvalidHeader`] if the header is malformed.
    pub fn negotiate(client: Option<&str>, server: (u64, u64)) -> Result<Option<Self>> {
        let (cx, cy) = match client {
            Some(value) => parse(value)?,
            None => (0, 0),
        };
        let (sx, sy) = server;

        let outgoing = if sx == 0 || cy == 0 { 0 } else { sx.max(cy) };
        let incoming = if cx == 0 || sy == 0 { 0 } else { cx.max(sy) };

        if outgoing == 0 && incoming == 0 {
            return Ok(None);
        }

        Ok(Some(Self::new(
            Duration::from_millis(outgoing),
            Duration::from_millis(incoming),
        )))
    }

    /// The token the heart-beat timers observe.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Stops heart-beating.
    pub fn stop(&self) {
        if !self.token.is_cancelled() {
            debug!("stopping heartbeat");
            self.token.cancel();
        }
    }

    /// Whether [`stop`](Self::stop) has been called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }
}

fn parse(value: &str) -> Result<(u64, u64)> {
    let invalid = || Error::InvalidHeader {
        name: "heart-beat",
        value: value.to_string(),
    };
    let (cx, cy) = value.split_once(',').ok_or_else(invalid)?;
    let cx = cx.trim().parse().map_err(|_| invalid())?;
    let cy = cy.trim().parse().map_err(|_| invalid())?;
    Ok((cx, cy))
}
