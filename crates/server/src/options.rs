use crate::version::Version;

/// Options for a [`ConduitServer`](crate::ConduitServer).
#[derive(Clone, Debug)]
pub struct ConduitServerOptions {
    /// Versions offered during the handshake.
    pub supported_versions: Vec<Version>,
    /// Server heart-beat preference `(sx, sy)` in milliseconds: the smallest
    /// interval the server can send at and the interval it would like to
    /// receive at. Zero disables a direction.
    pub heartbeat: (u64, u64),
    /// Capacity of the outbound channel created by
    /// [`ConduitServer::connect_channel`](crate::ConduitServer::connect_channel).
    /// Zero is treated as one.
    pub outbound_buffer: usize,
}

impl Default for ConduitServerOptions {
    fn default() -> Self {
        Self {
            supported_versions: Version::ALL.to_vec(),
            heartbeat: (10_000, 10_000),
            outbound_buffer: 1000,
        }
    }
}
