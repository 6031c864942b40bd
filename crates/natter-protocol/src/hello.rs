use natter_core::ConnId;
use serde::{Deserialize, Serialize};

/// Server → Client: pushed as the first frame of every WS connection.
/// Sent as: `EVENT hello { protocol: 1, conn_id: "...", ... }`
///
/// `conn_id` is how the client names itself later — the `X-Connection-Id`
/// header on HTTP submissions excludes that connection from delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hello {
    pub protocol: u32,
    pub conn_id: ConnId,
    pub server: ServerInfo,
    /// Channels this server is configured to carry.
    pub channels: Vec<String>,
    pub policy: ClientPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

/// What the server expects from a well-behaved client.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ClientPolicy {
    /// The server pings on this cadence; silence for three intervals gets
    /// the connection reaped.
    pub heartbeat_interval_secs: u64,
    /// Text frames above this size close the connection.
    pub max_payload_bytes: usize,
}
