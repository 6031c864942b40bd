use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::NatterError;

// Wire protocol constants — clients key on these.
pub const PROTOCOL_VERSION: u32 = 1;
pub const DEFAULT_PORT: u16 = 6001;
pub const DEFAULT_BIND: &str = "127.0.0.1";
/// Hard cap per inbound WS text frame.
pub const MAX_PAYLOAD_BYTES: usize = 64 * 1024;
/// Author name cap in bytes, applied after trimming.
pub const MAX_AUTHOR_BYTES: usize = 128;
/// Message body cap in bytes, applied after trimming.
pub const MAX_BODY_BYTES: usize = 8 * 1024;
/// Per-connection transfer queue between subscription pumps and the socket
/// writer. The subscriber lag bound is `broadcast.queue_capacity`, not this.
pub const OUTBOUND_BUFFER: usize = 64;

/// Top-level config (natter.toml + NATTER_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NatterConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Channels available for publish/subscribe. The first entry is the
    /// default for submissions that name no channel.
    #[serde(default = "default_channels")]
    pub channels: Vec<String>,
    #[serde(default)]
    pub broadcast: BroadcastConfig,
    #[serde(default)]
    pub liveness: LivenessConfig,
}

impl Default for NatterConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            channels: default_channels(),
            broadcast: BroadcastConfig::default(),
            liveness: LivenessConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Fan-out tuning for the broadcast hub.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastConfig {
    /// How many publishes a subscriber may lag behind before the overflow
    /// policy kicks in. Also bounds per-channel delivery memory.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default)]
    pub overflow_policy: OverflowPolicy,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            overflow_policy: OverflowPolicy::default(),
        }
    }
}

/// What happens to a subscriber that falls more than `queue_capacity`
/// publishes behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowPolicy {
    /// Discard the oldest pending messages and send the subscriber a gap
    /// notice with the missed count. The feed stays open.
    #[default]
    DropOldest,
    /// Terminate the subscriber's feed; the gateway closes the connection
    /// and the client is expected to reconnect and re-fetch history.
    Disconnect,
}

/// Heartbeat/liveness tuning for the connection manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessConfig {
    /// Cadence of server-sent WS pings.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,
    /// A connection with no inbound traffic for this long is deregistered.
    #[serde(default = "default_heartbeat_timeout")]
    pub heartbeat_timeout_secs: u64,
    /// How often the sweeper scans for stale connections.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: default_heartbeat_interval(),
            heartbeat_timeout_secs: default_heartbeat_timeout(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl LivenessConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_channels() -> Vec<String> {
    vec!["chat".to_string()]
}
fn default_queue_capacity() -> usize {
    256
}
fn default_heartbeat_interval() -> u64 {
    30
}
fn default_heartbeat_timeout() -> u64 {
    90
}
fn default_sweep_interval() -> u64 {
    10
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.natter/natter.db", home)
}

impl NatterConfig {
    /// Load config from a TOML file with NATTER_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. NATTER_CONFIG env var (resolved by the caller)
    ///   3. ~/.natter/natter.toml
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: NatterConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("NATTER_").split("_"))
            .extract()
            .map_err(|e| NatterError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that cannot run.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.channels.is_empty() {
            return Err(NatterError::Config(
                "channels must list at least one channel".into(),
            ));
        }
        if self.channels.iter().any(|c| c.trim().is_empty()) {
            return Err(NatterError::Config("channel names must not be blank".into()));
        }
        if self.broadcast.queue_capacity == 0 {
            return Err(NatterError::Config(
                "broadcast.queue_capacity must be at least 1".into(),
            ));
        }
        if self.liveness.heartbeat_interval_secs == 0
            || self.liveness.heartbeat_timeout_secs == 0
            || self.liveness.sweep_interval_secs == 0
        {
            return Err(NatterError::Config(
                "liveness intervals must be at least 1 second".into(),
            ));
        }
        Ok(())
    }

    /// The channel used when a submission names none.
    ///
    /// `validate` guarantees at least one entry exists.
    pub fn default_channel(&self) -> &str {
        &self.channels[0]
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.natter/natter.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = NatterConfig::default();
        config.validate().expect("defaults must validate");
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.channels, vec!["chat"]);
        assert_eq!(config.default_channel(), "chat");
        assert_eq!(config.broadcast.overflow_policy, OverflowPolicy::DropOldest);
    }

    #[test]
    fn parses_partial_toml() {
        let config: NatterConfig = Figment::new()
            .merge(Toml::string(
                r#"
                channels = ["chat", "dev"]

                [server]
                port = 9000

                [broadcast]
                queue_capacity = 8
                overflow_policy = "disconnect"
                "#,
            ))
            .extract()
            .expect("toml must parse");

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.bind, DEFAULT_BIND);
        assert_eq!(config.channels, vec!["chat", "dev"]);
        assert_eq!(config.broadcast.queue_capacity, 8);
        assert_eq!(config.broadcast.overflow_policy, OverflowPolicy::Disconnect);
        assert_eq!(config.liveness.heartbeat_interval_secs, 30);
    }

    #[test]
    fn rejects_empty_channel_list() {
        let mut config = NatterConfig::default();
        config.channels.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_queue_capacity() {
        let mut config = NatterConfig::default();
        config.broadcast.queue_capacity = 0;
        assert!(config.validate().is_err());
    }
}
