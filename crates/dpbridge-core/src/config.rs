//! Runtime configuration for device sessions.
//!
//! Defaults live in [`defaults`], environment variable names in [`env_vars`].
//! A [`BridgeConfig`] can be built from defaults, from the environment, or
//! deserialized from JSON with any field omitted.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::eventbus::DEFAULT_CHANNEL_CAPACITY;

/// Default values.
pub mod defaults {
    /// Transport acknowledgement timeout for one outbound command
    pub const SEND_TIMEOUT_MS: u64 = 5_000;
    /// Outbound datapoint commands are fire-and-acknowledge
    pub const EXPECT_REPLY: bool = false;
    /// Vendor-specific cluster carrying the datapoint sub-protocol
    pub const COMMAND_CLUSTER_ID: u16 = 0xEF00;
    /// "Set datapoint" command inside the vendor cluster
    pub const SET_DATA_COMMAND_ID: u8 = 0x00;
}

/// Environment variable names.
pub mod env_vars {
    pub const SEND_TIMEOUT_MS: &str = "DPBRIDGE_SEND_TIMEOUT_MS";
    pub const EXPECT_REPLY: &str = "DPBRIDGE_EXPECT_REPLY";
    pub const EVENT_CAPACITY: &str = "DPBRIDGE_EVENT_CAPACITY";
    pub const LOG_JSON: &str = "DPBRIDGE_LOG_JSON";
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Settings shared by every device session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Milliseconds to wait for the transport to acknowledge a command
    pub send_timeout_ms: u64,
    /// Ask the transport to wait for a device reply
    pub expect_reply: bool,
    /// Buffered events per event bus subscriber
    pub event_channel_capacity: usize,
    pub command_cluster_id: u16,
    pub set_data_command_id: u8,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            send_timeout_ms: defaults::SEND_TIMEOUT_MS,
            expect_reply: defaults::EXPECT_REPLY,
            event_channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            command_cluster_id: defaults::COMMAND_CLUSTER_ID,
            set_data_command_id: defaults::SET_DATA_COMMAND_ID,
        }
    }
}

impl BridgeConfig {
    /// Defaults overridden by any environment variables that are set.
    ///
    /// Unparseable values are reported rather than silently ignored.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(v) = read_env(env_vars::SEND_TIMEOUT_MS)? {
            config.send_timeout_ms = v;
        }
        if let Some(v) = read_env(env_vars::EXPECT_REPLY)? {
            config.expect_reply = v;
        }
        if let Some(v) = read_env(env_vars::EVENT_CAPACITY)? {
            config.event_channel_capacity = v;
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON document; omitted fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file.
    pub fn from_json_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.send_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "send_timeout_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.event_channel_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "event_channel_capacity",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_expect_reply(mut self, expect_reply: bool) -> Self {
        self.expect_reply = expect_reply;
        self
    }
}

fn read_env<T: std::str::FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid {
                field: name,
                reason: format!("cannot parse '{}'", raw),
            }),
        Err(_) => Ok(None),
    }
}
