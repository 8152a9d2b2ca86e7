//! Configuration for the PlaySync server
//!
//! Configuration can be loaded from a TOML file and/or environment variables.

use playsync_core::{FallbackMode, LeaderPolicy, SyncSettings};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration for the PlaySync server
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Initial synchronization settings (live-mutable afterwards)
    #[serde(default)]
    pub sync: SyncSettings,

    /// Endpoint channel configuration
    #[serde(default)]
    pub channel: ChannelConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP API port
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,
}

fn default_http_port() -> u16 {
    8080
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: default_http_port(),
            host: default_host(),
        }
    }
}

/// Per-endpoint outbound channel settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Queued commands per endpoint before new ones are dropped
    #[serde(default = "default_command_buffer")]
    pub command_buffer: usize,
}

fn default_command_buffer() -> usize {
    64
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            command_buffer: default_command_buffer(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e.to_string()))?;
        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Config::default();

        // Server
        if let Some(host) = var("PLAYSYNC_HOST") {
            config.server.host = host;
        }
        if let Some(p) = var("PLAYSYNC_HTTP_PORT").and_then(|v| v.parse().ok()) {
            config.server.http_port = p;
        }

        // Sync
        if let Some(t) = var("PLAYSYNC_TOLERANCE_MS").and_then(|v| v.parse().ok()) {
            config.sync.tolerance_ms = t;
        }
        if let Some(hz) = var("PLAYSYNC_SYNC_HZ").and_then(|v| v.parse::<f64>().ok()) {
            if hz.is_finite() && hz > 0.0 {
                config.sync.sync_frequency_hz = hz;
            }
        }
        if let Some(s) = var("PLAYSYNC_STALL_MS").and_then(|v| v.parse().ok()) {
            config.sync.stall_threshold_ms = s;
        }
        if let Some(b) = var("PLAYSYNC_REJOIN_BUFFER_MS").and_then(|v| v.parse().ok()) {
            config.sync.rejoin_buffer_ms = b;
        }
        if let Some(policy) = var("PLAYSYNC_LEADER_POLICY").and_then(|v| v.parse::<LeaderPolicy>().ok()) {
            config.sync.leader_policy = policy;
        }
        if let Some(mode) = var("PLAYSYNC_FALLBACK_MODE").and_then(|v| v.parse::<FallbackMode>().ok()) {
            config.sync.fallback_mode = mode;
        }

        config
    }

    /// Load configuration from file if it exists, otherwise from environment
    pub fn load<P: AsRef<Path>>(path: Option<P>) -> Result<Self, ConfigError> {
        if let Some(p) = path {
            if p.as_ref().exists() {
                return Self::from_file(p);
            }
        }
        Ok(Self::from_env())
    }

    /// Validate cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.sync
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if self.channel.command_buffer == 0 {
            return Err(ConfigError::Invalid(
                "channel.command_buffer must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
