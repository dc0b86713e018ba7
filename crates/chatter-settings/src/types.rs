//! Settings sections.

use std::collections::BTreeMap;
use std::time::Duration;

use chatter_core::ErrorCodeStyle;
use serde::{Deserialize, Serialize};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatterSettings {
    /// Network and websocket transport.
    pub server: ServerSettings,
    /// Command dispatch and event delivery.
    pub dispatch: DispatchSettings,
    /// Recent-message buffer.
    pub cache: CacheSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

/// Network and websocket transport settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port (`0` picks a free port).
    pub port: u16,
    /// Largest accepted websocket message in bytes.
    pub max_message_size: usize,
    /// Outbound queue depth per connection.
    pub send_queue_size: usize,
    /// Interval between server pings in milliseconds.
    pub ping_interval_ms: u64,
    /// Silence after which a peer is dropped, in milliseconds.
    pub pong_timeout_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8888,
            max_message_size: 1024 * 1024,
            send_queue_size: 256,
            ping_interval_ms: 30_000,
            pong_timeout_ms: 60_000,
        }
    }
}

impl ServerSettings {
    /// Ping interval as a `Duration`.
    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    /// Pong timeout as a `Duration`.
    pub fn pong_timeout(&self) -> Duration {
        Duration::from_millis(self.pong_timeout_ms)
    }
}

/// Command dispatch settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DispatchSettings {
    /// Per-command execution deadline in milliseconds.
    pub command_timeout_ms: u64,
    /// Upper bound on a single write to a peer, in milliseconds.
    pub send_timeout_ms: u64,
    /// How error codes appear on the wire.
    pub error_codes: ErrorCodeStyle,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            command_timeout_ms: 30_000,
            send_timeout_ms: 5_000,
            error_codes: ErrorCodeStyle::Legacy,
        }
    }
}

impl DispatchSettings {
    /// Command deadline as a `Duration`.
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    /// Send deadline as a `Duration`.
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

/// Recent-message buffer settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheSettings {
    /// Entries kept per domain.
    pub capacity: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self { capacity: 200 }
    }
}

/// Log line format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Multi-line human-readable output.
    Pretty,
    /// Single-line human-readable output.
    Compact,
}

impl LogFormat {
    /// Parse a format name (case-insensitive).
    pub fn parse(val: &str) -> Option<Self> {
        match val.to_lowercase().as_str() {
            "json" => Some(Self::Json),
            "pretty" => Some(Self::Pretty),
            "compact" => Some(Self::Compact),
            _ => None,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level directive (`RUST_LOG` takes precedence).
    pub level: String,
    /// Line format.
    pub format: LogFormat,
    /// Per-module level overrides, e.g. `chatter_server = "debug"`.
    pub modules: BTreeMap<String, String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
            modules: BTreeMap::new(),
        }
    }
}
