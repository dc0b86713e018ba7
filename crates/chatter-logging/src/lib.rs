//! # chatter-logging
//!
//! Installs the global `tracing` subscriber: an `EnvFilter` built from
//! settings (overridden by `RUST_LOG`) feeding a JSON, pretty or compact
//! fmt layer on stdout.

#![deny(unsafe_code)]

use std::collections::BTreeMap;

use chatter_settings::{LogFormat, LoggingSettings};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Logging setup failures.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    /// A global subscriber was already installed.
    #[error("failed to install tracing subscriber: {0}")]
    Init(String),
}

/// Resolved logging configuration.
#[derive(Clone, Debug)]
pub struct LoggingConfig {
    /// Default level directive.
    pub level: String,
    /// Per-module overrides.
    pub modules: BTreeMap<String, String>,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::from(&LoggingSettings::default())
    }
}

impl From<&LoggingSettings> for LoggingConfig {
    fn from(settings: &LoggingSettings) -> Self {
        Self {
            level: settings.level.clone(),
            modules: settings.modules.clone(),
            format: settings.format,
        }
    }
}

impl LoggingConfig {
    /// Filter directive string, e.g. `info,chatter_server=debug`.
    pub fn directives(&self) -> String {
        let mut filter = self.level.to_lowercase();
        for (module, level) in &self.modules {
            filter.push(',');
            filter.push_str(module);
            filter.push('=');
            filter.push_str(&level.to_lowercase());
        }
        filter
    }
}

/// Build the env filter; `RUST_LOG` wins over the configured directives.
pub fn build_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.directives()))
}

/// Install the global subscriber. Call once at startup.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = build_filter(config);

    let json_layer = (config.format == LogFormat::Json).then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
    });
    let pretty_layer =
        (config.format == LogFormat::Pretty).then(|| tracing_subscriber::fmt::layer().pretty());
    let compact_layer =
        (config.format == LogFormat::Compact).then(|| tracing_subscriber::fmt::layer().compact());

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(pretty_layer)
        .with(compact_layer)
        .try_init()
        .map_err(|e| LoggingError::Init(e.to_string()))
}
