//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`ChatterSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over defaults
//! 3. Apply `CHATTER_*` environment overrides (highest priority)
//! 4. Validate

use std::path::{Path, PathBuf};

use chatter_core::ErrorCodeStyle;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::{ChatterSettings, LogFormat};

/// Resolve the default settings file (`~/.chatter/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".chatter").join("settings.json")
}

/// Load settings from the default path with env overrides.
pub fn load_settings() -> Result<ChatterSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env overrides.
///
/// A missing file yields defaults. Invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<ChatterSettings> {
    let mut settings = read_file_layer(path)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

/// Defaults merged with the file at `path`, without env overrides.
pub fn read_file_layer(path: &Path) -> Result<ChatterSettings> {
    let defaults = serde_json::to_value(ChatterSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `CHATTER_*` process environment overrides.
pub fn apply_env_overrides(settings: &mut ChatterSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// Invalid values are ignored with a warning and leave the prior value.
pub fn apply_overrides_from(
    settings: &mut ChatterSettings,
    lookup: impl Fn(&str) -> Option<String>,
) {
    let read = |name: &str| lookup(name).filter(|v| !v.is_empty());

    if let Some(v) = read("CHATTER_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read("CHATTER_PORT") {
        if let Some(n) = checked(&v, "CHATTER_PORT", parse_u16_range(&v, 0, 65535)) {
            settings.server.port = n;
        }
    }
    if let Some(v) = read("CHATTER_CACHE_SIZE") {
        if let Some(n) = checked(&v, "CHATTER_CACHE_SIZE", parse_usize_range(&v, 1, 1_000_000)) {
            settings.cache.capacity = n;
        }
    }
    if let Some(v) = read("CHATTER_COMMAND_TIMEOUT_MS") {
        let parsed = parse_u64_range(&v, 1, 3_600_000);
        if let Some(n) = checked(&v, "CHATTER_COMMAND_TIMEOUT_MS", parsed) {
            settings.dispatch.command_timeout_ms = n;
        }
    }
    if let Some(v) = read("CHATTER_SEND_TIMEOUT_MS") {
        if let Some(n) = checked(&v, "CHATTER_SEND_TIMEOUT_MS", parse_u64_range(&v, 1, 600_000)) {
            settings.dispatch.send_timeout_ms = n;
        }
    }
    if let Some(v) = read("CHATTER_ERROR_CODES") {
        let parsed = serde_json::from_value::<ErrorCodeStyle>(Value::String(v.to_lowercase())).ok();
        if let Some(style) = checked(&v, "CHATTER_ERROR_CODES", parsed) {
            settings.dispatch.error_codes = style;
        }
    }
    if let Some(v) = read("CHATTER_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read("CHATTER_LOG_FORMAT") {
        if let Some(format) = checked(&v, "CHATTER_LOG_FORMAT", LogFormat::parse(&v)) {
            settings.logging.format = format;
        }
    }
}

/// Reject combinations the server cannot run with.
pub fn validate(settings: &ChatterSettings) -> Result<()> {
    if settings.cache.capacity == 0 {
        return Err(SettingsError::InvalidValue(
            "cache.capacity must be at least 1".into(),
        ));
    }
    if settings.server.send_queue_size == 0 {
        return Err(SettingsError::InvalidValue(
            "server.sendQueueSize must be at least 1".into(),
        ));
    }
    if settings.dispatch.command_timeout_ms == 0 || settings.dispatch.send_timeout_ms == 0 {
        return Err(SettingsError::InvalidValue(
            "dispatch timeouts must be non-zero".into(),
        ));
    }
    if settings.server.ping_interval_ms == 0 {
        return Err(SettingsError::InvalidValue(
            "server.pingIntervalMs must be non-zero".into(),
        ));
    }
    Ok(())
}

fn checked<T>(raw: &str, key: &str, parsed: Option<T>) -> Option<T> {
    if parsed.is_none() {
        warn!(key, value = %raw, "invalid env override, ignoring");
    }
    parsed
}

// ── Pure parsing functions ──────────────────────────────────────────

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
