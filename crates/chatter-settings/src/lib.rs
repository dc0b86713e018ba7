//! # chatter-settings
//!
//! Layered configuration for the chatter hub.
//!
//! Settings are resolved from four layers (lowest to highest priority):
//! 1. **Compiled defaults**: [`ChatterSettings::default()`]
//! 2. **Settings file**: `~/.chatter/settings.json` or an explicit path
//! 3. **Environment**: `CHATTER_*` overrides
//! 4. **Command line**: applied by the binary after loading
//!
//! Settings are plain values handed to the server at startup; nothing here
//! is global, so tests can build isolated configurations.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path, validate};
pub use types::*;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
