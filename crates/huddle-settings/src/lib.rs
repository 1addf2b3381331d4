//! # huddle-settings
//!
//! Configuration with layered sources for the huddle hub.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`HuddleSettings::default()`]
//! 2. **User file**: `~/.huddle/settings.json`, or a path given on the CLI
//! 3. **Environment variables**: `HUDDLE_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{load_settings, load_settings_from_path, settings_path};
pub use types::{HuddleSettings, LoggingSettings, ServerSettings};
