//! Settings loading.
//!
//! Loading flow (later layers win):
//! 1. Compiled [`HuddleSettings::default()`]
//! 2. The JSON settings file, if it exists
//! 3. `HUDDLE_*` environment variables, nested with `__`
//!    (`HUDDLE_SERVER__PORT=9000` sets `server.port`)

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized};
use tracing::debug;

use crate::errors::Result;
use crate::types::HuddleSettings;

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "HUDDLE_";

/// Resolve the default settings file (`~/.huddle/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".huddle").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<HuddleSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults plus env overrides. Invalid JSON, a value
/// of the wrong type, or a failed [`HuddleSettings::validate`] is an error.
pub fn load_settings_from_path(path: &Path) -> Result<HuddleSettings> {
    if path.exists() {
        debug!(?path, "loading settings from file");
    } else {
        debug!(?path, "settings file not found, using defaults");
    }

    let settings: HuddleSettings = figment(path).extract()?;
    settings.validate()?;
    Ok(settings)
}

/// The layered figment behind [`load_settings_from_path`].
pub fn figment(path: &Path) -> Figment {
    Figment::from(Serialized::defaults(HuddleSettings::default()))
        .merge(Json::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
}
