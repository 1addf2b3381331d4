//! Settings type definitions.
//!
//! Every section is `#[serde(default)]`, so a settings file may name only the
//! fields it wants to change. Field names are snake_case so that nested
//! environment keys (`HUDDLE_SERVER__PORT`) map onto them directly.

use huddle_core::LogFormat;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HuddleSettings {
    /// Network and connection settings.
    pub server: ServerSettings,
    /// Log output settings.
    pub logging: LoggingSettings,
}

/// Network and connection settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` picks a free port).
    pub port: u16,
    /// Live sessions allowed across all rooms before upgrades are refused.
    pub max_connections: usize,
    /// Outbound frames buffered per session before it counts as lagging.
    pub send_queue_capacity: usize,
    /// Seconds between server pings.
    pub heartbeat_interval_secs: u64,
    /// Seconds without any inbound activity before a session is closed.
    pub heartbeat_timeout_secs: u64,
    /// Largest accepted inbound WebSocket message, in bytes.
    pub max_message_size: usize,
    /// Seconds to wait for sessions to drain on shutdown.
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8000,
            max_connections: 1024,
            send_queue_capacity: 64,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            max_message_size: 64 * 1024,
            shutdown_timeout_secs: 10,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter directive; `RUST_LOG` wins when set.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Compact,
        }
    }
}

impl HuddleSettings {
    /// Reject combinations the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        let s = &self.server;
        if s.send_queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "server.send_queue_capacity must be at least 1".into(),
            ));
        }
        if s.heartbeat_interval_secs == 0 {
            return Err(SettingsError::InvalidValue(
                "server.heartbeat_interval_secs must be at least 1".into(),
            ));
        }
        if s.heartbeat_timeout_secs < s.heartbeat_interval_secs {
            return Err(SettingsError::InvalidValue(format!(
                "server.heartbeat_timeout_secs ({}) is shorter than heartbeat_interval_secs ({})",
                s.heartbeat_timeout_secs, s.heartbeat_interval_secs
            )));
        }
        if s.max_message_size == 0 {
            return Err(SettingsError::InvalidValue(
                "server.max_message_size must be at least 1".into(),
            ));
        }
        if self.logging.level.trim().is_empty() {
            return Err(SettingsError::InvalidValue("logging.level is empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = HuddleSettings::default();
        settings.validate().unwrap();
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 8000);
        assert_eq!(settings.server.send_queue_capacity, 64);
        assert_eq!(settings.server.heartbeat_interval_secs, 30);
        assert_eq!(settings.server.heartbeat_timeout_secs, 90);
        assert_eq!(settings.logging.level, "info");
        assert_eq!(settings.logging.format, LogFormat::Compact);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let settings: HuddleSettings =
            serde_json::from_str(r#"{"server":{"port":9100}}"#).unwrap();
        assert_eq!(settings.server.port, 9100);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.logging, LoggingSettings::default());
    }

    #[test]
    fn zero_queue_is_invalid() {
        let mut settings = HuddleSettings::default();
        settings.server.send_queue_capacity = 0;
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("send_queue_capacity"));
    }

    #[test]
    fn timeout_shorter_than_interval_is_invalid() {
        let mut settings = HuddleSettings::default();
        settings.server.heartbeat_interval_secs = 30;
        settings.server.heartbeat_timeout_secs = 10;
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("heartbeat_timeout_secs (10)"));
    }

    #[test]
    fn zero_interval_is_invalid() {
        let mut settings = HuddleSettings::default();
        settings.server.heartbeat_interval_secs = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn zero_message_size_is_invalid() {
        let mut settings = HuddleSettings::default();
        settings.server.max_message_size = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn blank_level_is_invalid() {
        let mut settings = HuddleSettings::default();
        settings.logging.level = "  ".into();
        assert!(settings.validate().is_err());
    }
}
