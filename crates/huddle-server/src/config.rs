//! Server configuration.

use std::time::Duration;

use huddle_settings::ServerSettings;

/// Runtime configuration for the hub server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Live WebSocket sessions allowed before upgrades are refused.
    pub max_connections: usize,
    /// Outbound frames buffered per session before it counts as lagging.
    pub send_queue_capacity: usize,
    /// Interval between server pings.
    pub heartbeat_interval: Duration,
    /// Inactivity after which a session is closed.
    pub heartbeat_timeout: Duration,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// How long shutdown waits for sessions and tasks to drain.
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections: 1024,
            send_queue_capacity: 64,
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(90),
            max_message_size: 64 * 1024,
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(s: &ServerSettings) -> Self {
        Self {
            host: s.host.clone(),
            port: s.port,
            max_connections: s.max_connections,
            send_queue_capacity: s.send_queue_capacity,
            heartbeat_interval: Duration::from_secs(s.heartbeat_interval_secs),
            heartbeat_timeout: Duration::from_secs(s.heartbeat_timeout_secs),
            max_message_size: s.max_message_size,
            shutdown_timeout: Duration::from_secs(s.shutdown_timeout_secs),
        }
    }
}

impl ServerConfig {
    /// `host:port` string for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_host() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.host, "127.0.0.1");
    }

    #[test]
    fn default_port_is_zero() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.port, 0);
    }

    #[test]
    fn default_heartbeat() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(cfg.heartbeat_timeout, Duration::from_secs(90));
    }

    #[test]
    fn bind_addr_joins_host_and_port() {
        let cfg = ServerConfig {
            host: "0.0.0.0".into(),
            port: 8080,
            ..ServerConfig::default()
        };
        assert_eq!(cfg.bind_addr(), "0.0.0.0:8080");
    }

    #[test]
    fn from_settings_converts_seconds() {
        let settings = ServerSettings {
            port: 9000,
            heartbeat_interval_secs: 15,
            heartbeat_timeout_secs: 45,
            shutdown_timeout_secs: 3,
            send_queue_capacity: 7,
            ..ServerSettings::default()
        };
        let cfg = ServerConfig::from(&settings);
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.heartbeat_interval, Duration::from_secs(15));
        assert_eq!(cfg.heartbeat_timeout, Duration::from_secs(45));
        assert_eq!(cfg.shutdown_timeout, Duration::from_secs(3));
        assert_eq!(cfg.send_queue_capacity, 7);
        assert_eq!(cfg.host, settings.host);
    }
}
