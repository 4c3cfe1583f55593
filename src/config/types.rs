//! Configuration Types

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub console: ConsoleConfig,
    pub monitoring: MonitoringConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Silence after which a peer is evicted
    #[serde(with = "humantime_serde")]
    pub keepalive_timeout: Duration,
    /// Cadence of the timeout sweep
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
    /// Capacity of each peer's receive buffer
    pub buffer_size: usize,
}

/// Operator console configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub enabled: bool,
    pub render_queue_capacity: usize,
}

/// Monitoring configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub log_level: String,
    pub status_api_enabled: bool,
    pub status_api_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 1337)),
            keepalive_timeout: Duration::from_millis(10_000),
            sweep_interval: Duration::from_millis(250),
            buffer_size: 1024,
        }
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            render_queue_capacity: 64,
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            status_api_enabled: false,
            status_api_addr: SocketAddr::from(([127, 0, 0, 1], 9337)),
        }
    }
}

impl Config {
    /// Configuration listening on `bind_addr` with the given keep-alive timeout.
    /// The sweep interval is capped at the timeout; everything else is default.
    pub fn with_timeout(bind_addr: SocketAddr, keepalive_timeout: Duration) -> Self {
        let mut config = Self::default();
        config.server.bind_addr = bind_addr;
        config.server.keepalive_timeout = keepalive_timeout;
        config.server.sweep_interval = config.server.sweep_interval.min(keepalive_timeout);
        config
    }
}
