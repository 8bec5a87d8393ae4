//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the device.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the relay device.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct DeviceConfig {
    /// Network association settings (consumed by the network collaborator).
    pub wifi: WifiConfig,

    /// Relay hardware and safety settings.
    pub relay: RelayConfig,

    /// HTTP listener, pipeline limits and authentication.
    pub web_server: WebServerConfig,

    /// API switches and rate limiting.
    pub api: ApiConfig,

    /// Device identity and log level.
    pub system: SystemConfig,

    /// Log output format and metrics exporter.
    pub observability: ObservabilityConfig,
}

/// Wireless network settings.
///
/// Association and reconnection live outside this crate; the values are
/// carried so a single config file describes the whole device.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WifiConfig {
    pub ssid: String,
    pub password: String,
    pub max_connect_attempts: u32,
    /// Seconds between reconnect attempts.
    pub reconnect_delay: u64,
    /// Seconds to wait for association.
    pub connection_timeout: u64,
}

impl Default for WifiConfig {
    fn default() -> Self {
        Self {
            ssid: "YOUR_WIFI_SSID".to_string(),
            password: "YOUR_WIFI_PASSWORD".to_string(),
            max_connect_attempts: 10,
            reconnect_delay: 5,
            connection_timeout: 30,
        }
    }
}

/// Which GPIO driver backs the relay pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PinDriver {
    /// In-memory pin, for development hosts and tests.
    Mock,
    /// Linux sysfs GPIO (`/sys/class/gpio`).
    Sysfs,
}

/// Relay hardware and safety configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RelayConfig {
    /// GPIO line driving the relay module.
    pub pin: u32,

    /// True when a LOW level energizes the relay.
    pub active_low: bool,

    /// State applied (forced) at startup.
    pub initial_state: bool,

    /// Hard cap on continuous ON time in seconds (0 disables).
    pub max_on_time: u64,

    /// Safety auto-off in seconds (0 disables).
    pub safety_timeout: u64,

    pub driver: PinDriver,

    /// Root of the sysfs GPIO tree, only used by the sysfs driver.
    pub gpio_root: String,

    /// Statistics snapshot file. Empty disables persistence.
    pub stats_path: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            pin: 18,
            active_low: true,
            initial_state: false,
            max_on_time: 86_400,
            safety_timeout: 300,
            driver: PinDriver::Mock,
            gpio_root: "/sys/class/gpio".to_string(),
            stats_path: "relay_stats.json".to_string(),
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WebServerConfig {
    /// Interface to bind (port is separate).
    pub bind_address: String,

    pub port: u16,

    /// Capacity of the pending-connection queue.
    pub max_connections: usize,

    /// Per-read socket timeout in seconds.
    pub request_timeout: u64,

    /// How many consecutive read timeouts a request may accumulate.
    pub read_timeout_retries: u32,

    /// Poll interval of the accept step in milliseconds.
    pub accept_poll_ms: u64,

    pub max_header_bytes: usize,
    pub max_body_bytes: usize,

    pub enable_auth: bool,
    pub auth_username: String,
    pub auth_password: String,
}

impl Default for WebServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 80,
            max_connections: 5,
            request_timeout: 10,
            read_timeout_retries: 1,
            accept_poll_ms: 100,
            max_header_bytes: 8 * 1024,
            max_body_bytes: 16 * 1024,
            enable_auth: false,
            // WARNING: This is a placeholder! Change this on the device.
            auth_username: "admin".to_string(),
            auth_password: "password123".to_string(),
        }
    }
}

impl WebServerConfig {
    /// `host:port` string for the listener.
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

/// API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    /// When false every `/api/*` path answers 404.
    pub enabled: bool,

    /// Requests per client IP per 60 second window.
    pub rate_limit: usize,

    /// Add `Access-Control-Allow-Origin: *` to JSON responses.
    pub enable_cors: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rate_limit: 60,
            enable_cors: true,
        }
    }
}

/// Device identity.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SystemConfig {
    pub device_name: String,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            device_name: "Pico-W-Relay".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_format: LogFormat,

    /// Enable the Prometheus scrape endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
