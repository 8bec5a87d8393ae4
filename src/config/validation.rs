//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (GPIO lines, ports, timeouts)
//! - Validate identity strings (device name, SSID)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: DeviceConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use crate::config::schema::DeviceConfig;

/// GPIO lines wired to the wireless module on the reference board.
const RESERVED_PINS: [u32; 3] = [23, 24, 25];
const MAX_GPIO: u32 = 28;
const MAX_TIMEOUT_SECS: u64 = 7 * 24 * 3600;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("relay.pin {0} is not a usable GPIO line")]
    InvalidPin(u32),
    #[error("{field} must be between 1 and {max} seconds, got {value}")]
    TimeoutOutOfRange {
        field: &'static str,
        value: u64,
        max: u64,
    },
    #[error("web_server.port must be non-zero")]
    InvalidPort,
    #[error("web_server.max_connections must be at least 1")]
    ZeroQueueCapacity,
    #[error("api.rate_limit must be at least 1")]
    ZeroRateLimit,
    #[error("system.device_name must be 1-50 characters of [A-Za-z0-9_-]")]
    InvalidDeviceName,
    #[error("wifi.ssid must be 1-32 printable ASCII characters")]
    InvalidSsid,
}

/// Validate a parsed configuration, collecting every violation.
pub fn validate_config(config: &DeviceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if !is_valid_pin(config.relay.pin) {
        errors.push(ValidationError::InvalidPin(config.relay.pin));
    }

    // Zero disables the relay timers, so only the upper bound applies there.
    for (field, value) in [
        ("relay.max_on_time", config.relay.max_on_time),
        ("relay.safety_timeout", config.relay.safety_timeout),
    ] {
        if value > MAX_TIMEOUT_SECS {
            errors.push(ValidationError::TimeoutOutOfRange {
                field,
                value,
                max: MAX_TIMEOUT_SECS,
            });
        }
    }

    let request_timeout = config.web_server.request_timeout;
    if request_timeout == 0 || request_timeout > MAX_TIMEOUT_SECS {
        errors.push(ValidationError::TimeoutOutOfRange {
            field: "web_server.request_timeout",
            value: request_timeout,
            max: MAX_TIMEOUT_SECS,
        });
    }

    if config.web_server.port == 0 {
        errors.push(ValidationError::InvalidPort);
    }
    if config.web_server.max_connections == 0 {
        errors.push(ValidationError::ZeroQueueCapacity);
    }
    if config.api.rate_limit == 0 {
        errors.push(ValidationError::ZeroRateLimit);
    }
    if !is_valid_device_name(&config.system.device_name) {
        errors.push(ValidationError::InvalidDeviceName);
    }
    if !is_valid_ssid(&config.wifi.ssid) {
        errors.push(ValidationError::InvalidSsid);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn is_valid_pin(pin: u32) -> bool {
    pin <= MAX_GPIO && !RESERVED_PINS.contains(&pin)
}

fn is_valid_device_name(name: &str) -> bool {
    (1..=50).contains(&name.len())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn is_valid_ssid(ssid: &str) -> bool {
    (1..=32).contains(&ssid.len()) && ssid.chars().all(|c| (' '..='~').contains(&c))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(validate_config(&DeviceConfig::default()), Ok(()));
    }

    #[test]
    fn reserved_and_out_of_range_pins_rejected() {
        assert!(is_valid_pin(0));
        assert!(is_valid_pin(22));
        assert!(!is_valid_pin(23));
        assert!(!is_valid_pin(25));
        assert!(is_valid_pin(28));
        assert!(!is_valid_pin(29));
    }

    #[test]
    fn collects_every_error() {
        let mut config = DeviceConfig::default();
        config.relay.pin = 24;
        config.web_server.port = 0;
        config.api.rate_limit = 0;
        config.system.device_name = "bad name!".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::InvalidPin(24)));
        assert!(errors.contains(&ValidationError::InvalidPort));
        assert!(errors.contains(&ValidationError::ZeroRateLimit));
        assert!(errors.contains(&ValidationError::InvalidDeviceName));
    }

    #[test]
    fn zero_disables_relay_timers() {
        let mut config = DeviceConfig::default();
        config.relay.safety_timeout = 0;
        config.relay.max_on_time = 0;
        assert!(validate_config(&config).is_ok());

        config.relay.max_on_time = MAX_TIMEOUT_SECS + 1;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn ssid_must_be_printable() {
        assert!(is_valid_ssid("home-net"));
        assert!(!is_valid_ssid(""));
        assert!(!is_valid_ssid("tab\there"));
        assert!(!is_valid_ssid(&"x".repeat(33)));
    }
}
