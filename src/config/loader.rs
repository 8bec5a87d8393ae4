//! Configuration loading from disk.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use crate::config::schema::DeviceConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<DeviceConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Load configuration, falling back to defaults when the file does not exist.
///
/// A file that exists but fails to parse or validate is still an error.
pub fn load_or_default(path: &Path) -> Result<DeviceConfig, ConfigError> {
    match fs::read_to_string(path) {
        Ok(content) => parse_config(&content),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::warn!(path = %path.display(), "Config file not found, using defaults");
            let config = DeviceConfig::default();
            validate_config(&config).map_err(ConfigError::Validation)?;
            Ok(config)
        }
        Err(e) => Err(ConfigError::Io(e)),
    }
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<DeviceConfig, ConfigError> {
    let config: DeviceConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let path = std::env::temp_dir().join(format!("missing-{}.toml", uuid::Uuid::new_v4()));
        let config = load_or_default(&path).unwrap();
        assert_eq!(config.relay.pin, 18);
    }

    #[test]
    fn invalid_values_are_reported() {
        let err = parse_config("[relay]\npin = 99\n").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref e) if e.len() == 1));
        assert!(err.to_string().contains("relay.pin 99"));
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let err = parse_config("[relay\npin = ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn reads_file_from_disk() {
        let path = std::env::temp_dir().join(format!("relay-{}.toml", uuid::Uuid::new_v4()));
        fs::write(&path, "[api]\nrate_limit = 5\n").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.api.rate_limit, 5);

        fs::remove_file(&path).unwrap_or_default();
    }
}
