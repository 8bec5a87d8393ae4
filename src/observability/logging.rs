//! Structured logging.
//!
//! # Responsibilities
//! - Install the global `tracing` subscriber once at startup
//! - Pick the level filter (`RUST_LOG` wins over `system.log_level`)
//! - Pick the output format (pretty for a console, JSON for collectors)
//!
//! # Design Decisions
//! - Context flows through spans, never through a global logger object
//! - Installing twice is an error returned to the caller, not a panic

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::schema::{LogFormat, ObservabilityConfig, SystemConfig};

/// Install the global subscriber.
pub fn init(system: &SystemConfig, observability: &ObservabilityConfig) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(&system.log_level)));

    match observability.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_target(false))
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .try_init(),
    }
}

/// Filter directive for a configured level name.
///
/// Unknown names fall back to `info` so a typo never silences the device.
fn default_directive(level: &str) -> String {
    let level = level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" | "off" => {
            format!("relay_gate={level},{level}")
        }
        "warning" => "relay_gate=warn,warn".to_string(),
        _ => "relay_gate=info,info".to_string(),
    }
}
