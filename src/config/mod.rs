//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize, defaults when absent)
//!     → validation.rs (semantic checks)
//!     → DeviceConfig (validated, immutable)
//!     → sections handed to each subsystem at construction
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::ApiConfig;
pub use schema::DeviceConfig;
pub use schema::ObservabilityConfig;
pub use schema::SystemConfig;
pub use schema::PinDriver;
pub use schema::RelayConfig;
pub use schema::WebServerConfig;
