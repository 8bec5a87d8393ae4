//! Network-controlled relay with a hardened request pipeline.

// Core subsystems
pub mod config;
pub mod http;
pub mod net;
pub mod routing;

// Device
pub mod relay;

// Cross-cutting concerns
pub mod error;
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::schema::DeviceConfig;
pub use error::AppError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use relay::RelaySafetyController;
