//! Relay subsystem.
//!
//! # Data Flow
//! ```text
//! Handler command / timer expiry / shutdown
//!     → controller.rs (guard, single lock, edge bookkeeping)
//!     → pin.rs (line write; failure leaves state untouched)
//!     → stats.rs (JSON snapshot after every OFF edge)
//! ```

pub mod controller;
pub mod pin;
pub mod stats;

pub use controller::{RelayError, RelaySafetyController, RelayStatus, Trigger};
pub use pin::{MockPin, PinLevel, RelayPin, SysfsPin};
pub use stats::{RelayStatistics, StatsStore};
