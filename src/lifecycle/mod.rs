//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     trigger → serving loop stops accepting → main forces relay OFF
//!             → statistics saved → exit
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
