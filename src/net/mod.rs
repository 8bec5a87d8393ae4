//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (polled accept, bounded wait)
//!     → connection.rs (id, peer, enqueue time)
//!     → queue.rs (bounded FIFO, full → fixed 503 and close)
//!     → Hand off to HTTP layer, one connection per loop iteration
//! ```

pub mod connection;
pub mod listener;
pub mod queue;

pub use connection::{ConnectionId, PendingConnection};
pub use listener::{Listener, ListenerError};
pub use queue::{ConnectionQueue, QueueFull};
