//! Accepted connections awaiting service.
//!
//! # Responsibilities
//! - Generate unique connection IDs for log spans
//! - Carry the socket, peer address and enqueue time through the queue

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::net::TcpStream;
use tokio::time::Instant;

/// Relaxed ordering is enough: ids only need to be unique.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// An accepted connection that has not been served yet.
#[derive(Debug)]
pub struct PendingConnection {
    pub id: ConnectionId,
    pub stream: TcpStream,
    pub peer: SocketAddr,
    pub enqueued_at: Instant,
}

impl PendingConnection {
    pub fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            id: ConnectionId::new(),
            stream,
            peer,
            enqueued_at: Instant::now(),
        }
    }

    /// How long the connection sat in the queue.
    pub fn queued_for(&self) -> std::time::Duration {
        self.enqueued_at.elapsed()
    }
}
