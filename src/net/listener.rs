//! TCP listener with a polled, non-blocking accept.
//!
//! # Responsibilities
//! - Bind to the configured address
//! - Accept at most one connection per call, waiting no longer than the
//!   given poll interval
//! - Log and swallow transient accept errors

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;

use crate::config::WebServerConfig;
use crate::net::connection::PendingConnection;

/// Error type for listener operations.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("invalid listen address {address}: {reason}")]
    Address { address: String, reason: String },
    #[error("failed to bind: {0}")]
    Bind(#[source] std::io::Error),
}

#[derive(Debug)]
pub struct Listener {
    inner: TcpListener,
    poll_interval: Duration,
}

impl Listener {
    /// Bind to `web_server.bind_address:port`.
    pub async fn bind(config: &WebServerConfig) -> Result<Self, ListenerError> {
        let address = config.listen_address();
        let addr: SocketAddr = address.parse().map_err(|e: std::net::AddrParseError| {
            ListenerError::Address {
                address: address.clone(),
                reason: e.to_string(),
            }
        })?;

        let inner = TcpListener::bind(addr).await.map_err(ListenerError::Bind)?;
        let local_addr = inner.local_addr().map_err(ListenerError::Bind)?;

        tracing::info!(
            address = %local_addr,
            max_connections = config.max_connections,
            "Listener bound"
        );

        Ok(Self {
            inner,
            poll_interval: Duration::from_millis(config.accept_poll_ms),
        })
    }

    /// Accept one connection if one arrives within the configured poll interval.
    pub async fn accept_if_ready(&self) -> Option<PendingConnection> {
        self.try_accept(self.poll_interval).await
    }

    /// Accept one connection if one arrives within `wait`.
    ///
    /// A zero `wait` polls the socket exactly once.
    pub async fn try_accept(&self, wait: Duration) -> Option<PendingConnection> {
        match tokio::time::timeout(wait, self.inner.accept()).await {
            Ok(Ok((stream, peer))) => {
                tracing::debug!(peer_addr = %peer, "Connection accepted");
                Some(PendingConnection::new(stream, peer))
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Accept failed");
                None
            }
            Err(_) => None,
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.inner.local_addr()
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}
