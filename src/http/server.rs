//! The cooperative serving loop.
//!
//! # Responsibilities
//! - Drain ready connections into the bounded queue, refusing overflow
//! - Serve exactly one queued connection per iteration
//! - Run the request pipeline: rate limit, route, authorize, gate, CSRF,
//!   dispatch
//! - Record per-request logs and metrics
//!
//! # Design Decisions
//! - One task, no worker pool: every store in the security gate is owned
//!   here and touched without locks
//! - Every wait is bounded (accept poll, read timeout, write timeout), so
//!   a silent client delays the loop by at most one read timeout
//! - Errors from any stage become a fixed response; nothing propagates

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::Instrument;

use crate::config::DeviceConfig;
use crate::error::AppError;
use crate::http::handlers::{self, HandlerContext, ServerCounters};
use crate::http::parser::{read_request, ParseError, ReadLimits};
use crate::http::request::{Method, Request};
use crate::http::response::Response;
use crate::lifecycle::shutdown;
use crate::net::{ConnectionQueue, Listener, ListenerError, PendingConnection, QueueFull};
use crate::observability::metrics;
use crate::relay::controller::RelaySafetyController;
use crate::routing::{Access, Router};
use crate::security::{csrf_token_from, SecurityGate};

/// Upper bound on writing a response to a slow reader.
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);


pub struct HttpServer {
    config: DeviceConfig,
    listener: Listener,
    queue: ConnectionQueue<PendingConnection>,
    security: SecurityGate,
    router: Router,
    relay: RelaySafetyController,
    limits: ReadLimits,
    counters: ServerCounters,
    /// Serialized once; written to connections the queue cannot hold.
    busy_reply: Vec<u8>,
}

impl HttpServer {
    /// Bind the listener and build the pipeline from `config`.
    pub async fn bind(config: DeviceConfig, relay: RelaySafetyController) -> Result<Self, ListenerError> {
        let listener = Listener::bind(&config.web_server).await?;
        Ok(Self {
            queue: ConnectionQueue::new(config.web_server.max_connections),
            security: SecurityGate::new(&config.web_server, &config.api),
            router: Router::new(config.api.enabled, config.api.enable_cors),
            limits: ReadLimits::from_config(&config.web_server),
            counters: ServerCounters::new(),
            busy_reply: AppError::QueueFull.into_response().to_bytes(true),
            listener,
            relay,
            config,
        })
    }

    /// Replace the security gate, e.g. with shorter lifetimes.
    pub fn with_security(mut self, security: SecurityGate) -> Self {
        self.security = security;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.listener.local_addr()
    }

    pub fn counters(&self) -> &ServerCounters {
        &self.counters
    }

    /// Serve until `shutdown` fires.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            address = ?self.listener.local_addr().ok(),
            queue_capacity = self.queue.capacity(),
            auth = self.security.auth_enabled(),
            "HTTP server starting"
        );

        while !shutdown::requested(&mut shutdown) {
            self.step().await;
        }

        let abandoned = self.queue.len();
        for mut conn in self.queue.drain() {
            reject(&mut conn, &self.busy_reply).await;
        }
        tracing::info!(abandoned, served = self.counters.request_count, "HTTP server stopped");
    }

    /// One loop iteration: accept what is ready, then serve one connection.
    pub async fn step(&mut self) {
        self.accept_ready().await;
        if let Some(conn) = self.queue.dequeue() {
            self.serve(conn).await;
        }
    }

    async fn accept_ready(&mut self) {
        // Only wait for a client when there is nothing else to do.
        let wait = if self.queue.is_empty() {
            self.listener.poll_interval()
        } else {
            Duration::ZERO
        };
        let budget = self.queue.capacity().max(1) * 2;

        let mut next = self.listener.try_accept(wait).await;
        let mut accepted = 0;
        while let Some(conn) = next {
            if let Err(QueueFull(mut conn)) = self.queue.enqueue(conn) {
                tracing::warn!(peer = %conn.peer, queued = self.queue.len(), "Connection queue full");
                metrics::record_queue_rejected();
                reject(&mut conn, &self.busy_reply).await;
            }
            accepted += 1;
            if accepted >= budget {
                break;
            }
            next = self.listener.try_accept(Duration::ZERO).await;
        }
    }

    async fn serve(&mut self, mut conn: PendingConnection) {
        let span = tracing::info_span!("request", conn = %conn.id, peer = %conn.peer);
        async {
            let started = Instant::now();
            tracing::debug!(queued_ms = conn.queued_for().as_millis() as u64, "Serving connection");

            let (method, response) = match read_request(&mut conn.stream, &self.limits).await {
                Ok(request) => {
                    let response = self.handle(&request, conn.peer.ip());
                    tracing::info!(
                        method = %request.method,
                        path = request.path(),
                        status = response.status.as_u16(),
                        "Request served"
                    );
                    (Some(request.method), response)
                }
                Err(ParseError::Timeout) => {
                    tracing::debug!("Client sent nothing, closing");
                    return;
                }
                Err(ParseError::ConnectionClosed) => return,
                Err(ParseError::Io(e)) => {
                    tracing::debug!(error = %e, "Read failed, closing");
                    return;
                }
                Err(e) => (None, self.reject_malformed(e, conn.peer.ip())),
            };

            let include_body = method != Some(Method::Head);
            let write = response.write_to(&mut conn.stream, include_body);
            match tokio::time::timeout(WRITE_TIMEOUT, write).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::debug!(error = %e, "Write failed"),
                Err(_) => tracing::debug!("Write timed out"),
            }
            let _ = conn.stream.shutdown().await;

            metrics::record_request(
                method.map(|m| m.as_str()).unwrap_or("INVALID"),
                response.status.as_u16(),
                started,
            );
        }
        .instrument(span)
        .await
    }

    fn reject_malformed(&mut self, err: ParseError, ip: IpAddr) -> Response {
        self.counters.record();
        if !self.security.check_rate_limit(ip) {
            return AppError::TooManyRequests.into_response();
        }
        tracing::info!(error = %err, "Malformed request");
        AppError::from(err).into_response()
    }

    /// Run the pipeline for one parsed request.
    pub fn handle(&mut self, request: &Request, ip: IpAddr) -> Response {
        self.counters.record();
        let is_api = request.path().starts_with("/api/");

        let response = match self.pipeline(request, ip) {
            Ok(response) => response,
            Err(err) if is_api => err.into_json_response(),
            Err(err) => err.into_response(),
        };

        if self.router.cors_enabled() && response.is_json() {
            response.with_header("Access-Control-Allow-Origin", "*")
        } else {
            response
        }
    }

    fn pipeline(&mut self, request: &Request, ip: IpAddr) -> Result<Response, AppError> {
        if !self.security.check_rate_limit(ip) {
            return Err(AppError::TooManyRequests);
        }

        let route = self.router.resolve(request.method, request.path())?;
        let verdict = self.security.authorize(request, ip);
        self.router
            .gate(route.access(), &verdict, self.security.auth_enabled())?;

        if route.access() == Access::ProtectedWithCsrf {
            let token = csrf_token_from(request);
            if !self.security.check_csrf(&verdict, token.as_deref()) {
                tracing::warn!(path = request.path(), "CSRF validation failed");
                return Err(AppError::Forbidden);
            }
        }

        let mut ctx = HandlerContext {
            config: &self.config,
            relay: &self.relay,
            security: &mut self.security,
            counters: &self.counters,
            verdict: &verdict,
            client_ip: ip,
        };
        handlers::dispatch(route, request, &mut ctx)
    }
}

/// Send the prebuilt 503 and close.
async fn reject(conn: &mut PendingConnection, reply: &[u8]) {
    let write = async {
        conn.stream.write_all(reply).await?;
        conn.stream.shutdown().await
    };
    if let Err(e) = tokio::time::timeout(WRITE_TIMEOUT, write)
        .await
        .unwrap_or_else(|_| Err(std::io::ErrorKind::TimedOut.into()))
    {
        tracing::debug!(peer = %conn.peer, error = %e, "Failed to send queue-full reply");
    }
}
