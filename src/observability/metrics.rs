//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_http_requests_total` (counter): requests by method, status
//! - `relay_http_request_duration_seconds` (histogram): time from dequeue to reply
//! - `relay_rate_limited_total` (counter): requests refused by the rate limiter
//! - `relay_queue_rejected_total` (counter): connections refused with a full queue
//! - `relay_transitions_total` (counter): relay edges by cause
//! - `relay_state` (gauge): 1 while the relay is on
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   exporter every call is a no-op
//! - The Prometheus listener is opt-in because the device is usually
//!   scraped by nobody

use std::net::SocketAddr;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use tokio::time::Instant;

/// Start the Prometheus scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

/// Record one answered request.
pub fn record_request(method: &str, status: u16, started: Instant) {
    counter!(
        "relay_http_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("relay_http_request_duration_seconds").record(started.elapsed().as_secs_f64());
}

pub fn record_rate_limited() {
    counter!("relay_rate_limited_total").increment(1);
}

pub fn record_queue_rejected() {
    counter!("relay_queue_rejected_total").increment(1);
}

/// Record a relay edge and the resulting state.
pub fn record_relay_transition(cause: &'static str, on: bool) {
    counter!("relay_transitions_total", "cause" => cause).increment(1);
    gauge!("relay_state").set(if on { 1.0 } else { 0.0 });
}
