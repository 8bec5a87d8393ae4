//! Sliding-window rate limiting per client IP.
//!
//! Each client keeps the timestamps of its admitted requests. A bucket is
//! swept only when that client is seen again; the whole table is swept
//! when it grows past [`MAX_TRACKED_CLIENTS`].

use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::time::Duration;

use tokio::time::Instant;

use crate::observability::metrics;

/// Length of the trailing window.
pub const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

/// Table size that triggers a full sweep of idle clients.
pub const MAX_TRACKED_CLIENTS: usize = 256;

/// Per-IP sliding window limiter.
#[derive(Debug)]
pub struct RateLimiter {
    buckets: HashMap<IpAddr, VecDeque<Instant>>,
    window: Duration,
    max_requests: usize,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            buckets: HashMap::new(),
            window,
            max_requests,
        }
    }

    /// Admit or reject one request from `ip`.
    pub fn check(&mut self, ip: IpAddr) -> bool {
        self.check_at(ip, Instant::now())
    }

    fn check_at(&mut self, ip: IpAddr, now: Instant) -> bool {
        if self.buckets.len() >= MAX_TRACKED_CLIENTS && !self.buckets.contains_key(&ip) {
            self.sweep(now);
        }

        let window = self.window;
        let bucket = self.buckets.entry(ip).or_default();
        while let Some(oldest) = bucket.front() {
            if now.duration_since(*oldest) > window {
                bucket.pop_front();
            } else {
                break;
            }
        }

        if bucket.len() >= self.max_requests {
            tracing::warn!(client = %ip, limit = self.max_requests, "Rate limit exceeded");
            metrics::record_rate_limited();
            return false;
        }

        bucket.push_back(now);
        true
    }

    /// Drop every timestamp outside the window and every empty bucket.
    pub fn sweep(&mut self, now: Instant) {
        let window = self.window;
        self.buckets.retain(|_, bucket| {
            bucket.retain(|t| now.duration_since(*t) <= window);
            !bucket.is_empty()
        });
    }

    /// Admitted requests currently counted for `ip`.
    pub fn in_window(&self, ip: &IpAddr) -> usize {
        self.buckets.get(ip).map_or(0, VecDeque::len)
    }

    pub fn tracked_clients(&self) -> usize {
        self.buckets.len()
    }
}
