//! Rate limiting middleware.
//!
//! In-memory fixed-window admission control per client IP address.

use crate::api::errors::ApiError;
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

/// Configuration for rate limiting.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// When false the limiter is bypassed entirely.
    pub enabled: bool,
    /// Maximum requests per window.
    pub max_requests: u32,
    /// Window duration.
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: 20,
            window: Duration::from_secs(5),
        }
    }
}

/// Rate limiter state tracking requests per IP.
#[derive(Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    state: Arc<Mutex<HashMap<IpAddr, RateLimitEntry>>>,
}

struct RateLimitEntry {
    count: u32,
    window_start: Instant,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Admission decision for `client`. When rejected, the duration is how long
    /// until the client's window rolls over.
    pub fn allow(&self, client: IpAddr) -> (bool, Duration) {
        self.allow_at(client, Instant::now())
    }

    fn allow_at(&self, client: IpAddr, now: Instant) -> (bool, Duration) {
        if !self.config.enabled {
            return (true, Duration::ZERO);
        }

        // Read, roll over and increment under one lock.
        let mut state = self.state.lock();
        let entry = state.entry(client).or_insert(RateLimitEntry {
            count: 0,
            window_start: now,
        });

        if now.saturating_duration_since(entry.window_start) >= self.config.window {
            entry.count = 0;
            entry.window_start = now;
        }

        if entry.count >= self.config.max_requests {
            let reset_at = entry.window_start + self.config.window;
            return (false, reset_at.saturating_duration_since(now));
        }

        entry.count += 1;
        (true, Duration::ZERO)
    }

    /// Evict clients whose window has fully elapsed (call from a background task).
    pub fn cleanup(&self) {
        let mut state = self.state.lock();
        let now = Instant::now();
        let window = self.config.window;

        state.retain(|_, entry| now.saturating_duration_since(entry.window_start) < window);
    }

    pub fn tracked_clients(&self) -> usize {
        self.state.lock().len()
    }
}

/// Client key for a request; requests without a peer address share one bucket.
pub fn client_ip(request: &Request<Body>) -> IpAddr {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

/// Rate limiting middleware function.
pub async fn rate_limit_middleware(
    State(limiter): State<RateLimiter>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let ip = client_ip(&request);

    match limiter.allow(ip) {
        (true, _) => next.run(request).await,
        (false, retry_after) => {
            warn!(
                ip = %ip,
                retry_after_ms = retry_after.as_millis() as u64,
                "Rate limit exceeded"
            );
            ApiError::RateLimited { retry_after }.into_response()
        }
    }
}
