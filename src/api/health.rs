use crate::api::AppState;
use axum::{extract::State, Json};
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    env: String,
    version: &'static str,
}

/// Health check endpoint - GET /v1/health
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        env: state.config.env.clone(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
pub struct DebugStatsResponse {
    version: &'static str,
    cache_enabled: bool,
    rate_limit_enabled: bool,
    rate_limit_max_requests: u32,
    rate_limit_window_secs: u64,
    tracked_clients: usize,
}

/// Operator stats - GET /v1/debug/stats (Basic auth)
pub async fn debug_stats_handler(State(state): State<AppState>) -> Json<DebugStatsResponse> {
    let limits = state.rate_limiter.config();

    Json(DebugStatsResponse {
        version: env!("CARGO_PKG_VERSION"),
        cache_enabled: state.identities.caching_enabled(),
        rate_limit_enabled: limits.enabled,
        rate_limit_max_requests: limits.max_requests,
        rate_limit_window_secs: limits.window.as_secs(),
        tracked_clients: state.rate_limiter.tracked_clients(),
    })
}
