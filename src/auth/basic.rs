//! Operator Basic Authentication
//! Mission: Gate internal routes behind the statically configured operator identity

use crate::api::{errors::ApiError, AppState};
use crate::config::BasicAuthConfig;
use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use tracing::warn;

/// Check `Authorization: Basic <base64(user:pass)>` against the operator identity.
pub fn check_basic_credentials(headers: &HeaderMap, operator: &BasicAuthConfig) -> bool {
    let Some(value) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) else {
        return false;
    };

    let parts: Vec<&str> = value.split(' ').collect();
    if parts.len() != 2 || parts[0] != "Basic" {
        return false;
    }

    let Ok(decoded) = BASE64.decode(parts[1]) else {
        return false;
    };
    let Ok(decoded) = String::from_utf8(decoded) else {
        return false;
    };

    match decoded.split_once(':') {
        Some((user, pass)) => user == operator.user && pass == operator.pass,
        None => false,
    }
}

pub async fn basic_auth_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !check_basic_credentials(req.headers(), &state.config.auth.basic) {
        warn!(path = %req.uri().path(), "Rejected operator credentials");
        return Err(ApiError::BasicUnauthorized);
    }

    Ok(next.run(req).await)
}
