//! HTTP error taxonomy.
//!
//! Every rejection the access-control pipeline can produce maps to exactly one
//! status code with a fixed message. Bodies never say whether a token was
//! missing, malformed or expired, nor whether an identity exists.

use crate::auth::identity::ResolveError;
use crate::store::StoreError;
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::time::Duration;

#[derive(Debug)]
pub enum ApiError {
    /// Absent/invalid credential or unknown identity, deliberately conflated.
    Unauthorized,
    /// Operator route rejection; adds a `WWW-Authenticate: Basic` challenge.
    BasicUnauthorized,
    /// Known caller without ownership or sufficient role.
    Forbidden,
    RateLimited { retry_after: Duration },
    /// Cache, store or other backing-service failure.
    Internal(anyhow::Error),
    NotFound,
    BadRequest(String),
    Conflict(String),
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ApiError::NotFound,
            StoreError::DuplicateEmail | StoreError::DuplicateUsername => {
                ApiError::Conflict(err.to_string())
            }
            other => ApiError::Internal(other.into()),
        }
    }
}

impl From<ResolveError> for ApiError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::NotFound => ApiError::Unauthorized,
            other => ApiError::Internal(other.into()),
        }
    }
}

/// Seconds for the `Retry-After` header, rounded up and never zero.
pub fn retry_after_secs(retry_after: Duration) -> u64 {
    let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
    secs.max(1)
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::RateLimited { retry_after } => {
                let secs = retry_after_secs(retry_after);
                let body = json!({
                    "error": "rate limit exceeded",
                    "retry_after_seconds": secs,
                });
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    [(header::RETRY_AFTER, secs.to_string())],
                    Json(body),
                )
                    .into_response()
            }
            ApiError::BasicUnauthorized => {
                let mut response = error_body(StatusCode::UNAUTHORIZED, "unauthorized");
                response.headers_mut().insert(
                    header::WWW_AUTHENTICATE,
                    HeaderValue::from_static(r#"Basic realm="restricted", charset="UTF-8""#),
                );
                response
            }
            ApiError::Unauthorized => error_body(StatusCode::UNAUTHORIZED, "unauthorized"),
            ApiError::Forbidden => error_body(StatusCode::FORBIDDEN, "forbidden"),
            ApiError::Internal(err) => {
                tracing::error!(error = %format!("{:#}", err), "Internal server error");
                error_body(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "the server encountered a problem",
                )
            }
            ApiError::NotFound => error_body(StatusCode::NOT_FOUND, "not found"),
            ApiError::BadRequest(msg) => error_body(StatusCode::BAD_REQUEST, &msg),
            ApiError::Conflict(msg) => error_body(StatusCode::CONFLICT, &msg),
        }
    }
}

fn error_body(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
