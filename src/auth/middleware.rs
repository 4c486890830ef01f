//! Authentication Middleware
//! Mission: Protect API endpoints with JWT validation and identity resolution

use crate::api::{errors::ApiError, AppState};
use crate::auth::models::User;
use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};

/// The authenticated caller, attached by [`auth_middleware`] and extracted by
/// handlers as a typed parameter.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or(ApiError::Unauthorized)
    }
}

/// Extract `<token>` from `Authorization: Bearer <token>`.
///
/// The header must be exactly two space-separated parts, the first being the
/// literal `Bearer`.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let mut parts = value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) if !token.is_empty() => Some(token),
        _ => None,
    }
}

/// Bearer authentication: validate the token, resolve the subject through the
/// identity cache, attach the identity, then run the handler.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(req.headers()).ok_or_else(|| {
        debug!("Missing or malformed bearer authorization header");
        ApiError::Unauthorized
    })?;

    let claims = state.jwt.validate_token(token).map_err(|err| {
        debug!(reason = %err, "Rejected bearer token");
        ApiError::Unauthorized
    })?;

    let user_id: i64 = claims.sub.parse().map_err(|_| {
        warn!("Token subject is not a numeric user id");
        ApiError::Unauthorized
    })?;

    // Unknown identity is a 401; cache/store outages are a 500.
    let user = state.identities.resolve(user_id).await?;

    req.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(req).await)
}
