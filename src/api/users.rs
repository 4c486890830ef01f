//! User API Endpoints
//! Mission: Read identities for authenticated callers and redeem activations

use crate::api::{errors::ApiError, AppState};
use crate::auth::{models::UserResponse, CurrentUser, ResolveError};
use crate::store::hash_invitation_token;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::{debug, info};

/// Fetch a user - GET /v1/users/:id
///
/// Goes through the same cache-aside resolver as the auth step, so a hot
/// profile is served without touching the store.
pub async fn get_user_handler(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<UserResponse>, ApiError> {
    debug!(caller_id = caller.id, user_id = id, "User lookup");

    match state.identities.resolve(id).await {
        Ok(user) => Ok(Json(UserResponse::from_user(&user))),
        // The caller is already authenticated here, so a miss is a plain 404.
        Err(ResolveError::NotFound) => Err(ApiError::NotFound),
        Err(other) => Err(other.into()),
    }
}

/// Redeem an invitation - PUT /v1/users/activate/:token
pub async fn activate_user_handler(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .store
        .users
        .activate(&hash_invitation_token(&token))
        .await?;

    info!("✅ User activated");
    Ok(StatusCode::NO_CONTENT)
}
