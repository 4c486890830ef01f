//! Post API Endpoints
//! Mission: Owner-scoped content, with role precedence as the override

use crate::api::{errors::ApiError, AppState};
use crate::auth::{models::User, CurrentUser};
use crate::store::{Post, PostUpdate};
use anyhow::anyhow;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::{info, warn};

const MAX_TITLE_LEN: usize = 100;
const MAX_CONTENT_LEN: usize = 1000;

/// Least role that may edit someone else's post.
const UPDATE_ROLE: &str = "moderator";
/// Least role that may delete someone else's post.
const DELETE_ROLE: &str = "admin";

#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn validate_title(title: &str) -> Result<(), ApiError> {
    if title.trim().is_empty() || title.chars().count() > MAX_TITLE_LEN {
        return Err(ApiError::BadRequest(format!(
            "title must be 1-{MAX_TITLE_LEN} characters"
        )));
    }
    Ok(())
}

fn validate_content(content: &str) -> Result<(), ApiError> {
    if content.trim().is_empty() || content.chars().count() > MAX_CONTENT_LEN {
        return Err(ApiError::BadRequest(format!(
            "content must be 1-{MAX_CONTENT_LEN} characters"
        )));
    }
    Ok(())
}

async fn load_post(state: &AppState, id: i64) -> Result<Post, ApiError> {
    state
        .store
        .posts
        .get_by_id(id)
        .await?
        .ok_or(ApiError::NotFound)
}

/// Ownership-or-role gate. A failed role lookup is a server fault, not a denial.
async fn authorize(
    state: &AppState,
    caller: &User,
    post: &Post,
    required_role: &str,
) -> Result<(), ApiError> {
    let allowed = state
        .roles
        .owner_or_role(caller, post.user_id, required_role)
        .await
        .map_err(|e| ApiError::Internal(anyhow!(e)))?;

    if !allowed {
        warn!(
            user_id = caller.id,
            post_id = post.id,
            role = %caller.role.name,
            required_role,
            "🚫 Mutation denied"
        );
        return Err(ApiError::Forbidden);
    }
    Ok(())
}

/// Create a post - POST /v1/posts
pub async fn create_post_handler(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Json(payload): Json<CreatePostRequest>,
) -> Result<(StatusCode, Json<Post>), ApiError> {
    validate_title(&payload.title)?;
    validate_content(&payload.content)?;

    let post = state
        .store
        .posts
        .create(caller.id, &payload.title, &payload.content, &payload.tags)
        .await?;

    info!(user_id = caller.id, post_id = post.id, "📝 Post created");
    Ok((StatusCode::CREATED, Json(post)))
}

/// Read a post - GET /v1/posts/:id
pub async fn get_post_handler(
    State(state): State<AppState>,
    CurrentUser(_caller): CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<Post>, ApiError> {
    Ok(Json(load_post(&state, id).await?))
}

/// Edit a post - PATCH /v1/posts/:id (owner or moderator+)
///
/// The body is only looked at once the caller has passed the gate.
pub async fn update_post_handler(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Path(id): Path<i64>,
    payload: Result<Json<PostUpdate>, JsonRejection>,
) -> Result<Json<Post>, ApiError> {
    let post = load_post(&state, id).await?;
    authorize(&state, &caller, &post, UPDATE_ROLE).await?;

    let Json(update) = payload.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    if let Some(title) = &update.title {
        validate_title(title)?;
    }
    if let Some(content) = &update.content {
        validate_content(content)?;
    }

    let updated = state.store.posts.update(id, &update).await?;
    info!(user_id = caller.id, post_id = id, version = updated.version, "✏️ Post updated");
    Ok(Json(updated))
}

/// Delete a post - DELETE /v1/posts/:id (owner or admin)
pub async fn delete_post_handler(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let post = load_post(&state, id).await?;
    authorize(&state, &caller, &post, DELETE_ROLE).await?;

    state.store.posts.delete(id).await?;
    info!(user_id = caller.id, post_id = id, "🗑️ Post deleted");
    Ok(StatusCode::NO_CONTENT)
}
