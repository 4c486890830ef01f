//! Authentication API Endpoints
//! Mission: Register identities and exchange credentials for bearer tokens

use crate::api::{errors::ApiError, AppState};
use crate::auth::{
    models::{
        CreateTokenRequest, RegisterUserRequest, TokenResponse, UserResponse, UserWithToken,
    },
    Password, PasswordError,
};
use crate::store::{hash_invitation_token, NewUser};
use anyhow::Context;
use axum::{extract::State, http::StatusCode, Json};
use tracing::{info, warn};
use uuid::Uuid;

const MAX_USERNAME_LEN: usize = 100;
const MAX_EMAIL_LEN: usize = 255;
const MIN_PASSWORD_LEN: usize = 3;
// bcrypt ignores anything past 72 bytes
const MAX_PASSWORD_LEN: usize = 72;

fn validate_registration(payload: &RegisterUserRequest) -> Result<(), ApiError> {
    let username = payload.username.trim();
    if username.is_empty() || username.len() > MAX_USERNAME_LEN {
        return Err(ApiError::BadRequest(format!(
            "username must be 1-{MAX_USERNAME_LEN} characters"
        )));
    }
    if !payload.email.contains('@') || payload.email.len() > MAX_EMAIL_LEN {
        return Err(ApiError::BadRequest("email is invalid".to_string()));
    }
    if payload.password.len() < MIN_PASSWORD_LEN || payload.password.len() > MAX_PASSWORD_LEN {
        return Err(ApiError::BadRequest(format!(
            "password must be {MIN_PASSWORD_LEN}-{MAX_PASSWORD_LEN} bytes"
        )));
    }
    Ok(())
}

/// Verify `attempt` against `stored`. With no account, hash the attempt anyway
/// so both outcomes spend the same bcrypt work.
fn check_password(
    stored: Option<Password>,
    attempt: &str,
    cost: u32,
) -> Result<bool, PasswordError> {
    match stored {
        Some(password) => password.verify(attempt),
        None => {
            Password::set_with_cost(attempt, cost)?;
            Ok(false)
        }
    }
}

/// Register - POST /v1/authentication/user
///
/// Creates an inactive user and returns the one-time activation token.
pub async fn register_user_handler(
    State(state): State<AppState>,
    Json(payload): Json<RegisterUserRequest>,
) -> Result<(StatusCode, Json<UserWithToken>), ApiError> {
    validate_registration(&payload)?;

    // bcrypt is deliberately slow; keep it off the async workers.
    let cost = state.config.auth.bcrypt_cost;
    let raw = payload.password;
    let password = tokio::task::spawn_blocking(move || Password::set_with_cost(&raw, cost))
        .await
        .context("password hashing task failed")?
        .context("failed to hash password")?;

    let plain_token = Uuid::new_v4().to_string();
    let user = state
        .store
        .users
        .create_and_invite(
            NewUser {
                username: payload.username.trim().to_string(),
                email: payload.email,
                password_hash: password.hash().to_string(),
                role: None,
            },
            &hash_invitation_token(&plain_token),
            state.config.invitation_exp,
        )
        .await?;

    info!(user_id = user.id, "✅ Registered user pending activation");

    Ok((
        StatusCode::CREATED,
        Json(UserWithToken {
            user: UserResponse::from_user(&user),
            token: plain_token,
        }),
    ))
}

/// Token issuance - POST /v1/authentication/token
pub async fn create_token_handler(
    State(state): State<AppState>,
    Json(payload): Json<CreateTokenRequest>,
) -> Result<(StatusCode, Json<TokenResponse>), ApiError> {
    let user = state.store.users.get_by_email(&payload.email).await?;

    let stored = user.as_ref().map(|u| u.password.clone());
    let cost = state.config.auth.bcrypt_cost;
    let attempt = payload.password;
    let valid = tokio::task::spawn_blocking(move || check_password(stored, &attempt, cost))
        .await
        .context("password verification task failed")?
        .context("stored password hash is unusable")?;

    let user = match user {
        Some(user) if valid => user,
        Some(user) => {
            warn!(user_id = user.id, "❌ Failed token request");
            return Err(ApiError::Unauthorized);
        }
        None => {
            warn!("❌ Token requested for unknown or inactive account");
            return Err(ApiError::Unauthorized);
        }
    };

    let ttl = state.jwt.default_ttl();
    let token = state
        .jwt
        .issue_token(user.id, ttl)
        .context("failed to sign token")?;

    info!(user_id = user.id, "🔐 Token issued");

    Ok((
        StatusCode::CREATED,
        Json(TokenResponse {
            token,
            expires_in: ttl.as_secs(),
        }),
    ))
}
