//! Authentication Models
//! Mission: Define identity, role and token data structures

use crate::auth::password::Password;
use serde::{Deserialize, Serialize};

/// Identity record owned by the system of record.
///
/// Cached copies are snapshots: the password hash is never serialized, so a
/// snapshot read back from the cache carries an empty `Password`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip)]
    pub password: Password,
    pub created_at: String,
    pub is_active: bool,
    pub role: Role,
}

/// Role in the privilege hierarchy. Only `level` is security relevant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Role {
    pub id: i64,
    pub name: String,
    pub level: i64,
    pub description: String,
}

impl Role {
    /// Level comparison; names never take part.
    pub fn outranks_or_equals(&self, other: &Role) -> bool {
        self.level >= other.level
    }
}

/// JWT Claims payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: String, // subject (user id)
    pub exp: u64,
    pub iat: u64,
    pub nbf: u64,
    pub iss: String,
    pub aud: String,
}

/// Registration request body
#[derive(Debug, Deserialize)]
pub struct RegisterUserRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Registration response: the activation token is only shown once.
#[derive(Debug, Serialize)]
pub struct UserWithToken {
    pub user: UserResponse,
    pub token: String,
}

/// Token issuance request body
#[derive(Debug, Deserialize)]
pub struct CreateTokenRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub expires_in: u64, // seconds until expiration
}

/// User response (sanitized)
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub is_active: bool,
    pub role: String,
    pub created_at: String,
}

impl UserResponse {
    pub fn from_user(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            is_active: user.is_active,
            role: user.role.name.clone(),
            created_at: user.created_at.clone(),
        }
    }
}
