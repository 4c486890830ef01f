//! System of Record
//! Mission: Capability traits over identities, roles and posts, with a SQLite
//! backend for production and an in-memory backend for tests

pub mod memory;
pub mod models;
pub mod sqlite;

pub use memory::MemoryStore;
pub use models::{NewUser, Post, PostUpdate};
pub use sqlite::SqliteStore;

use crate::auth::models::{Role, User};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Role assigned when a new user does not ask for one.
pub const DEFAULT_ROLE: &str = "user";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("a user with that email address already exists")]
    DuplicateEmail,
    #[error("a user with that username already exists")]
    DuplicateUsername,
    #[error("store call exceeded its deadline")]
    Timeout,
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Active users only, joined with their role.
    async fn get_by_id(&self, id: i64) -> StoreResult<Option<User>>;
    /// Active users only.
    async fn get_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    /// Insert an inactive user plus an invitation keyed by `token_hash`, atomically.
    async fn create_and_invite(
        &self,
        user: NewUser,
        token_hash: &str,
        invitation_exp: Duration,
    ) -> StoreResult<User>;
    /// Activate the user owning an unexpired invitation and drop its invitations.
    async fn activate(&self, token_hash: &str) -> StoreResult<()>;
    async fn delete(&self, id: i64) -> StoreResult<()>;
}

#[async_trait]
pub trait RoleStore: Send + Sync {
    async fn get_by_name(&self, name: &str) -> StoreResult<Option<Role>>;
}

#[async_trait]
pub trait PostStore: Send + Sync {
    async fn create(&self, user_id: i64, title: &str, content: &str, tags: &[String])
        -> StoreResult<Post>;
    async fn get_by_id(&self, id: i64) -> StoreResult<Option<Post>>;
    async fn update(&self, id: i64, update: &PostUpdate) -> StoreResult<Post>;
    async fn delete(&self, id: i64) -> StoreResult<()>;
}

/// Backends chosen once at construction time.
#[derive(Clone)]
pub struct Storage {
    pub users: Arc<dyn UserStore>,
    pub roles: Arc<dyn RoleStore>,
    pub posts: Arc<dyn PostStore>,
}

impl Storage {
    pub fn sqlite(store: SqliteStore) -> Self {
        let store = Arc::new(store);
        Self {
            users: store.clone(),
            roles: store.clone(),
            posts: store,
        }
    }

    pub fn in_memory(store: MemoryStore) -> Self {
        let store = Arc::new(store);
        Self {
            users: store.clone(),
            roles: store.clone(),
            posts: store,
        }
    }
}

/// Invitation tokens are stored hashed; only the user ever sees the raw value.
pub fn hash_invitation_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Unix timestamp `ttl` from now, clamped to `i64::MAX`.
pub fn expiry_from_now(ttl: Duration) -> i64 {
    let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
    chrono::Utc::now().timestamp().saturating_add(ttl_secs)
}

/// Bound a backend call by `deadline`.
pub async fn with_deadline<T, F>(deadline: Duration, fut: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    tokio::time::timeout(deadline, fut)
        .await
        .map_err(|_| StoreError::Timeout)?
}
