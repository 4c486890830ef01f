//! Identity Resolution
//! Mission: Turn a verified subject id into an identity, cache-aside

use crate::auth::models::User;
use crate::cache::{CacheError, UserCache};
use crate::store::{StoreError, UserStore};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("identity not found")]
    NotFound,
    #[error("identity cache unavailable: {0}")]
    Cache(#[from] CacheError),
    #[error("system of record unavailable: {0}")]
    Store(#[from] StoreError),
}

/// Resolves identities through the cache (when configured) with the system of
/// record as the source of truth. No invalidation: freshness is bounded by TTL.
pub struct IdentityResolver {
    users: Arc<dyn UserStore>,
    /// `None` means caching is disabled and the cache is never consulted.
    cache: Option<Arc<dyn UserCache>>,
}

impl IdentityResolver {
    pub fn new(users: Arc<dyn UserStore>, cache: Option<Arc<dyn UserCache>>) -> Self {
        Self { users, cache }
    }

    pub fn caching_enabled(&self) -> bool {
        self.cache.is_some()
    }

    pub async fn resolve(&self, id: i64) -> Result<User, ResolveError> {
        let Some(cache) = &self.cache else {
            return self.fetch(id).await;
        };

        // A cache error is surfaced, never read as "no such user".
        if let Some(user) = cache.get(id).await? {
            debug!(user_id = id, "Identity cache hit");
            return Ok(user);
        }

        debug!(user_id = id, "Identity cache miss, reading system of record");
        let user = self.fetch(id).await?;
        cache.set(&user).await?;
        Ok(user)
    }

    async fn fetch(&self, id: i64) -> Result<User, ResolveError> {
        self.users.get_by_id(id).await?.ok_or(ResolveError::NotFound)
    }
}
