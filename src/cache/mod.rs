//! Identity Cache Backends
//! Mission: Key-value snapshots of identities with a TTL, consulted before the
//! system of record

pub mod memory;
pub mod redis;

pub use self::memory::MemoryUserCache;
pub use self::redis::RedisUserCache;

use crate::auth::models::User;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(#[from] ::redis::RedisError),
    #[error("cache snapshot could not be (de)serialized: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("cache call exceeded its deadline")]
    Timeout,
}

/// `get` returning `Ok(None)` is a miss, never an error.
#[async_trait]
pub trait UserCache: Send + Sync {
    async fn get(&self, id: i64) -> Result<Option<User>, CacheError>;
    async fn set(&self, user: &User) -> Result<(), CacheError>;
}

pub fn cache_key(id: i64) -> String {
    format!("user-{id}")
}
