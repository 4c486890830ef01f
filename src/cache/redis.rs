//! Redis-backed identity cache.

use crate::auth::models::User;
use crate::cache::{cache_key, CacheError, UserCache};
use anyhow::Context;
use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands};
use std::time::Duration;
use tracing::info;

pub struct RedisUserCache {
    conn: ConnectionManager,
    ttl: Duration,
    timeout: Duration,
}

impl RedisUserCache {
    /// Connect eagerly so an unreachable Redis fails startup.
    pub async fn connect(addr: &str, ttl: Duration, timeout: Duration) -> anyhow::Result<Self> {
        let client = redis::Client::open(addr)
            .with_context(|| format!("Invalid Redis address {}", addr))?;
        let conn = tokio::time::timeout(timeout.max(Duration::from_secs(5)), ConnectionManager::new(client))
            .await
            .context("Timed out connecting to Redis")?
            .context("Failed to connect to Redis")?;

        info!("🗄️  Identity cache connected to {}", addr);
        Ok(Self { conn, ttl, timeout })
    }
}

#[async_trait]
impl UserCache for RedisUserCache {
    async fn get(&self, id: i64) -> Result<Option<User>, CacheError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = tokio::time::timeout(self.timeout, conn.get(cache_key(id)))
            .await
            .map_err(|_| CacheError::Timeout)??;

        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, user: &User) -> Result<(), CacheError> {
        let json = serde_json::to_string(user)?;
        let mut conn = self.conn.clone();
        let ttl_secs = self.ttl.as_secs().max(1);
        tokio::time::timeout(
            self.timeout,
            conn.set_ex::<_, _, ()>(cache_key(user.id), json, ttl_secs),
        )
        .await
        .map_err(|_| CacheError::Timeout)??;
        Ok(())
    }
}
