//! In-process identity cache with per-entry expiry.

use crate::auth::models::User;
use crate::cache::{CacheError, UserCache};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

pub struct MemoryUserCache {
    ttl: Duration,
    entries: Mutex<HashMap<i64, (User, Instant)>>,
}

impl MemoryUserCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .values()
            .filter(|(_, expires_at)| *expires_at > now)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl UserCache for MemoryUserCache {
    async fn get(&self, id: i64) -> Result<Option<User>, CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let expired = match entries.get(&id) {
            Some((user, expires_at)) if *expires_at > now => return Ok(Some(user.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.remove(&id);
        }
        Ok(None)
    }

    async fn set(&self, user: &User) -> Result<(), CacheError> {
        // Same shape as a serialized snapshot: no password hash.
        let mut snapshot = user.clone();
        snapshot.password = Default::default();
        self.entries
            .lock()
            .insert(user.id, (snapshot, Instant::now() + self.ttl));
        Ok(())
    }
}
