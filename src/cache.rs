//! Short-TTL key/value cache in front of the schedule projection.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

/// Cache key of a group's projection for one mode.
pub fn schedule_cache_key(group: &str, is_session: bool) -> String {
    format!("schedule:{group}:{}", u8::from(is_session))
}

/// String cache with per-entry expiry.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    async fn set(&self, key: &str, value: String, ttl: Duration) -> anyhow::Result<()>;
    async fn delete(&self, key: &str) -> anyhow::Result<()>;
}

/// In-process cache. Expired entries are dropped lazily on read.
#[derive(Clone, Default)]
pub struct MemoryCache {
    /// key → (expires_at, value)
    entries: Arc<DashMap<String, (Instant, String)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let Some(entry) = self.entries.get(key) else {
            return Ok(None);
        };
        let (expires_at, ref value) = *entry;
        if Instant::now() < expires_at {
            return Ok(Some(value.clone()));
        }
        drop(entry);
        self.entries
            .remove_if(key, |_, (expires_at, _)| Instant::now() >= *expires_at);
        Ok(None)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> anyhow::Result<()> {
        self.entries
            .insert(key.to_owned(), (Instant::now() + ttl, value));
        Ok(())
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}
