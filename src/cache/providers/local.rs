//! In-process cache tier
//!
//! Always available. Each entry carries its own absolute expiry and is
//! removed lazily when a read finds it stale; nothing sweeps the map in the
//! background.
//!
//! Clones share the same store, so one `LocalCache` can also be handed to
//! several managers as a process-wide durable tier.

use crate::cache::errors::CacheResult;
use crate::cache::clamp_ttl;
use crate::cache::traits::CacheBackend;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone)]
struct LocalEntry {
    value: String,
    expires_at: Instant,
}

impl LocalEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// DashMap-backed TTL store
#[derive(Debug, Clone, Default)]
pub struct LocalCache {
    entries: Arc<DashMap<String, LocalEntry>>,
}

impl LocalCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh value for `key`, evicting it first if it has expired
    pub fn get(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired(now) {
                return Some(entry.value.clone());
            }
        }
        // Stale or absent; remove only if still stale so a concurrent set survives
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        None
    }

    pub fn set(&self, key: &str, value: String, ttl: Duration) {
        self.entries.insert(
            key.to_string(),
            LocalEntry {
                value,
                expires_at: Instant::now() + clamp_ttl(ttl),
            },
        );
    }

    pub fn delete(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn exists(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Remaining lifetime of a fresh entry
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let remaining = self
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.expires_at - now);
        if remaining.is_none() {
            self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        }
        remaining
    }

    pub fn delete_prefix(&self, prefix: &str) -> u64 {
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(prefix));
        let removed = before.saturating_sub(self.entries.len()) as u64;
        debug!(prefix = prefix, removed = removed, "Local cache prefix clear");
        removed
    }

    /// Stored entries, including expired ones not yet read
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CacheBackend for LocalCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        Ok(LocalCache::get(self, key))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        LocalCache::set(self, key, value.to_string(), ttl);
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        LocalCache::delete(self, key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        Ok(LocalCache::exists(self, key))
    }

    async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>> {
        Ok(LocalCache::ttl(self, key))
    }

    async fn delete_prefix(&self, prefix: &str) -> CacheResult<u64> {
        Ok(LocalCache::delete_prefix(self, prefix))
    }

    async fn health_check(&self) -> CacheResult<bool> {
        Ok(true)
    }

    fn provider_name(&self) -> &'static str {
        "memory"
    }
}
