//! Durable cache backend trait

use super::errors::CacheResult;
use async_trait::async_trait;
use std::time::Duration;

/// Protocol the cache manager speaks to a durable tier
///
/// Keys arrive already namespaced. Values are serialized JSON strings.
/// Implementations must be safe for concurrent use; the manager clones the
/// handle out of its lock and never holds a lock across these calls.
#[async_trait]
pub trait CacheBackend: Send + Sync + std::fmt::Debug {
    /// `Ok(None)` on a miss
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()>;

    async fn delete(&self, key: &str) -> CacheResult<()>;

    async fn exists(&self, key: &str) -> CacheResult<bool>;

    /// Remaining lifetime, `Ok(None)` when the key is absent or has no expiry
    async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>>;

    /// Delete every key starting with `prefix`, returning how many went
    async fn delete_prefix(&self, prefix: &str) -> CacheResult<u64>;

    async fn health_check(&self) -> CacheResult<bool>;

    fn provider_name(&self) -> &'static str;
}
