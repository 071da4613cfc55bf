//! # Cache Manager
//!
//! Two-tier best-effort cache. Reads try the durable tier first and fall back
//! to the local tier; writes go to the durable tier when it is present and
//! always to the local tier, so local stays warm whatever the durable tier's
//! health. Every key is namespaced with the configured prefix before it
//! reaches either tier.
//!
//! Durable-tier failures are logged and absorbed. The only errors a caller
//! sees are `CacheMiss` (a signal) and `Serialization` when a value cannot be
//! encoded at all.

use crate::batching::Promise;
use crate::cache::clamp_ttl;
use crate::cache::errors::CacheResult;
use crate::cache::providers::LocalCache;
use crate::cache::traits::CacheBackend;
use crate::config::CacheConfig;
use crate::error::{AggregationError, AggregationResult};
use crate::resilience::{CircuitBreaker, CircuitBreakerError};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[cfg(feature = "cache-redis")]
use crate::cache::providers::RedisCacheService;

type InFlight = DashMap<String, Arc<Promise<serde_json::Value>>>;

/// Tiered cache with a durable backend and an always-available local store
pub struct CacheManager {
    /// `None` when local-only, either from startup or after `close`
    durable: RwLock<Option<Arc<dyn CacheBackend>>>,
    durable_breaker: Option<Arc<CircuitBreaker>>,
    local: LocalCache,
    key_prefix: String,
    default_ttl: Duration,
    in_flight: InFlight,
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("provider", &self.provider_name())
            .field("key_prefix", &self.key_prefix)
            .field("default_ttl", &self.default_ttl)
            .field("local_entries", &self.local.len())
            .field(
                "durable_breaker",
                &self.durable_breaker.as_ref().map(|cb| cb.state()),
            )
            .finish()
    }
}

impl CacheManager {
    /// Build from configuration, degrading to local-only on any connect failure
    ///
    /// The connection is attempted once, bounded by `connect_timeout_ms`.
    /// A manager that starts local-only stays local-only.
    pub async fn new(config: &CacheConfig) -> Self {
        let durable = match &config.redis_url {
            Some(url) if !url.is_empty() => Self::connect_durable(url, config).await,
            _ => {
                info!("No durable cache backend configured, using local tier only");
                None
            }
        };

        Self::build(config, durable)
    }

    /// Local-only manager; never attempts a connection
    pub fn local_only(config: &CacheConfig) -> Self {
        Self::build(config, None)
    }

    /// Manager over an already-connected durable backend
    pub fn with_backend(config: &CacheConfig, backend: Arc<dyn CacheBackend>) -> Self {
        Self::build(config, Some(backend))
    }

    #[cfg(feature = "cache-redis")]
    async fn connect_durable(url: &str, config: &CacheConfig) -> Option<Arc<dyn CacheBackend>> {
        match RedisCacheService::connect(url, config.connect_timeout()).await {
            Ok(service) => {
                info!(
                    backend = "redis",
                    url = %crate::cache::providers::redis::redact_url(url),
                    "Durable cache tier connected"
                );
                Some(Arc::new(service))
            }
            Err(e) => {
                warn!(
                    error = %e,
                    "Failed to connect durable cache tier, using local tier only (graceful degradation)"
                );
                None
            }
        }
    }

    #[cfg(not(feature = "cache-redis"))]
    async fn connect_durable(_url: &str, _config: &CacheConfig) -> Option<Arc<dyn CacheBackend>> {
        warn!("Durable cache requested but 'cache-redis' feature not enabled, using local tier only");
        None
    }

    fn build(config: &CacheConfig, durable: Option<Arc<dyn CacheBackend>>) -> Self {
        let durable_breaker = match (&durable, &config.durable_circuit_breaker) {
            (Some(_), Some(cb_config)) => {
                info!(
                    failure_threshold = cb_config.failure_threshold,
                    reset_timeout_ms = cb_config.reset_timeout_ms,
                    "Durable cache circuit breaker initialized"
                );
                Some(Arc::new(CircuitBreaker::new(
                    "cache_durable_tier",
                    cb_config.to_resilience_config(),
                )))
            }
            _ => None,
        };

        Self {
            durable: RwLock::new(durable),
            durable_breaker,
            local: LocalCache::new(),
            key_prefix: config.key_prefix.clone(),
            default_ttl: config.default_ttl(),
            in_flight: DashMap::new(),
        }
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    fn effective_ttl(&self, ttl: Duration) -> Duration {
        if ttl.is_zero() {
            self.default_ttl
        } else {
            clamp_ttl(ttl)
        }
    }

    /// Run one durable-tier call; `None` means skipped or failed
    async fn durable_call<T, F, Fut>(&self, operation: &'static str, key: &str, call: F) -> Option<T>
    where
        F: FnOnce(Arc<dyn CacheBackend>) -> Fut,
        Fut: Future<Output = CacheResult<T>>,
    {
        let backend = self.durable.read().clone()?;

        let outcome = match &self.durable_breaker {
            Some(breaker) => match breaker.execute(|| call(backend)).await {
                Ok(value) => Ok(value),
                Err(CircuitBreakerError::CircuitOpen { .. }) => {
                    debug!(operation = operation, key = key, "Durable tier breaker open, skipping");
                    return None;
                }
                Err(CircuitBreakerError::OperationFailed(e)) => Err(e),
            },
            None => call(backend).await,
        };

        match outcome {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(
                    operation = operation,
                    key = key,
                    error = %e,
                    "Durable cache tier call failed, falling back to local tier"
                );
                None
            }
        }
    }

    /// Read `key`, durable tier first
    ///
    /// Returns `CacheMiss` when neither tier holds a fresh, decodable value.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> AggregationResult<T> {
        let full_key = self.full_key(key);
        let fk = full_key.as_str();

        if let Some(Some(raw)) = self
            .durable_call("get", fk, |backend| async move { backend.get(fk).await })
            .await
        {
            match serde_json::from_str::<T>(&raw) {
                Ok(value) => return Ok(value),
                Err(e) => debug!(key = fk, error = %e, "Durable cache value did not decode"),
            }
        }

        if let Some(raw) = self.local.get(fk) {
            match serde_json::from_str::<T>(&raw) {
                Ok(value) => return Ok(value),
                Err(e) => debug!(key = fk, error = %e, "Local cache value did not decode"),
            }
        }

        Err(AggregationError::CacheMiss {
            key: key.to_string(),
        })
    }

    /// Write `value` to both tiers; a zero `ttl` means the default TTL
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> AggregationResult<()> {
        let raw = serde_json::to_string(value)?;
        let ttl = self.effective_ttl(ttl);
        let full_key = self.full_key(key);
        let fk = full_key.as_str();
        let payload = raw.as_str();

        self.durable_call("set", fk, |backend| async move {
            backend.set(fk, payload, ttl).await
        })
        .await;

        self.local.set(fk, raw, ttl);
        Ok(())
    }

    pub async fn delete(&self, key: &str) {
        let full_key = self.full_key(key);
        let fk = full_key.as_str();

        self.durable_call("delete", fk, |backend| async move { backend.delete(fk).await })
            .await;
        self.local.delete(fk);
    }

    /// Remove every key under this manager's prefix from both tiers
    pub async fn clear(&self) {
        let prefix = self.key_prefix.as_str();

        let durable_removed = self
            .durable_call("clear", prefix, |backend| async move {
                backend.delete_prefix(prefix).await
            })
            .await;
        let local_removed = self.local.delete_prefix(prefix);

        info!(
            prefix = prefix,
            durable_removed = durable_removed,
            local_removed = local_removed,
            "Cache cleared"
        );
    }

    pub async fn exists(&self, key: &str) -> bool {
        let full_key = self.full_key(key);
        let fk = full_key.as_str();

        if let Some(true) = self
            .durable_call("exists", fk, |backend| async move { backend.exists(fk).await })
            .await
        {
            return true;
        }
        self.local.exists(fk)
    }

    /// Remaining lifetime of `key`, `CacheMiss` if absent or expired
    pub async fn ttl(&self, key: &str) -> AggregationResult<Duration> {
        let full_key = self.full_key(key);
        let fk = full_key.as_str();

        if let Some(Some(remaining)) = self
            .durable_call("ttl", fk, |backend| async move { backend.ttl(fk).await })
            .await
        {
            return Ok(remaining);
        }

        self.local.ttl(fk).ok_or_else(|| AggregationError::CacheMiss {
            key: key.to_string(),
        })
    }

    /// Read-through: on a miss, run `fetch`, store its value and return it
    ///
    /// Concurrent misses each run `fetch`; see `get_or_set_single_flight`.
    /// Fetch errors are returned as-is and nothing is cached.
    pub async fn get_or_set<T, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        fetch: F,
    ) -> AggregationResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = AggregationResult<T>>,
    {
        if let Ok(value) = self.get::<T>(key).await {
            return Ok(value);
        }

        let value = fetch().await?;
        if let Err(e) = self.set(key, &value, ttl).await {
            warn!(key = key, error = %e, "Failed to cache fetched value");
        }
        Ok(value)
    }

    /// `get_or_set` where concurrent misses on one key share a single fetch
    ///
    /// The first caller to miss runs `fetch`; everyone else arriving before it
    /// finishes waits for its outcome, error included.
    pub async fn get_or_set_single_flight<T, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        fetch: F,
    ) -> AggregationResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = AggregationResult<T>>,
    {
        if let Ok(value) = self.get::<T>(key).await {
            return Ok(value);
        }

        let full_key = self.full_key(key);
        let (promise, is_leader) = match self.in_flight.entry(full_key.clone()) {
            Entry::Occupied(entry) => (Arc::clone(entry.get()), false),
            Entry::Vacant(entry) => {
                let promise = Arc::new(Promise::new());
                entry.insert(Arc::clone(&promise));
                (promise, true)
            }
        };

        if !is_leader {
            debug!(key = %full_key, "Joining in-flight fetch");
            let shared = promise.wait().await?;
            return Ok(serde_json::from_value(shared)?);
        }

        let _guard = InFlightGuard {
            in_flight: &self.in_flight,
            key: full_key,
            promise: Arc::clone(&promise),
        };

        // A previous leader may have filled the cache since our miss
        if let Ok(value) = self.get::<T>(key).await {
            resolve_shared(&promise, &value);
            return Ok(value);
        }

        match fetch().await {
            Ok(value) => {
                if let Err(e) = self.set(key, &value, ttl).await {
                    warn!(key = key, error = %e, "Failed to cache fetched value");
                }
                resolve_shared(&promise, &value);
                Ok(value)
            }
            Err(e) => {
                promise.resolve_err(e.clone());
                Err(e)
            }
        }
    }

    /// Set every item; stops at the first value that cannot be serialized
    pub async fn set_multi<T: Serialize>(
        &self,
        items: &HashMap<String, T>,
        ttl: Duration,
    ) -> AggregationResult<()> {
        for (key, value) in items {
            self.set(key, value, ttl).await.map_err(|e| {
                AggregationError::Serialization(format!("failed to set {key}: {e}"))
            })?;
        }
        Ok(())
    }

    /// Hits only; missing keys are simply absent from the map
    pub async fn get_multi<T, I, S>(&self, keys: I) -> HashMap<String, T>
    where
        T: DeserializeOwned,
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut results = HashMap::new();
        for key in keys {
            let key = key.as_ref();
            if let Ok(value) = self.get::<T>(key).await {
                results.insert(key.to_string(), value);
            }
        }
        results
    }

    /// Whether a durable tier is currently in use
    pub fn is_durable(&self) -> bool {
        self.durable.read().is_some()
    }

    pub fn provider_name(&self) -> &'static str {
        match self.durable.read().as_ref() {
            Some(backend) => backend.provider_name(),
            None => "local",
        }
    }

    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Entries held by the local tier, including stale ones not yet read
    pub fn local_len(&self) -> usize {
        self.local.len()
    }

    pub fn durable_circuit_breaker(&self) -> Option<&Arc<CircuitBreaker>> {
        self.durable_breaker.as_ref()
    }

    /// Durable tier health; a local-only manager is always healthy
    pub async fn health_check(&self) -> bool {
        if !self.is_durable() {
            return true;
        }
        self.durable_call("health_check", "", |backend| async move {
            backend.health_check().await
        })
        .await
        .unwrap_or(false)
    }

    /// Release the durable client; later calls use the local tier only
    ///
    /// Returns `true` only for the call that actually closed it.
    pub fn close(&self) -> bool {
        let closed = self.durable.write().take();
        match closed {
            Some(backend) => {
                info!(provider = backend.provider_name(), "Durable cache tier closed");
                true
            }
            None => false,
        }
    }
}

fn resolve_shared<T: Serialize>(promise: &Promise<serde_json::Value>, value: &T) {
    match serde_json::to_value(value) {
        Ok(shared) => promise.resolve_ok(shared),
        Err(e) => promise.resolve_err(e.into()),
    };
}

/// Retires the in-flight entry; fails waiters if the leader was dropped early
struct InFlightGuard<'a> {
    in_flight: &'a InFlight,
    key: String,
    promise: Arc<Promise<serde_json::Value>>,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if self.promise.resolve_err(AggregationError::Internal(format!(
            "fetch for '{}' was abandoned before completing",
            self.key
        ))) {
            debug!(key = %self.key, "Single-flight leader dropped, waiters released");
        }
        self.in_flight
            .remove_if(&self.key, |_, current| Arc::ptr_eq(current, &self.promise));
    }
}
