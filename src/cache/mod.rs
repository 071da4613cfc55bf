//! # Cache Module
//!
//! Tiered result caching for downstream fetches.
//!
//! ## Architecture
//!
//! ```text
//! CacheManager                      <- namespacing, two-tier read/write, single-flight
//!   ├── durable: Arc<dyn CacheBackend>  (optional)
//!   │     └── RedisCacheService     <- ConnectionManager-based async Redis
//!   └── local: LocalCache           <- DashMap with per-entry expiry
//! ```
//!
//! ## Design Decisions
//!
//! - **Graceful degradation**: a failed connect at startup leaves the manager
//!   local-only for its lifetime, never blocks or fails construction
//! - **Best-effort durable tier**: its errors are logged, never propagated
//! - **Write-through plus local**: the local tier is written on every `set`
//! - **SCAN for prefix clears**: non-blocking key iteration (never uses KEYS)

pub mod errors;
pub mod manager;
pub mod providers;
pub mod traits;

use crate::constants;
use std::time::Duration;

pub use errors::{CacheError, CacheResult};
pub use manager::CacheManager;
pub use providers::LocalCache;
pub use traits::CacheBackend;

#[cfg(feature = "cache-redis")]
pub use providers::RedisCacheService;

/// Clamp a TTL so that `Instant::now() + ttl` cannot overflow
pub(crate) fn clamp_ttl(ttl: Duration) -> Duration {
    ttl.min(Duration::from_secs(constants::cache::MAX_TTL_SECONDS))
}
