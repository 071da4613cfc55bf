//! Cache backend implementations

pub mod local;

#[cfg(feature = "cache-redis")]
pub mod redis;

pub use local::LocalCache;

#[cfg(feature = "cache-redis")]
pub use self::redis::RedisCacheService;
