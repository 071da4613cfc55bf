//! # System Constants
//!
//! Defaults and fixed tables shared across the batching, resilience, cache
//! and aggregation modules.

/// Request batching defaults
pub mod batching {
    /// Coalescing window opened by the first caller for a key
    pub const DEFAULT_BATCH_WINDOW_MS: u64 = 10;
    /// Pending-id count that flushes a batch before its window closes
    pub const DEFAULT_MAX_BATCH_SIZE: usize = 50;
}

/// Circuit breaker defaults
pub mod resilience {
    pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
    pub const DEFAULT_SUCCESS_THRESHOLD: u32 = 2;
    pub const DEFAULT_RESET_TIMEOUT_MS: u64 = 60_000;
    /// Minimum calls before `is_healthy` looks at the failure rate
    pub const HEALTH_MIN_CALLS: u64 = 10;
    pub const HEALTHY_FAILURE_RATE: f64 = 0.1;
    /// Open-state cooldown used when `reset_timeout` is too large to schedule
    pub const MAX_OPEN_SECONDS: u64 = 10 * 365 * 24 * 60 * 60;
}

/// Cache manager defaults
pub mod cache {
    pub const DEFAULT_TTL_SECONDS: u64 = 300;
    pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 2_000;
    pub const DEFAULT_KEY_PREFIX: &str = "bff:";
    /// SCAN page size used for prefix deletion on the durable tier
    pub const SCAN_COUNT: usize = 100;
    /// Longest TTL either tier stores; larger values are clamped to it
    pub const MAX_TTL_SECONDS: u64 = 10 * 365 * 24 * 60 * 60;
}

/// Parallel/waterfall aggregator defaults
pub mod aggregation {
    pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
    /// Buffered failure notices kept for slow FailFast subscribers
    pub const FAILURE_CHANNEL_CAPACITY: usize = 64;
}

/// Field names stripped by `ResponseTransformer::sanitize`
pub const SENSITIVE_FIELDS: &[&str] = &[
    "password",
    "passwordHash",
    "secret",
    "token",
    "apiKey",
    "privateKey",
    "ssn",
    "creditCard",
    "cvv",
    "pin",
    "accessToken",
    "refreshToken",
];

/// Environment variables consulted (in order) to pick the runtime environment
pub const ENVIRONMENT_VARIABLES: &[&str] = &["BFF_ENV", "APP_ENV"];

/// Prefix for environment overrides read by `ConfigLoader` (`BFF__CACHE__KEY_PREFIX`)
pub const CONFIG_ENV_PREFIX: &str = "BFF";
