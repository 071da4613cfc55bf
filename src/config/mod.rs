//! # Aggregation Configuration
//!
//! Plain-value configuration for the batcher, circuit breakers, cache manager
//! and aggregator. Every component takes these structs (or the resilience
//! types derived from them) as constructor parameters; nothing in the core
//! loads configuration on its own.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use bffgen_aggregation::config::{AggregationConfig, ConfigLoader};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Defaults are production-ready
//! let config = AggregationConfig::default();
//! assert_eq!(config.batcher.max_batch_size, 50);
//!
//! // Or read `config/aggregation.toml` plus `BFF__*` environment overrides
//! let loaded = ConfigLoader::new("config").load()?;
//! let users_breaker = loaded.circuit_breakers.config_for_component("users");
//! # let _ = users_breaker;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use crate::constants;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::{detect_environment, ConfigLoader};

/// Root configuration grouping every component
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// Request coalescing settings
    pub batcher: BatcherConfig,

    /// Circuit breaker defaults and per-dependency overrides
    pub circuit_breakers: CircuitBreakerSettings,

    /// Tiered cache settings
    pub cache: CacheConfig,

    /// Parallel/waterfall fan-out settings
    pub aggregator: AggregatorConfig,
}

impl AggregationConfig {
    /// Fast timings for tests
    pub fn for_test() -> Self {
        Self {
            batcher: BatcherConfig {
                batch_window_ms: 5,
                max_batch_size: 10,
            },
            circuit_breakers: CircuitBreakerSettings {
                default_config: CircuitBreakerComponentConfig {
                    failure_threshold: 2,
                    success_threshold: 1,
                    reset_timeout_ms: 100,
                },
                component_configs: HashMap::new(),
            },
            cache: CacheConfig {
                redis_url: None,
                key_prefix: "test:".to_string(),
                default_ttl_seconds: 5,
                connect_timeout_ms: 100,
                durable_circuit_breaker: None,
            },
            aggregator: AggregatorConfig {
                default_timeout_ms: 1_000,
                fail_fast: false,
            },
        }
    }

    /// Validate every section
    pub fn validate(&self) -> ConfigResult<()> {
        self.batcher.validate()?;
        self.circuit_breakers.validate()?;
        self.cache.validate()?;
        self.aggregator.validate()?;
        Ok(())
    }
}

/// Request batcher configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BatcherConfig {
    /// Coalescing window in milliseconds (0 = default)
    pub batch_window_ms: u64,

    /// Pending ids that flush a batch immediately (0 = default)
    pub max_batch_size: usize,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            batch_window_ms: constants::batching::DEFAULT_BATCH_WINDOW_MS,
            max_batch_size: constants::batching::DEFAULT_MAX_BATCH_SIZE,
        }
    }
}

impl BatcherConfig {
    pub fn new(batch_window: Duration, max_batch_size: usize) -> Self {
        Self {
            batch_window_ms: batch_window.as_millis() as u64,
            max_batch_size,
        }
    }

    /// Batch window as Duration, substituting the default for zero
    pub fn batch_window(&self) -> Duration {
        if self.batch_window_ms == 0 {
            Duration::from_millis(constants::batching::DEFAULT_BATCH_WINDOW_MS)
        } else {
            Duration::from_millis(self.batch_window_ms)
        }
    }

    /// Max batch size, substituting the default for zero
    pub fn effective_max_batch_size(&self) -> usize {
        if self.max_batch_size == 0 {
            constants::batching::DEFAULT_MAX_BATCH_SIZE
        } else {
            self.max_batch_size
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.batch_window_ms > 60_000 {
            return Err(ConfigurationError::invalid_value(
                "batcher.batch_window_ms",
                self.batch_window_ms,
                "batch window should not exceed 60 seconds",
            ));
        }
        if self.max_batch_size > 10_000 {
            return Err(ConfigurationError::invalid_value(
                "batcher.max_batch_size",
                self.max_batch_size,
                "max batch size should not exceed 10000",
            ));
        }
        Ok(())
    }
}

/// Circuit breaker settings with per-dependency overrides
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    /// Configuration for breakers without an explicit override
    pub default_config: CircuitBreakerComponentConfig,

    /// Overrides keyed by dependency name
    pub component_configs: HashMap<String, CircuitBreakerComponentConfig>,
}

impl CircuitBreakerSettings {
    /// Get configuration for a specific dependency
    pub fn config_for_component(&self, component_name: &str) -> CircuitBreakerComponentConfig {
        self.component_configs
            .get(component_name)
            .cloned()
            .unwrap_or_else(|| self.default_config.clone())
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.default_config.validate("circuit_breakers.default_config")?;
        for (name, component) in &self.component_configs {
            component.validate(&format!("circuit_breakers.component_configs.{name}"))?;
        }
        Ok(())
    }
}

/// Circuit breaker configuration for one dependency
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerComponentConfig {
    /// Consecutive failures before opening
    pub failure_threshold: u32,

    /// Consecutive half-open successes before closing
    pub success_threshold: u32,

    /// Time spent open before a probe is admitted (milliseconds)
    pub reset_timeout_ms: u64,
}

impl Default for CircuitBreakerComponentConfig {
    fn default() -> Self {
        Self {
            failure_threshold: constants::resilience::DEFAULT_FAILURE_THRESHOLD,
            success_threshold: constants::resilience::DEFAULT_SUCCESS_THRESHOLD,
            reset_timeout_ms: constants::resilience::DEFAULT_RESET_TIMEOUT_MS,
        }
    }
}

impl CircuitBreakerComponentConfig {
    /// Convert to resilience module's format
    pub fn to_resilience_config(&self) -> crate::resilience::CircuitBreakerConfig {
        crate::resilience::CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            success_threshold: self.success_threshold,
            reset_timeout: Duration::from_millis(self.reset_timeout_ms),
        }
    }

    pub fn validate(&self, field_prefix: &str) -> ConfigResult<()> {
        self.to_resilience_config()
            .validate()
            .map_err(|e| ConfigurationError::validation_error(format!("{field_prefix}: {e}")))
    }
}

/// Tiered cache configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Durable backend address; `None` means local-only
    pub redis_url: Option<String>,

    /// Namespace prepended to every key in both tiers
    pub key_prefix: String,

    /// TTL used when a caller passes a zero TTL
    pub default_ttl_seconds: u64,

    /// Bound on the initial durable-backend connection attempt
    pub connect_timeout_ms: u64,

    /// Optional breaker guarding durable-tier calls after startup
    pub durable_circuit_breaker: Option<CircuitBreakerComponentConfig>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            key_prefix: constants::cache::DEFAULT_KEY_PREFIX.to_string(),
            default_ttl_seconds: constants::cache::DEFAULT_TTL_SECONDS,
            connect_timeout_ms: constants::cache::DEFAULT_CONNECT_TIMEOUT_MS,
            durable_circuit_breaker: None,
        }
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_seconds)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.default_ttl_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "cache.default_ttl_seconds",
                self.default_ttl_seconds,
                "default TTL must be greater than 0",
            ));
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "cache.connect_timeout_ms",
                self.connect_timeout_ms,
                "connect timeout must be greater than 0",
            ));
        }
        if let Some(cb) = &self.durable_circuit_breaker {
            cb.validate("cache.durable_circuit_breaker")?;
        }
        Ok(())
    }
}

/// Parallel/waterfall aggregator configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Per-fetch bound when a request has no override (0 = default)
    pub default_timeout_ms: u64,

    /// Signal the first failure (parallel) or stop at it (waterfall)
    pub fail_fast: bool,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: constants::aggregation::DEFAULT_TIMEOUT_MS,
            fail_fast: false,
        }
    }
}

impl AggregatorConfig {
    /// Default timeout as Duration, substituting the default for zero
    pub fn default_timeout(&self) -> Duration {
        if self.default_timeout_ms == 0 {
            Duration::from_millis(constants::aggregation::DEFAULT_TIMEOUT_MS)
        } else {
            Duration::from_millis(self.default_timeout_ms)
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.default_timeout_ms > 600_000 {
            return Err(ConfigurationError::invalid_value(
                "aggregator.default_timeout_ms",
                self.default_timeout_ms,
                "default timeout should not exceed 10 minutes",
            ));
        }
        Ok(())
    }
}
