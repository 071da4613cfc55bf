//! # Circuit Breaker Configuration
//!
//! Duration-based configuration consumed by `CircuitBreaker`. For the
//! deserializable, millisecond-valued form see
//! `crate::config::CircuitBreakerComponentConfig`.

use crate::constants;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a single circuit breaker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening circuit
    pub failure_threshold: u32,

    /// Number of consecutive half-open successes to close circuit
    pub success_threshold: u32,

    /// Time to wait in open state before admitting a probe
    pub reset_timeout: Duration,
}

impl CircuitBreakerConfig {
    pub fn new(failure_threshold: u32, success_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            success_threshold,
            reset_timeout,
        }
    }

    /// Tuned for a user-facing downstream API
    pub fn for_external_api() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            reset_timeout: Duration::from_secs(45),
        }
    }

    /// Tuned for a cache backend: trip fast, probe often
    pub fn for_cache_backend() -> Self {
        Self {
            failure_threshold: 3,
            success_threshold: 1,
            reset_timeout: Duration::from_secs(15),
        }
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }

    pub fn with_reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.failure_threshold == 0 {
            return Err("failure_threshold must be greater than 0".to_string());
        }

        if self.failure_threshold > 100 {
            return Err("failure_threshold should not exceed 100".to_string());
        }

        if self.reset_timeout.is_zero() {
            return Err("reset_timeout must be greater than 0".to_string());
        }

        if self.reset_timeout > Duration::from_secs(3600) {
            return Err("reset_timeout should not exceed 1 hour".to_string());
        }

        if self.success_threshold == 0 {
            return Err("success_threshold must be greater than 0".to_string());
        }

        if self.success_threshold > 50 {
            return Err("success_threshold should not exceed 50".to_string());
        }

        Ok(())
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: constants::resilience::DEFAULT_FAILURE_THRESHOLD,
            success_threshold: constants::resilience::DEFAULT_SUCCESS_THRESHOLD,
            reset_timeout: Duration::from_millis(constants::resilience::DEFAULT_RESET_TIMEOUT_MS),
        }
    }
}
