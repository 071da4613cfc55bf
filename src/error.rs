//! Error types for the aggregation core.
//!

use std::time::Duration;
use thiserror::Error;

/// Every failure mode a composing caller can observe.
///
/// Payloads are plain strings so one error can be cloned out to every waiter
/// of a shared batch or promise.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregationError {
    #[error("Circuit breaker is open for {component}")]
    CircuitOpen { component: String },
    #[error("Batch execution failed: {0}")]
    BatchExecution(String),
    #[error("No result found for id: {id}")]
    ResultNotFound { id: String },
    #[error("Batch for key '{key}' was cleared before it executed")]
    BatchCancelled { key: String },
    #[error("Cache miss for key: {key}")]
    CacheMiss { key: String },
    #[error("Request to '{service}' timed out after {timeout_ms}ms")]
    Timeout { service: String, timeout_ms: u64 },
    #[error("Downstream error: {0}")]
    Downstream(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AggregationError {
    /// Wrap any displayable downstream failure verbatim.
    pub fn downstream(error: impl std::fmt::Display) -> Self {
        AggregationError::Downstream(error.to_string())
    }

    pub fn timeout(service: impl Into<String>, timeout: Duration) -> Self {
        AggregationError::Timeout {
            service: service.into(),
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    pub fn is_cache_miss(&self) -> bool {
        matches!(self, AggregationError::CacheMiss { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, AggregationError::Timeout { .. })
    }

    pub fn is_circuit_open(&self) -> bool {
        matches!(self, AggregationError::CircuitOpen { .. })
    }
}

impl From<serde_json::Error> for AggregationError {
    fn from(error: serde_json::Error) -> Self {
        AggregationError::Serialization(format!("JSON serialization error: {error}"))
    }
}

impl From<crate::config::ConfigurationError> for AggregationError {
    fn from(error: crate::config::ConfigurationError) -> Self {
        AggregationError::Configuration(error.to_string())
    }
}

impl From<crate::resilience::CircuitBreakerError<AggregationError>> for AggregationError {
    fn from(error: crate::resilience::CircuitBreakerError<AggregationError>) -> Self {
        match error {
            crate::resilience::CircuitBreakerError::CircuitOpen { component } => {
                AggregationError::CircuitOpen { component }
            }
            crate::resilience::CircuitBreakerError::OperationFailed(inner) => inner,
        }
    }
}

pub type AggregationResult<T> = std::result::Result<T, AggregationError>;
