//! # Resilience Module
//!
//! Failure isolation for downstream dependencies. One `CircuitBreaker`
//! guards one logical dependency; `CircuitBreakerManager` hands out a named
//! breaker per dependency so every fetch against the same service shares
//! its failure history.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use bffgen_aggregation::resilience::{CircuitBreaker, CircuitBreakerConfig};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CircuitBreakerConfig {
//!     failure_threshold: 5,
//!     success_threshold: 2,
//!     reset_timeout: Duration::from_secs(30),
//! };
//!
//! let circuit_breaker = CircuitBreaker::new("movies_api", config);
//!
//! let result = circuit_breaker
//!     .execute(|| async { Ok::<&str, String>("payload") })
//!     .await?;
//! # let _ = result;
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;
pub mod config;
pub mod manager;
pub mod metrics;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerError, CircuitState};
pub use config::CircuitBreakerConfig;
pub use manager::CircuitBreakerManager;
pub use metrics::{CircuitBreakerSnapshot, CircuitStats, SystemCircuitBreakerMetrics};
