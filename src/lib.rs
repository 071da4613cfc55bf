#![allow(clippy::doc_markdown)] // Allow technical terms like FailFast, PSETEX in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # BFF Aggregation Core
//!
//! Resilience and composition primitives for backend-for-frontend services:
//! one inbound request fans out to several downstream calls safely, with
//! bounded blast radius.
//!
//! ## Overview
//!
//! - **Request batching**: concurrent same-key lookups collapse into one
//!   downstream batch call, with id-level dedup inside a batch
//! - **Circuit breaking**: per-dependency Closed/Open/HalfOpen guard with a
//!   single atomic half-open probe
//! - **Tiered caching**: durable Redis tier plus an always-available local
//!   tier, degrading silently when the durable tier is unreachable
//! - **Parallel/waterfall aggregation**: order-preserving fan-out with
//!   per-fetch deadlines, or a dependent chain of steps
//! - **Response transformation**: pure pick/omit/rename/flatten/merge helpers
//!
//! ## Module Organization
//!
//! - [`batching`] - Request batcher and its one-shot promise
//! - [`resilience`] - Circuit breaker, registry and metrics
//! - [`cache`] - Two-tier cache manager and backends
//! - [`aggregation`] - Parallel and waterfall fetch orchestration
//! - [`transform`] - Record shaping utilities
//! - [`config`] - Typed configuration and the optional file/env loader
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bffgen_aggregation::aggregation::{FetchRequest, ParallelAggregator};
//! use bffgen_aggregation::resilience::CircuitBreakerManager;
//! use bffgen_aggregation::AggregationError;
//!
//! # async fn example() {
//! let breakers = CircuitBreakerManager::default();
//! let aggregator = ParallelAggregator::default();
//!
//! let movies = breakers.get_circuit_breaker("movies");
//! let results = aggregator
//!     .fetch_parallel(vec![
//!         FetchRequest::new("movies", move || async move {
//!             movies
//!                 .execute(|| async { Ok::<_, AggregationError>("[]".to_string()) })
//!                 .await
//!                 .map_err(AggregationError::from)
//!         }),
//!         FetchRequest::new("profile", || async { Ok("{}".to_string()) }),
//!     ])
//!     .await;
//!
//! assert_eq!(results.len(), 2);
//! # }
//! ```

pub mod aggregation;
pub mod batching;
pub mod cache;
pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod resilience;
pub mod transform;

pub use aggregation::{
    FetchRequest, FetchResult, FetchStats, ParallelAggregator, WaterfallRequest,
};
pub use batching::{batch_fn, BatchFn, BatcherStats, Promise, RequestBatcher};
pub use cache::{CacheBackend, CacheManager};
pub use config::{
    AggregationConfig, AggregatorConfig, BatcherConfig, CacheConfig, CircuitBreakerSettings,
    ConfigLoader,
};
pub use error::{AggregationError, AggregationResult};
pub use resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerManager, CircuitState};
pub use transform::{Record, ResponseTransformer};
