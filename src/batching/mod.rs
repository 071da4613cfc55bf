//! # Batching Module
//!
//! Request coalescing for N+1-prone lookups. Callers ask for one id at a
//! time; the batcher gathers the ids that arrive within a short window and
//! issues a single downstream call for all of them.

pub mod batcher;
pub mod promise;

pub use batcher::{batch_fn, BatchFn, BatchInfo, BatchResults, BatcherStats, RequestBatcher};
pub use promise::Promise;
