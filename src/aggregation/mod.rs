//! # Aggregation Module
//!
//! Orchestrates named downstream fetches either concurrently
//! (`fetch_parallel`) or as a dependent chain (`fetch_waterfall`), and offers
//! pure helpers for summarizing the resulting `FetchResult` set.

pub mod parallel;
pub mod results;

pub use parallel::{FailureNotice, FetchFuture, FetchRequest, ParallelAggregator, WaterfallRequest};
pub use results::{
    failed_results, find_result, get_data, max_duration, results_to_map, successful_results,
    total_duration, FetchResult, FetchStats,
};
