//! Fetch results and the pure helpers that summarize a result set.

use crate::error::{AggregationError, AggregationResult};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// Outcome of one named fetch
///
/// Exactly one of `data`/`error` is set; `success` mirrors which.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResult<T> {
    pub service: String,
    pub data: Option<T>,
    pub error: Option<AggregationError>,
    pub success: bool,
    pub duration: Duration,
}

impl<T> FetchResult<T> {
    pub fn from_outcome(
        service: impl Into<String>,
        outcome: AggregationResult<T>,
        duration: Duration,
    ) -> Self {
        match outcome {
            Ok(data) => Self {
                service: service.into(),
                data: Some(data),
                error: None,
                success: true,
                duration,
            },
            Err(error) => Self::failed(service, error, duration),
        }
    }

    pub fn failed(service: impl Into<String>, error: AggregationError, duration: Duration) -> Self {
        Self {
            service: service.into(),
            data: None,
            error: Some(error),
            success: false,
            duration,
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.error.as_ref().is_some_and(AggregationError::is_timeout)
    }

    pub fn is_circuit_open(&self) -> bool {
        self.error
            .as_ref()
            .is_some_and(AggregationError::is_circuit_open)
    }

    /// Back into a plain `Result`
    pub fn into_result(self) -> AggregationResult<T> {
        match (self.data, self.error) {
            (Some(data), None) => Ok(data),
            (_, Some(error)) => Err(error),
            (None, None) => Err(AggregationError::Internal(format!(
                "result for '{}' carries neither data nor error",
                self.service
            ))),
        }
    }
}

pub fn successful_results<T>(results: &[FetchResult<T>]) -> Vec<&FetchResult<T>> {
    results.iter().filter(|result| result.success).collect()
}

pub fn failed_results<T>(results: &[FetchResult<T>]) -> Vec<&FetchResult<T>> {
    results.iter().filter(|result| !result.success).collect()
}

/// First result for `service`
pub fn find_result<'a, T>(results: &'a [FetchResult<T>], service: &str) -> Option<&'a FetchResult<T>> {
    results.iter().find(|result| result.service == service)
}

/// Data of a successful `service` result, else `fallback`
pub fn get_data<T: Clone>(results: &[FetchResult<T>], service: &str, fallback: T) -> T {
    find_result(results, service)
        .filter(|result| result.success)
        .and_then(|result| result.data.clone())
        .unwrap_or(fallback)
}

/// Successful results keyed by service name
pub fn results_to_map<T: Clone>(results: &[FetchResult<T>]) -> HashMap<String, T> {
    results
        .iter()
        .filter(|result| result.success)
        .filter_map(|result| {
            result
                .data
                .as_ref()
                .map(|data| (result.service.clone(), data.clone()))
        })
        .collect()
}

pub fn total_duration<T>(results: &[FetchResult<T>]) -> Duration {
    results.iter().map(|result| result.duration).sum()
}

pub fn max_duration<T>(results: &[FetchResult<T>]) -> Duration {
    results
        .iter()
        .map(|result| result.duration)
        .max()
        .unwrap_or_default()
}

/// Aggregate counts and timings over a result set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FetchStats {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Total duration divided by `total`, truncated
    pub avg_duration: Duration,
    pub max_duration: Duration,
}

impl FetchStats {
    pub fn from_results<T>(results: &[FetchResult<T>]) -> Self {
        let total = results.len();
        let succeeded = results.iter().filter(|result| result.success).count();
        let avg_duration = if total > 0 {
            let nanos = total_duration(results).as_nanos() / total as u128;
            Duration::from_nanos(nanos as u64)
        } else {
            Duration::ZERO
        };

        Self {
            total,
            succeeded,
            failed: total - succeeded,
            avg_duration,
            max_duration: max_duration(results),
        }
    }
}

impl fmt::Display for FetchStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Total: {}, Succeeded: {}, Failed: {}, Avg: {:?}, Max: {:?}",
            self.total, self.succeeded, self.failed, self.avg_duration, self.max_duration
        )
    }
}
