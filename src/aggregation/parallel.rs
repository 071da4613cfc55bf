//! # Parallel and Waterfall Aggregation
//!
//! Fan-out/fan-in over named fetch operations. Every fetch runs under its own
//! deadline (the request's override, else the aggregator default); a timeout,
//! error or panic becomes that fetch's failed `FetchResult` and never reaches
//! its siblings.

use crate::aggregation::FetchResult;
use crate::config::AggregatorConfig;
use crate::constants;
use crate::error::{AggregationError, AggregationResult};
use crate::logging::log_fetch_operation;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, warn};

pub type FetchFuture<T> = BoxFuture<'static, AggregationResult<T>>;

type FetchFn<T> = Box<dyn FnOnce() -> FetchFuture<T> + Send>;
type WaterfallFn<T> = Box<dyn FnOnce(Vec<FetchResult<T>>) -> FetchFuture<T> + Send>;

/// One named, independent fetch
pub struct FetchRequest<T> {
    pub name: String,
    pub timeout: Option<Duration>,
    fetch: FetchFn<T>,
}

impl<T> FetchRequest<T> {
    pub fn new<F, Fut>(name: impl Into<String>, fetch: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = AggregationResult<T>> + Send + 'static,
    {
        Self {
            name: name.into(),
            timeout: None,
            fetch: Box::new(move || fetch().boxed()),
        }
    }

    /// Override the aggregator's default deadline for this fetch
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl<T> std::fmt::Debug for FetchRequest<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchRequest")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// One step of a waterfall; its fetch sees every earlier step's result
pub struct WaterfallRequest<T> {
    pub name: String,
    pub timeout: Option<Duration>,
    fetch: WaterfallFn<T>,
}

impl<T> WaterfallRequest<T> {
    pub fn new<F, Fut>(name: impl Into<String>, fetch: F) -> Self
    where
        F: FnOnce(Vec<FetchResult<T>>) -> Fut + Send + 'static,
        Fut: Future<Output = AggregationResult<T>> + Send + 'static,
    {
        Self {
            name: name.into(),
            timeout: None,
            fetch: Box::new(move |previous| fetch(previous).boxed()),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl<T> std::fmt::Debug for WaterfallRequest<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaterfallRequest")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Raised on the failure channel when FailFast is on
#[derive(Debug, Clone, PartialEq)]
pub struct FailureNotice {
    pub service: String,
    pub error: AggregationError,
}

/// Runs fetches concurrently or as a dependent sequence
#[derive(Debug, Clone)]
pub struct ParallelAggregator {
    default_timeout: Duration,
    fail_fast: bool,
    failures: broadcast::Sender<FailureNotice>,
}

impl ParallelAggregator {
    pub fn new(config: &AggregatorConfig) -> Self {
        let (failures, _) = broadcast::channel(constants::aggregation::FAILURE_CHANNEL_CAPACITY);
        Self {
            default_timeout: config.default_timeout(),
            fail_fast: config.fail_fast,
            failures,
        }
    }

    /// Aggregator with the given default deadline; zero means 30s
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new(&AggregatorConfig {
            default_timeout_ms: timeout.as_millis() as u64,
            ..AggregatorConfig::default()
        })
    }

    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub fn fail_fast(&self) -> bool {
        self.fail_fast
    }

    /// Receive a notice for each failed fetch while FailFast is on
    ///
    /// Notices do not cancel anything still running.
    pub fn subscribe_failures(&self) -> broadcast::Receiver<FailureNotice> {
        self.failures.subscribe()
    }

    fn deadline_for(&self, timeout: Option<Duration>) -> Duration {
        match timeout {
            Some(timeout) if !timeout.is_zero() => timeout,
            _ => self.default_timeout,
        }
    }

    /// Run every request concurrently, one task each
    ///
    /// The returned vector has one result per request, in request order,
    /// whatever order the fetches finished in.
    pub async fn fetch_parallel<T>(&self, requests: Vec<FetchRequest<T>>) -> Vec<FetchResult<T>>
    where
        T: Send + 'static,
    {
        let count = requests.len();
        debug!(requests = count, fail_fast = self.fail_fast, "Starting parallel fetch");

        let handles: Vec<_> = requests
            .into_iter()
            .map(|request| {
                let name = request.name.clone();
                let deadline = self.deadline_for(request.timeout);
                let failures = self.fail_fast.then(|| self.failures.clone());

                let handle = tokio::spawn(async move {
                    let result = run_fetch(&request.name, deadline, (request.fetch)()).await;
                    if let (Some(failures), Some(error)) = (failures, &result.error) {
                        notify_failure(&failures, &result.service, error);
                    }
                    result
                });
                (name, handle)
            })
            .collect();

        let mut results = Vec::with_capacity(count);
        for (name, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(join_error) => {
                    warn!(service = %name, error = %join_error, "Fetch task did not complete");
                    FetchResult::failed(
                        name,
                        AggregationError::Internal(format!("fetch task failed: {join_error}")),
                        Duration::ZERO,
                    )
                }
            };
            results.push(result);
        }
        results
    }

    /// Run requests one after another, each seeing all prior results
    ///
    /// With FailFast the run stops after the first failed step and returns
    /// what it has so far.
    pub async fn fetch_waterfall<T>(
        &self,
        requests: Vec<WaterfallRequest<T>>,
    ) -> Vec<FetchResult<T>>
    where
        T: Clone + Send + 'static,
    {
        let mut results: Vec<FetchResult<T>> = Vec::with_capacity(requests.len());

        for request in requests {
            let deadline = self.deadline_for(request.timeout);
            let fetch = (request.fetch)(results.clone());
            let result = run_fetch(&request.name, deadline, fetch).await;
            let failed = !result.success;

            if failed && self.fail_fast {
                if let Some(error) = &result.error {
                    notify_failure(&self.failures, &result.service, error);
                }
                results.push(result);
                debug!(
                    completed = results.len(),
                    "Waterfall stopped at first failure"
                );
                break;
            }
            results.push(result);
        }
        results
    }
}

impl Default for ParallelAggregator {
    fn default() -> Self {
        Self::new(&AggregatorConfig::default())
    }
}

/// Await one fetch under its deadline, turning a timeout or panic into a failure
async fn run_fetch<T>(service: &str, deadline: Duration, fetch: FetchFuture<T>) -> FetchResult<T> {
    let started = Instant::now();
    let outcome = match tokio::time::timeout(deadline, AssertUnwindSafe(fetch).catch_unwind()).await
    {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(_)) => Err(AggregationError::Internal(format!(
            "fetch '{service}' panicked"
        ))),
        Err(_) => Err(AggregationError::timeout(service, deadline)),
    };
    let elapsed = started.elapsed();

    let result = FetchResult::from_outcome(service, outcome, elapsed);
    match &result.error {
        None => log_fetch_operation(service, true, elapsed, None),
        Some(error) => {
            let message = error.to_string();
            log_fetch_operation(service, false, elapsed, Some(&message));
        }
    }
    result
}

fn notify_failure(failures: &broadcast::Sender<FailureNotice>, service: &str, error: &AggregationError) {
    // No subscribers is fine
    let _ = failures.send(FailureNotice {
        service: service.to_string(),
        error: error.clone(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::{failed_results, successful_results};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn delayed(name: &str, delay_ms: u64, outcome: AggregationResult<String>) -> FetchRequest<String> {
        FetchRequest::new(name, move || async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            outcome
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_results_keep_input_order() {
        let aggregator = ParallelAggregator::with_timeout(Duration::from_secs(5));
        let results = aggregator
            .fetch_parallel(vec![
                delayed("a", 30, Err(AggregationError::downstream("boom"))),
                delayed("b", 20, Ok("b".into())),
                delayed("c", 10, Ok("c".into())),
            ])
            .await;

        let names: Vec<_> = results.iter().map(|r| r.service.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert!(!results[0].success);
        assert_eq!(results[0].error, Some(AggregationError::Downstream("boom".into())));
        assert_eq!(results[2].data.as_deref(), Some("c"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetches_run_concurrently() {
        let aggregator = ParallelAggregator::default();
        let started = Instant::now();
        let results = aggregator
            .fetch_parallel(vec![
                delayed("a", 100, Ok("a".into())),
                delayed("b", 100, Ok("b".into())),
                delayed("c", 100, Ok("c".into())),
            ])
            .await;

        assert!(started.elapsed() < Duration::from_millis(150));
        assert_eq!(successful_results(&results).len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_isolated() {
        let aggregator = ParallelAggregator::with_timeout(Duration::from_secs(5));
        let results = aggregator
            .fetch_parallel(vec![
                delayed("slow", 1_000, Ok("late".into())).with_timeout(Duration::from_millis(50)),
                delayed("fast", 10, Ok("fast".into())),
            ])
            .await;

        assert!(results[0].is_timeout());
        assert_eq!(
            results[0].error,
            Some(AggregationError::Timeout {
                service: "slow".into(),
                timeout_ms: 50
            })
        );
        assert!(results[1].success);
    }

    fn explode() -> AggregationResult<u8> {
        panic!("bad handler")
    }

    #[tokio::test]
    async fn test_panic_becomes_failed_result() {
        let aggregator = ParallelAggregator::default();
        let results = aggregator
            .fetch_parallel(vec![
                FetchRequest::new("broken", || async { explode() }),
                FetchRequest::new("ok", || async { Ok(1u8) }),
            ])
            .await;

        assert_eq!(failed_results(&results).len(), 1);
        assert!(matches!(results[0].error, Some(AggregationError::Internal(_))));
        assert_eq!(results[1].data, Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fail_fast_notifies_without_cancelling() {
        let aggregator = ParallelAggregator::default().with_fail_fast(true);
        let mut failures = aggregator.subscribe_failures();
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);

        let results = aggregator
            .fetch_parallel(vec![
                FetchRequest::new("fails", || async { Err(AggregationError::downstream("500")) }),
                FetchRequest::new("slow", move || async move {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    flag.store(true, Ordering::SeqCst);
                    Ok(())
                }),
            ])
            .await;

        assert!(finished.load(Ordering::SeqCst));
        assert!(results[1].success);
        let notice = failures.recv().await.unwrap();
        assert_eq!(notice.service, "fails");
    }

    #[tokio::test]
    async fn test_waterfall_passes_prior_results() {
        let aggregator = ParallelAggregator::default();
        let results = aggregator
            .fetch_waterfall(vec![
                WaterfallRequest::new("user", |_prior| async { Ok("42".to_string()) }),
                WaterfallRequest::new("orders", |prior: Vec<FetchResult<String>>| async move {
                    let user = prior[0].data.clone().unwrap_or_default();
                    Ok(format!("orders-for-{user}"))
                }),
            ])
            .await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[1].data.as_deref(), Some("orders-for-42"));
    }

    #[tokio::test]
    async fn test_waterfall_fail_fast_returns_partial() {
        let steps = || {
            vec![
                WaterfallRequest::new("a", |_| async { Ok(1) }),
                WaterfallRequest::new("b", |_| async { Err(AggregationError::downstream("no")) }),
                WaterfallRequest::new("c", |prior: Vec<FetchResult<i32>>| async move {
                    Ok(prior.len() as i32)
                }),
            ]
        };

        let strict = ParallelAggregator::default().with_fail_fast(true);
        let partial = strict.fetch_waterfall(steps()).await;
        assert_eq!(partial.len(), 2);
        assert!(!partial[1].success);

        let lenient = ParallelAggregator::default();
        let full = lenient.fetch_waterfall(steps()).await;
        assert_eq!(full.len(), 3);
        assert_eq!(full[2].data, Some(2));
    }

    #[test]
    fn test_zero_timeouts_use_defaults() {
        let aggregator = ParallelAggregator::with_timeout(Duration::ZERO);
        assert_eq!(aggregator.default_timeout(), Duration::from_secs(30));
        assert_eq!(
            aggregator.deadline_for(Some(Duration::ZERO)),
            Duration::from_secs(30)
        );
        assert_eq!(
            aggregator.deadline_for(Some(Duration::from_millis(5))),
            Duration::from_millis(5)
        );
    }
}
