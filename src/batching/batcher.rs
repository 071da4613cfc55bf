//! # Request Batcher
//!
//! Coalesces concurrent lookups that share a batch key into one downstream
//! call. The first caller for a key opens a batch and starts its window
//! timer; later callers join it, and callers asking for an id already pending
//! share that id's promise. The batch is dispatched when the window closes or
//! as soon as it holds `max_batch_size` ids, whichever comes first.
//!
//! Locking: the key registry has one coarse lock, each batch has its own lock
//! over its ids and promises. Neither is held while the batch function runs.

use crate::batching::Promise;
use crate::config::BatcherConfig;
use crate::error::{AggregationError, AggregationResult};
use crate::logging::{log_batch_operation, log_error};
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

/// Results of one batch call, paired with the id each one answers
pub type BatchResults<V> = HashMap<String, V>;

/// Downstream call receiving every pending id of a batch
pub type BatchFn<V> =
    Arc<dyn Fn(Vec<String>) -> BoxFuture<'static, AggregationResult<BatchResults<V>>> + Send + Sync>;

/// Wrap an async closure as a `BatchFn`
pub fn batch_fn<V, F, Fut>(f: F) -> BatchFn<V>
where
    F: Fn(Vec<String>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AggregationResult<BatchResults<V>>> + Send + 'static,
{
    Arc::new(move |ids| f(ids).boxed())
}

/// Pending-count view of one open batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchInfo {
    pub key: String,
    pub pending: usize,
}

/// Observability snapshot of the batcher
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatcherStats {
    pub active_batches: usize,
    pub total_pending_requests: usize,
    pub batches: Vec<BatchInfo>,
}

struct BatchContents<V> {
    ids: Vec<String>,
    promises: HashMap<String, Arc<Promise<V>>>,
    timer: Option<JoinHandle<()>>,
    /// Set once the batch has been taken for dispatch or cancelled
    settled: bool,
}

struct PendingBatch<V> {
    batch_id: Uuid,
    key: String,
    batch_fn: BatchFn<V>,
    contents: Mutex<BatchContents<V>>,
}

struct BatcherInner<V> {
    batches: Mutex<HashMap<String, Arc<PendingBatch<V>>>>,
    batch_window: Duration,
    max_batch_size: usize,
}

/// Coalesces concurrent same-key requests into batch calls
///
/// Cheap to clone; clones share the same registry.
pub struct RequestBatcher<V> {
    inner: Arc<BatcherInner<V>>,
}

impl<V> Clone for RequestBatcher<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> std::fmt::Debug for RequestBatcher<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestBatcher")
            .field("batch_window", &self.inner.batch_window)
            .field("max_batch_size", &self.inner.max_batch_size)
            .field("active_batches", &self.inner.batches.lock().len())
            .finish()
    }
}

impl<V> RequestBatcher<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(config: BatcherConfig) -> Self {
        Self {
            inner: Arc::new(BatcherInner {
                batches: Mutex::new(HashMap::new()),
                batch_window: config.batch_window(),
                max_batch_size: config.effective_max_batch_size(),
            }),
        }
    }

    pub fn batch_window(&self) -> Duration {
        self.inner.batch_window
    }

    pub fn max_batch_size(&self) -> usize {
        self.inner.max_batch_size
    }

    /// Request `id` through the batch for `key` and wait for its result
    ///
    /// `batch_fn` is only used when this call opens a new batch; joiners
    /// share the function of the batch they join.
    pub async fn batch(&self, key: &str, batch_fn: BatchFn<V>, id: &str) -> AggregationResult<V> {
        let (pending, promise, flush_now) = {
            let mut batches = self.inner.batches.lock();
            let pending = match batches.get(key) {
                Some(existing) => Arc::clone(existing),
                None => {
                    let created = self.open_batch(key, batch_fn);
                    batches.insert(key.to_string(), Arc::clone(&created));
                    created
                }
            };

            let mut contents = pending.contents.lock();
            drop(batches);

            let (promise, flush_now) = match contents.promises.get(id) {
                Some(shared) => (Arc::clone(shared), false),
                None => {
                    let promise = Arc::new(Promise::new());
                    contents.promises.insert(id.to_string(), Arc::clone(&promise));
                    contents.ids.push(id.to_string());

                    let full = contents.ids.len() >= self.inner.max_batch_size;
                    if full {
                        // Never abort here: the timer may already be dispatching.
                        // A still-sleeping timer wakes, sees `settled`, and exits.
                        contents.timer = None;
                    }
                    (promise, full)
                }
            };
            drop(contents);
            (pending, promise, flush_now)
        };

        if flush_now {
            debug!(
                key = %pending.key,
                batch_id = %pending.batch_id,
                max_batch_size = self.inner.max_batch_size,
                "Batch full, dispatching immediately"
            );
            self.inner.execute_batch(&pending).await;
        }

        promise.wait().await
    }

    /// Create a batch and arm its window timer; caller holds the registry lock
    fn open_batch(&self, key: &str, batch_fn: BatchFn<V>) -> Arc<PendingBatch<V>> {
        let pending = Arc::new(PendingBatch {
            batch_id: Uuid::new_v4(),
            key: key.to_string(),
            batch_fn,
            contents: Mutex::new(BatchContents {
                ids: Vec::new(),
                promises: HashMap::new(),
                timer: None,
                settled: false,
            }),
        });

        let inner = Arc::clone(&self.inner);
        let scheduled = Arc::clone(&pending);
        let window = self.inner.batch_window;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            inner.execute_batch(&scheduled).await;
        });
        pending.contents.lock().timer = Some(timer);

        debug!(
            key = key,
            batch_id = %pending.batch_id,
            window_ms = window.as_millis() as u64,
            "Opened batch"
        );
        pending
    }

    /// Cancel the pending batch for `key`
    ///
    /// Waiters of the discarded batch resolve with `BatchCancelled`.
    pub fn clear(&self, key: &str) {
        let removed = self.inner.batches.lock().remove(key);
        if let Some(pending) = removed {
            self.inner.cancel_batch(&pending);
        }
    }

    /// Cancel every pending batch
    pub fn clear_all(&self) {
        let drained: Vec<Arc<PendingBatch<V>>> = {
            let mut batches = self.inner.batches.lock();
            batches.drain().map(|(_, pending)| pending).collect()
        };
        for pending in drained {
            self.inner.cancel_batch(&pending);
        }
    }

    /// Active batch count and per-key pending counts
    pub fn stats(&self) -> BatcherStats {
        let batches = self.inner.batches.lock();
        let mut infos: Vec<BatchInfo> = batches
            .iter()
            .map(|(key, pending)| BatchInfo {
                key: key.clone(),
                pending: pending.contents.lock().ids.len(),
            })
            .collect();
        infos.sort_by(|a, b| a.key.cmp(&b.key));

        BatcherStats {
            active_batches: batches.len(),
            total_pending_requests: infos.iter().map(|info| info.pending).sum(),
            batches: infos,
        }
    }
}

impl<V> Default for RequestBatcher<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(BatcherConfig::default())
    }
}

/// Fails any waiter still unresolved when a dispatch is dropped mid-flight
///
/// Covers a caller cancelled while flushing a full batch inline.
struct DispatchGuard<'a, V> {
    key: &'a str,
    promises: Vec<Arc<Promise<V>>>,
}

impl<V> Drop for DispatchGuard<'_, V> {
    fn drop(&mut self) {
        let mut abandoned = 0usize;
        for promise in &self.promises {
            if promise.resolve_err(AggregationError::BatchExecution(format!(
                "dispatch for key '{}' was dropped before completing",
                self.key
            ))) {
                abandoned += 1;
            }
        }
        if abandoned > 0 {
            warn!(key = %self.key, abandoned = abandoned, "Batch dispatch dropped mid-flight");
        }
    }
}

impl<V> BatcherInner<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Dispatch `pending` at most once and resolve every promise it holds
    async fn execute_batch(&self, pending: &Arc<PendingBatch<V>>) {
        {
            let mut batches = self.batches.lock();
            if batches
                .get(&pending.key)
                .is_some_and(|current| Arc::ptr_eq(current, pending))
            {
                batches.remove(&pending.key);
            }
        }

        let (ids, promises) = {
            let mut contents = pending.contents.lock();
            if contents.settled {
                return;
            }
            contents.settled = true;
            contents.timer = None;
            (
                std::mem::take(&mut contents.ids),
                std::mem::take(&mut contents.promises),
            )
        };

        let batch_size = ids.len();
        let guard = DispatchGuard {
            key: &pending.key,
            promises: promises.values().cloned().collect(),
        };
        log_batch_operation("dispatch", &pending.key, batch_size, "started", None);

        let outcome = AssertUnwindSafe((pending.batch_fn)(ids))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(mut results)) => {
                let mut missing = 0usize;
                for (id, promise) in promises {
                    match results.remove(&id) {
                        Some(value) => {
                            promise.resolve_ok(value);
                        }
                        None => {
                            missing += 1;
                            promise.resolve_err(AggregationError::ResultNotFound { id });
                        }
                    }
                }
                log_batch_operation(
                    "dispatch",
                    &pending.key,
                    batch_size,
                    "completed",
                    (missing > 0).then_some("some ids had no result"),
                );
            }
            Ok(Err(error)) => {
                warn!(
                    key = %pending.key,
                    batch_id = %pending.batch_id,
                    batch_size = batch_size,
                    error = %error,
                    "Batch function failed, failing every pending request"
                );
                for promise in promises.into_values() {
                    promise.resolve_err(error.clone());
                }
            }
            Err(_) => {
                let error = AggregationError::BatchExecution(format!(
                    "batch function for key '{}' panicked",
                    pending.key
                ));
                log_error(
                    "batcher",
                    "dispatch",
                    &error.to_string(),
                    Some(&format!("batch_id={} batch_size={batch_size}", pending.batch_id)),
                );
                for promise in promises.into_values() {
                    promise.resolve_err(error.clone());
                }
            }
        }
        drop(guard);
    }

    fn cancel_batch(&self, pending: &Arc<PendingBatch<V>>) {
        let promises = {
            let mut contents = pending.contents.lock();
            if contents.settled {
                return;
            }
            contents.settled = true;
            if let Some(timer) = contents.timer.take() {
                timer.abort();
            }
            contents.ids.clear();
            std::mem::take(&mut contents.promises)
        };

        log_batch_operation("clear", &pending.key, promises.len(), "cancelled", None);
        for promise in promises.into_values() {
            promise.resolve_err(AggregationError::BatchCancelled {
                key: pending.key.clone(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn echo_batch_fn(calls: Arc<AtomicUsize>) -> BatchFn<String> {
        batch_fn(move |ids: Vec<String>| {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(ids
                    .into_iter()
                    .map(|id| (id.clone(), format!("user-{id}")))
                    .collect())
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_coalesces_distinct_ids_into_one_call() {
        let batcher = RequestBatcher::new(BatcherConfig::new(Duration::from_millis(50), 10));
        let calls = Arc::new(AtomicUsize::new(0));
        let f = echo_batch_fn(Arc::clone(&calls));

        let results = futures::future::join_all((0..5).map(|i| {
            let batcher = batcher.clone();
            let f = Arc::clone(&f);
            async move { batcher.batch("users", f, &i.to_string()).await }
        }))
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        for (i, result) in results.into_iter().enumerate() {
            assert_eq!(result.unwrap(), format!("user-{i}"));
        }
        assert_eq!(batcher.stats().active_batches, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_ids_share_promise() {
        let batcher = RequestBatcher::new(BatcherConfig::new(Duration::from_millis(20), 10));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&seen);
        let f = batch_fn(move |ids: Vec<String>| {
            let recorded = Arc::clone(&recorded);
            async move {
                recorded.lock().push(ids.clone());
                Ok(ids.into_iter().map(|id| (id, 7u32)).collect())
            }
        });

        let (a, b) = tokio::join!(
            batcher.batch("movies", Arc::clone(&f), "42"),
            batcher.batch("movies", Arc::clone(&f), "42"),
        );

        assert_eq!(a.unwrap(), 7);
        assert_eq!(b.unwrap(), 7);
        assert_eq!(*seen.lock(), vec![vec!["42".to_string()]]);
    }

    #[tokio::test]
    async fn test_size_limit_flushes_before_window() {
        let batcher = RequestBatcher::new(BatcherConfig::new(Duration::from_millis(500), 2));
        let calls = Arc::new(AtomicUsize::new(0));
        let f = echo_batch_fn(Arc::clone(&calls));

        let started = tokio::time::Instant::now();
        let (a, b) = tokio::join!(
            batcher.batch("users", Arc::clone(&f), "1"),
            batcher.batch("users", Arc::clone(&f), "2"),
        );

        assert!(started.elapsed() < Duration::from_millis(250));
        assert_eq!(a.unwrap(), "user-1");
        assert_eq!(b.unwrap(), "user-2");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_result_fails_only_that_id() {
        let batcher = RequestBatcher::new(BatcherConfig::new(Duration::from_millis(10), 10));
        let f = batch_fn(|ids: Vec<String>| async move {
            Ok(ids
                .into_iter()
                .filter(|id| id != "ghost")
                .map(|id| (id, true))
                .collect())
        });

        let (found, missing) = tokio::join!(
            batcher.batch("flags", Arc::clone(&f), "real"),
            batcher.batch("flags", Arc::clone(&f), "ghost"),
        );

        assert_eq!(found, Ok(true));
        assert_eq!(
            missing,
            Err(AggregationError::ResultNotFound {
                id: "ghost".to_string()
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_failure_fails_every_waiter() {
        let batcher = RequestBatcher::<String>::new(BatcherConfig::new(Duration::from_millis(10), 10));
        let f = batch_fn(|_ids: Vec<String>| async move {
            Err(AggregationError::BatchExecution("upstream 500".to_string()))
        });

        let (a, b) = tokio::join!(
            batcher.batch("users", Arc::clone(&f), "1"),
            batcher.batch("users", Arc::clone(&f), "2"),
        );

        let expected = Err(AggregationError::BatchExecution("upstream 500".to_string()));
        assert_eq!(a, expected);
        assert_eq!(b, expected);
    }

    fn explode(_ids: Vec<String>) -> AggregationResult<BatchResults<String>> {
        panic!("bad batch function")
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_batch_fn_does_not_strand_waiters() {
        let batcher = RequestBatcher::<String>::new(BatcherConfig::new(Duration::from_millis(10), 10));
        let f: BatchFn<String> = batch_fn(|ids: Vec<String>| async move { explode(ids) });

        let result = batcher.batch("users", f, "1").await;
        assert!(matches!(result, Err(AggregationError::BatchExecution(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_distinct_keys_batch_independently() {
        let batcher = RequestBatcher::new(BatcherConfig::new(Duration::from_millis(10), 10));
        let calls = Arc::new(AtomicUsize::new(0));
        let f = echo_batch_fn(Arc::clone(&calls));

        let (a, b) = tokio::join!(
            batcher.batch("users", Arc::clone(&f), "1"),
            batcher.batch("admins", Arc::clone(&f), "1"),
        );

        assert_eq!(a.unwrap(), "user-1");
        assert_eq!(b.unwrap(), "user-1");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_resolves_stranded_waiters_and_reports_stats() {
        let batcher = RequestBatcher::new(BatcherConfig::new(Duration::from_secs(60), 10));
        let calls = Arc::new(AtomicUsize::new(0));
        let f = echo_batch_fn(Arc::clone(&calls));

        let waiter = {
            let batcher = batcher.clone();
            let f = Arc::clone(&f);
            tokio::spawn(async move { batcher.batch("users", f, "1").await })
        };
        let other = {
            let batcher = batcher.clone();
            let f = Arc::clone(&f);
            tokio::spawn(async move { batcher.batch("orders", f, "9").await })
        };
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        let stats = batcher.stats();
        assert_eq!(stats.active_batches, 2);
        assert_eq!(stats.total_pending_requests, 2);
        assert_eq!(
            stats.batches[0],
            BatchInfo {
                key: "orders".to_string(),
                pending: 1
            }
        );

        batcher.clear("users");
        assert_eq!(
            waiter.await.unwrap(),
            Err(AggregationError::BatchCancelled {
                key: "users".to_string()
            })
        );

        batcher.clear_all();
        assert!(matches!(
            other.await.unwrap(),
            Err(AggregationError::BatchCancelled { .. })
        ));
        assert_eq!(batcher.stats(), BatcherStats::default());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_inline_flush_fails_other_waiters() {
        let batcher: RequestBatcher<String> =
            RequestBatcher::new(BatcherConfig::new(Duration::from_secs(5), 2));
        let hanging = batch_fn(|_ids: Vec<String>| async {
            std::future::pending::<AggregationResult<BatchResults<String>>>().await
        });

        let waiter = {
            let batcher = batcher.clone();
            let f = Arc::clone(&hanging);
            tokio::spawn(async move { batcher.batch("users", f, "1").await })
        };
        tokio::task::yield_now().await;

        // Second id fills the batch and dispatches inline; the caller gives up
        let flusher = tokio::time::timeout(
            Duration::from_millis(10),
            batcher.batch("users", Arc::clone(&hanging), "2"),
        )
        .await;
        assert!(flusher.is_err());

        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(AggregationError::BatchExecution(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_timer_after_size_flush_is_a_no_op() {
        let batcher = RequestBatcher::new(BatcherConfig::new(Duration::from_millis(20), 2));
        let calls = Arc::new(AtomicUsize::new(0));
        let f = echo_batch_fn(Arc::clone(&calls));

        let (a, b) = tokio::join!(
            batcher.batch("users", Arc::clone(&f), "1"),
            batcher.batch("users", Arc::clone(&f), "2"),
        );
        assert_eq!(a.unwrap(), "user-1");
        assert_eq!(b.unwrap(), "user-2");

        // The detached window timer of the flushed batch fires here
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(batcher.stats().active_batches, 0);

        let next = batcher.batch("users", Arc::clone(&f), "3").await;
        assert_eq!(next.unwrap(), "user-3");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
