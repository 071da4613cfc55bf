//! One-shot result cell shared between a single writer and many waiters.

use crate::error::{AggregationError, AggregationResult};
use std::sync::OnceLock;
use tokio::sync::Notify;

/// Pending result for one id in a batch
///
/// Resolved exactly once, with either a value or an error. Any number of
/// tasks may `wait` concurrently, before or after resolution.
#[derive(Debug)]
pub struct Promise<V> {
    cell: OnceLock<AggregationResult<V>>,
    completed: Notify,
}

impl<V> Promise<V> {
    pub fn new() -> Self {
        Self {
            cell: OnceLock::new(),
            completed: Notify::new(),
        }
    }

    /// Store the outcome and wake every waiter
    ///
    /// Returns `false` (and changes nothing) if already resolved.
    pub fn resolve(&self, result: AggregationResult<V>) -> bool {
        if self.cell.set(result).is_err() {
            return false;
        }
        self.completed.notify_waiters();
        true
    }

    pub fn resolve_ok(&self, value: V) -> bool {
        self.resolve(Ok(value))
    }

    pub fn resolve_err(&self, error: AggregationError) -> bool {
        self.resolve(Err(error))
    }

    pub fn is_resolved(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl<V: Clone> Promise<V> {
    /// Suspend until resolved, then return a clone of the outcome
    pub async fn wait(&self) -> AggregationResult<V> {
        loop {
            // Registered before the check so a resolve in between is not missed
            let notified = self.completed.notified();
            if let Some(result) = self.cell.get() {
                return result.clone();
            }
            notified.await;
        }
    }
}

impl<V> Default for Promise<V> {
    fn default() -> Self {
        Self::new()
    }
}
