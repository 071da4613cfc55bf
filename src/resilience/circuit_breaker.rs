//! # Circuit Breaker Implementation
//!
//! Provides failure isolation for one downstream dependency. Classic three
//! states: Closed (normal operation), Open (failing fast) and Half-Open
//! (testing recovery).
//!
//! All state and counters live behind a single lock that is only held for
//! in-memory bookkeeping, never while the guarded operation runs. Moving from
//! Open to Half-Open and admitting the probe happen in the same critical
//! section, so at most one probe is in flight at a time; callers arriving
//! while a probe runs are rejected as if the circuit were still open.

use crate::resilience::{CircuitBreakerConfig, CircuitBreakerSnapshot, CircuitStats};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CircuitState {
    /// Normal operation - all calls are allowed through
    Closed,
    /// Failure mode - all calls fail fast without executing
    Open,
    /// Testing recovery - a single probe call is admitted at a time
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Errors that can occur during circuit breaker operation
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    /// Circuit is open, the operation was not executed
    #[error("Circuit breaker is open for {component}")]
    CircuitOpen { component: String },

    /// Operation ran and failed; the failure was recorded
    #[error("Operation failed: {0}")]
    OperationFailed(E),
}

impl<E> CircuitBreakerError<E> {
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, CircuitBreakerError::CircuitOpen { .. })
    }
}

/// Internal phase; `Open` always carries its next attempt time
#[derive(Debug, Clone, Copy)]
enum Phase {
    Closed,
    Open { next_attempt: Instant },
    HalfOpen,
}

impl Phase {
    fn public(&self) -> CircuitState {
        match self {
            Phase::Closed => CircuitState::Closed,
            Phase::Open { .. } => CircuitState::Open,
            Phase::HalfOpen => CircuitState::HalfOpen,
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    phase: Phase,
    failure_count: u32,
    success_count: u32,
    probe_in_flight: bool,
    stats: CircuitStats,
}

/// How a call was let through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Rejected,
    Normal,
    Probe,
}

/// Releases the half-open probe slot if the probe future is dropped early
struct ProbeGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.state.lock().probe_in_flight = false;
            debug!(component = %self.breaker.name, "Half-open probe abandoned, slot released");
        }
    }
}

/// Failure-isolation guard for a single logical dependency
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Component name for logging and metrics
    name: String,

    /// Configuration parameters
    config: CircuitBreakerConfig,

    /// State machine and counters under one lock
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given name and configuration
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        info!(
            component = %name,
            failure_threshold = config.failure_threshold,
            success_threshold = config.success_threshold,
            reset_timeout_ms = config.reset_timeout.as_millis() as u64,
            "Circuit breaker initialized"
        );

        Self {
            name,
            config,
            state: Mutex::new(BreakerState {
                phase: Phase::Closed,
                failure_count: 0,
                success_count: 0,
                probe_in_flight: false,
                stats: CircuitStats::default(),
            }),
        }
    }

    /// Get current circuit state
    pub fn state(&self) -> CircuitState {
        self.state.lock().phase.public()
    }

    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    pub fn is_closed(&self) -> bool {
        self.state() == CircuitState::Closed
    }

    pub fn is_half_open(&self) -> bool {
        self.state() == CircuitState::HalfOpen
    }

    /// Get component name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Execute an operation with circuit breaker protection
    ///
    /// Rejects with `CircuitOpen` without running `operation` while the
    /// circuit is open and its cooldown has not elapsed.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let admission = self.admit();
        if admission == Admission::Rejected {
            return Err(CircuitBreakerError::CircuitOpen {
                component: self.name.clone(),
            });
        }

        let mut guard = ProbeGuard {
            breaker: self,
            armed: admission == Admission::Probe,
        };

        let start_time = Instant::now();
        let result = operation().await;
        let duration = start_time.elapsed();

        guard.armed = false;
        drop(guard);

        match &result {
            Ok(_) => {
                debug!(
                    component = %self.name,
                    duration_ms = duration.as_millis() as u64,
                    "Operation succeeded"
                );
                self.record_success(admission == Admission::Probe);
            }
            Err(_) => {
                warn!(
                    component = %self.name,
                    duration_ms = duration.as_millis() as u64,
                    "Operation failed"
                );
                self.record_failure(admission == Admission::Probe);
            }
        }

        result.map_err(CircuitBreakerError::OperationFailed)
    }

    /// Execute with a substitute result when the breaker rejects the call
    ///
    /// The fallback only runs for `CircuitOpen`; failures of `operation`
    /// itself are returned unchanged. Fallback outcomes are not recorded.
    pub async fn execute_with_fallback<F, Fut, G, GFut, T, E>(
        &self,
        operation: F,
        fallback: G,
    ) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        G: FnOnce() -> GFut,
        GFut: Future<Output = Result<T, E>>,
    {
        match self.execute(operation).await {
            Err(CircuitBreakerError::CircuitOpen { .. }) => {
                debug!(component = %self.name, "Circuit open, serving fallback");
                fallback().await.map_err(CircuitBreakerError::OperationFailed)
            }
            other => other,
        }
    }

    /// Check-and-admit in one critical section
    fn admit(&self) -> Admission {
        let mut state = self.state.lock();
        state.stats.total += 1;

        let phase = state.phase;
        match phase {
            Phase::Closed => Admission::Normal,
            Phase::Open { next_attempt } => {
                if Instant::now() >= next_attempt {
                    state.phase = Phase::HalfOpen;
                    state.success_count = 0;
                    state.probe_in_flight = true;
                    drop(state);
                    info!(
                        component = %self.name,
                        success_threshold = self.config.success_threshold,
                        "Circuit breaker half-open (testing recovery)"
                    );
                    Admission::Probe
                } else {
                    state.stats.rejected += 1;
                    Admission::Rejected
                }
            }
            Phase::HalfOpen => {
                if state.probe_in_flight {
                    state.stats.rejected += 1;
                    Admission::Rejected
                } else {
                    state.probe_in_flight = true;
                    Admission::Probe
                }
            }
        }
    }

    fn record_success(&self, was_probe: bool) {
        let mut state = self.state.lock();
        state.stats.succeeded += 1;
        if was_probe {
            state.probe_in_flight = false;
        }

        let phase = state.phase;
        match phase {
            Phase::Closed => {
                state.failure_count = 0;
            }
            Phase::HalfOpen if was_probe => {
                state.success_count += 1;
                if state.success_count >= self.config.success_threshold {
                    state.phase = Phase::Closed;
                    state.failure_count = 0;
                    state.success_count = 0;
                    state.stats.closed += 1;
                    let total = state.stats.total;
                    drop(state);
                    info!(
                        component = %self.name,
                        total_calls = total,
                        "Circuit breaker closed (recovered)"
                    );
                }
            }
            // Stragglers admitted before the trip say nothing about recovery
            Phase::HalfOpen | Phase::Open { .. } => {}
        }
    }

    fn record_failure(&self, was_probe: bool) {
        let mut state = self.state.lock();
        state.stats.failed += 1;
        if was_probe {
            state.probe_in_flight = false;
        }

        let phase = state.phase;
        match phase {
            Phase::Closed => {
                state.failure_count += 1;
                if state.failure_count >= self.config.failure_threshold {
                    let failures = state.failure_count;
                    self.trip_open(&mut state);
                    drop(state);
                    error!(
                        component = %self.name,
                        consecutive_failures = failures,
                        failure_threshold = self.config.failure_threshold,
                        reset_timeout_ms = self.config.reset_timeout.as_millis() as u64,
                        "Circuit breaker opened (failing fast)"
                    );
                }
            }
            Phase::HalfOpen if was_probe => {
                self.trip_open(&mut state);
                drop(state);
                error!(component = %self.name, "Half-open probe failed, circuit breaker reopened");
            }
            Phase::HalfOpen | Phase::Open { .. } => {}
        }
    }

    fn trip_open(&self, state: &mut BreakerState) {
        let now = Instant::now();
        let next_attempt = now.checked_add(self.config.reset_timeout).unwrap_or_else(|| {
            now + std::time::Duration::from_secs(crate::constants::resilience::MAX_OPEN_SECONDS)
        });
        state.phase = Phase::Open { next_attempt };
        state.failure_count = 0;
        state.success_count = 0;
        state.stats.opened += 1;
    }

    /// Force circuit to open state (for emergency situations)
    pub fn force_open(&self) {
        warn!(component = %self.name, "Circuit breaker forced open");
        let mut state = self.state.lock();
        state.probe_in_flight = false;
        self.trip_open(&mut state);
    }

    /// Force circuit to closed state and clear counters
    pub fn reset(&self) {
        warn!(component = %self.name, "Circuit breaker reset to closed");
        let mut state = self.state.lock();
        state.phase = Phase::Closed;
        state.failure_count = 0;
        state.success_count = 0;
        state.probe_in_flight = false;
        state.stats.closed += 1;
    }

    /// Cumulative counters
    pub fn stats(&self) -> CircuitStats {
        self.state.lock().stats
    }

    /// Current state, counters and remaining cooldown
    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let state = self.state.lock();
        let phase = state.phase;
        let next_attempt_in = match phase {
            Phase::Open { next_attempt } => {
                Some(next_attempt.saturating_duration_since(Instant::now()))
            }
            _ => None,
        };

        CircuitBreakerSnapshot {
            name: self.name.clone(),
            state: state.phase.public(),
            failure_count: state.failure_count,
            success_count: state.success_count,
            next_attempt_in,
            stats: state.stats,
        }
    }

    /// Check if circuit is healthy (closed state with low failure rate)
    pub fn is_healthy(&self) -> bool {
        let state = self.state.lock();
        if !matches!(state.phase, Phase::Closed) {
            return false;
        }

        let executed = state.stats.succeeded + state.stats.failed;
        if executed < crate::constants::resilience::HEALTH_MIN_CALLS {
            // Too few calls to determine health
            return true;
        }

        state.stats.failure_rate() < crate::constants::resilience::HEALTHY_FAILURE_RATE
    }
}
