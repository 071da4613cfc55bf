//! # Circuit Breaker Metrics
//!
//! Cumulative counters and point-in-time snapshots exposed by breakers and
//! aggregated by `CircuitBreakerManager`.

use crate::resilience::CircuitState;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Cumulative counters for one breaker, never reset by state changes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitStats {
    /// Every call attempt, admitted or rejected
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Calls refused without executing
    pub rejected: u64,
    /// Transitions into Open (including forced)
    pub opened: u64,
    /// Transitions into Closed (including resets)
    pub closed: u64,
}

impl CircuitStats {
    /// Failed / executed calls; 0.0 before anything executed
    pub fn failure_rate(&self) -> f64 {
        let executed = self.succeeded + self.failed;
        if executed == 0 {
            0.0
        } else {
            self.failed as f64 / executed as f64
        }
    }
}

/// Point-in-time view of a breaker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    /// Consecutive failures counted while closed
    pub failure_count: u32,
    /// Consecutive probe successes counted while half-open
    pub success_count: u32,
    /// Remaining cooldown; `Some` exactly when the breaker is open
    pub next_attempt_in: Option<Duration>,
    pub stats: CircuitStats,
}

/// Snapshot of every breaker owned by a manager
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemCircuitBreakerMetrics {
    pub circuit_breakers: HashMap<String, CircuitBreakerSnapshot>,
}

impl SystemCircuitBreakerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_circuit_breaker(&mut self, snapshot: CircuitBreakerSnapshot) {
        self.circuit_breakers.insert(snapshot.name.clone(), snapshot);
    }

    pub fn count_by_state(&self) -> HashMap<CircuitState, usize> {
        let mut counts = HashMap::new();
        for snapshot in self.circuit_breakers.values() {
            *counts.entry(snapshot.state).or_insert(0) += 1;
        }
        counts
    }

    /// Names of breakers currently refusing traffic
    pub fn open_components(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .circuit_breakers
            .values()
            .filter(|s| s.state == CircuitState::Open)
            .map(|s| s.name.clone())
            .collect();
        names.sort();
        names
    }

    /// Fraction of breakers that are closed; 1.0 with no breakers
    pub fn health_score(&self) -> f64 {
        if self.circuit_breakers.is_empty() {
            return 1.0;
        }
        let closed = self
            .circuit_breakers
            .values()
            .filter(|s| s.state == CircuitState::Closed)
            .count();
        closed as f64 / self.circuit_breakers.len() as f64
    }

    pub fn summary(&self) -> String {
        let counts = self.count_by_state();
        format!(
            "Circuit Breakers: {} total | {} closed | {} open | {} half-open | Health: {:.1}%",
            self.circuit_breakers.len(),
            counts.get(&CircuitState::Closed).unwrap_or(&0),
            counts.get(&CircuitState::Open).unwrap_or(&0),
            counts.get(&CircuitState::HalfOpen).unwrap_or(&0),
            self.health_score() * 100.0
        )
    }
}
