//! # Circuit Breaker Manager
//!
//! Owns one breaker per logical downstream dependency. Breakers are created
//! lazily on first lookup from the default configuration or a per-dependency
//! override, and live until removed or the manager is dropped.

use crate::config::CircuitBreakerSettings;
use crate::resilience::{CircuitBreaker, SystemCircuitBreakerMetrics};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Registry of named circuit breakers
#[derive(Debug)]
pub struct CircuitBreakerManager {
    /// Collection of circuit breakers by dependency name
    circuit_breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,

    /// Configuration
    settings: CircuitBreakerSettings,
}

impl CircuitBreakerManager {
    pub fn new(settings: CircuitBreakerSettings) -> Self {
        info!(
            overrides = settings.component_configs.len(),
            "Initializing circuit breaker manager"
        );

        Self {
            circuit_breakers: RwLock::new(HashMap::new()),
            settings,
        }
    }

    /// Get or create the breaker guarding `component_name`
    pub fn get_circuit_breaker(&self, component_name: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.circuit_breakers.read().get(component_name) {
            return Arc::clone(breaker);
        }

        let mut breakers = self.circuit_breakers.write();

        // Double-check: another caller may have created it
        if let Some(breaker) = breakers.get(component_name) {
            return Arc::clone(breaker);
        }

        let component_config = self
            .settings
            .config_for_component(component_name)
            .to_resilience_config();

        let breaker = Arc::new(CircuitBreaker::new(component_name, component_config));
        breakers.insert(component_name.to_string(), Arc::clone(&breaker));

        info!(
            component = component_name,
            total_circuit_breakers = breakers.len(),
            "Created new circuit breaker"
        );

        breaker
    }

    /// Get all circuit breaker names
    pub fn list_components(&self) -> Vec<String> {
        let mut names: Vec<String> = self.circuit_breakers.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Snapshot every breaker
    pub fn system_metrics(&self) -> SystemCircuitBreakerMetrics {
        let mut system_metrics = SystemCircuitBreakerMetrics::new();
        for breaker in self.all_breakers() {
            system_metrics.add_circuit_breaker(breaker.snapshot());
        }
        system_metrics
    }

    /// Force open all circuit breakers (emergency stop)
    pub fn force_open_all(&self) {
        warn!("Forcing all circuit breakers open");
        for breaker in self.all_breakers() {
            breaker.force_open();
        }
    }

    /// Reset all circuit breakers to closed
    pub fn reset_all(&self) {
        warn!("Resetting all circuit breakers");
        for breaker in self.all_breakers() {
            breaker.reset();
        }
    }

    /// Remove circuit breaker for a component
    pub fn remove_circuit_breaker(&self, component_name: &str) -> bool {
        let mut breakers = self.circuit_breakers.write();
        if breakers.remove(component_name).is_some() {
            info!(
                component = component_name,
                remaining_count = breakers.len(),
                "Removed circuit breaker"
            );
            true
        } else {
            false
        }
    }

    /// Clone handles out so no registry lock is held while touching breakers
    fn all_breakers(&self) -> Vec<Arc<CircuitBreaker>> {
        self.circuit_breakers.read().values().cloned().collect()
    }
}

impl Default for CircuitBreakerManager {
    fn default() -> Self {
        Self::new(CircuitBreakerSettings::default())
    }
}
