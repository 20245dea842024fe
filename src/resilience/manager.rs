//! # Circuit Breaker Manager
//!
//! Owns one circuit breaker per dependency. Breakers are created on first use
//! and kept in sync with the dependency's current settings; state never leaks
//! between dependencies.

use super::circuit_breaker::{BreakerSnapshot, CircuitBreaker};
use super::metrics::MetricsSink;
use super::outcome::DependencyName;
use crate::config::CircuitBreakerSettings;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug)]
pub struct CircuitBreakerManager {
    breakers: DashMap<DependencyName, Arc<CircuitBreaker>>,
    metrics: Arc<dyn MetricsSink>,
}

impl CircuitBreakerManager {
    pub fn new(metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            breakers: DashMap::new(),
            metrics,
        }
    }

    /// Get or create the breaker for a dependency, applying `settings`
    pub fn breaker_for(
        &self,
        dependency: &DependencyName,
        settings: &CircuitBreakerSettings,
    ) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(dependency) {
            existing.reconfigure(settings);
            return Arc::clone(&existing);
        }

        let breaker = self
            .breakers
            .entry(dependency.clone())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(
                    dependency.clone(),
                    settings.clone(),
                    Arc::clone(&self.metrics),
                ))
            })
            .clone();
        breaker.reconfigure(settings);

        info!(
            dependency = %dependency,
            total_circuit_breakers = self.breakers.len(),
            "Created new circuit breaker"
        );
        breaker
    }

    pub fn get(&self, dependency: &DependencyName) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(dependency).map(|b| Arc::clone(&b))
    }

    pub fn list_dependencies(&self) -> Vec<DependencyName> {
        let mut names: Vec<_> = self.breakers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        let mut snapshots: Vec<_> = self.breakers.iter().map(|e| e.value().snapshot()).collect();
        snapshots.sort_by(|a, b| a.dependency.cmp(&b.dependency));
        snapshots
    }

    /// Force open all circuit breakers (emergency stop)
    pub fn force_open_all(&self) {
        warn!("🚨 Forcing all circuit breakers open (emergency stop)");
        for entry in self.breakers.iter() {
            entry.value().force_open();
        }
    }

    /// Force close all circuit breakers (emergency recovery)
    pub fn force_close_all(&self) {
        warn!("🚨 Forcing all circuit breakers closed (emergency recovery)");
        for entry in self.breakers.iter() {
            entry.value().force_closed();
        }
    }
}
