//! # Dependency Health
//!
//! Diagnostic view consumed by an external health-check endpoint: per
//! dependency breaker state, cache effectiveness and the most recent latency.

use super::cache::CacheStats;
use super::circuit_breaker::CircuitState;
use super::outcome::DependencyName;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyHealth {
    pub dependency: DependencyName,
    pub enabled: bool,
    pub state: CircuitState,
    pub failure_rate: f64,
    pub window_len: usize,
    pub rejected_calls: u64,
    pub cache: CacheStats,
    pub last_latency_ms: Option<f64>,
    pub last_call_at: Option<DateTime<Utc>>,
}

impl DependencyHealth {
    /// Serving live traffic: enabled and not short-circuiting
    pub fn is_available(&self) -> bool {
        self.enabled && self.state != CircuitState::Open
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub generated_at: DateTime<Utc>,
    pub dependencies: Vec<DependencyHealth>,
}

impl HealthReport {
    pub fn get(&self, dependency: &str) -> Option<&DependencyHealth> {
        self.dependencies
            .iter()
            .find(|h| h.dependency.as_str() == dependency)
    }

    pub fn open_circuits(&self) -> Vec<&DependencyName> {
        self.dependencies
            .iter()
            .filter(|h| h.state == CircuitState::Open)
            .map(|h| &h.dependency)
            .collect()
    }

    /// Share of dependencies that are available, in [0, 1]
    pub fn health_score(&self) -> f64 {
        if self.dependencies.is_empty() {
            return 1.0;
        }
        let available = self.dependencies.iter().filter(|h| h.is_available()).count();
        available as f64 / self.dependencies.len() as f64
    }

    pub fn is_healthy(&self) -> bool {
        self.dependencies.iter().all(DependencyHealth::is_available)
    }
}

#[derive(Debug, Clone, Copy)]
struct Observation {
    latency: Duration,
    at: DateTime<Utc>,
}

/// Last observed attempt latency per dependency
#[derive(Debug, Default)]
pub struct LatencyTracker {
    observations: DashMap<DependencyName, Observation>,
}

impl LatencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&self, dependency: &DependencyName, latency: Duration) {
        self.observations.insert(
            dependency.clone(),
            Observation {
                latency,
                at: Utc::now(),
            },
        );
    }

    pub fn last(&self, dependency: &DependencyName) -> Option<(Duration, DateTime<Utc>)> {
        self.observations
            .get(dependency)
            .map(|o| (o.latency, o.at))
    }

    pub fn dependencies(&self) -> Vec<DependencyName> {
        self.observations.iter().map(|e| e.key().clone()).collect()
    }
}
