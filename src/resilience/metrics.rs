//! # Dependency Metrics
//!
//! The invoker reports every attempt, cache lookup, short circuit, fallback and
//! breaker transition to an injected [`MetricsSink`]. An unconfigured invoker
//! uses [`NoOpMetricsSink`]; sinks never influence call semantics.

use super::circuit_breaker::CircuitState;
use super::fallback::FallbackStrategy;
use super::outcome::{DependencyName, FailureKind, FallbackReason};
use crate::constants::metric_names;
use dashmap::DashMap;
use opentelemetry::metrics::{Counter, Histogram};
use opentelemetry::KeyValue;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Metrics collection seam for monitoring integrations
pub trait MetricsSink: Send + Sync + Debug {
    /// One completed attempt; `failure` is `None` on success
    fn record_attempt(
        &self,
        dependency: &DependencyName,
        failure: Option<FailureKind>,
        latency: Duration,
    );

    fn record_cache_lookup(&self, dependency: &DependencyName, hit: bool);

    /// A call refused before any I/O (open circuit or disabled dependency)
    fn record_short_circuit(&self, dependency: &DependencyName, reason: FallbackReason);

    fn record_fallback(
        &self,
        dependency: &DependencyName,
        reason: FallbackReason,
        strategy: FallbackStrategy,
    );

    fn record_state_transition(&self, dependency: &DependencyName, from: CircuitState, to: CircuitState);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpMetricsSink;

impl MetricsSink for NoOpMetricsSink {
    fn record_attempt(&self, _: &DependencyName, _: Option<FailureKind>, _: Duration) {}
    fn record_cache_lookup(&self, _: &DependencyName, _: bool) {}
    fn record_short_circuit(&self, _: &DependencyName, _: FallbackReason) {}
    fn record_fallback(&self, _: &DependencyName, _: FallbackReason, _: FallbackStrategy) {}
    fn record_state_transition(&self, _: &DependencyName, _: CircuitState, _: CircuitState) {}
}

/// Counter values for one dependency
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub calls: u64,
    pub failures: u64,
    pub timeouts: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub short_circuits: u64,
    pub fallbacks: u64,
    pub state_transitions: u64,
    pub last_latency_us: u64,
    pub total_latency_us: u64,
}

impl MetricsSnapshot {
    pub fn average_latency(&self) -> Option<Duration> {
        (self.calls > 0).then(|| Duration::from_micros(self.total_latency_us / self.calls))
    }
}

#[derive(Debug, Default)]
struct DependencyCounters {
    calls: AtomicU64,
    failures: AtomicU64,
    timeouts: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    short_circuits: AtomicU64,
    fallbacks: AtomicU64,
    state_transitions: AtomicU64,
    last_latency_us: AtomicU64,
    total_latency_us: AtomicU64,
}

/// Lock-free per-dependency counters, readable at any time
#[derive(Debug, Default)]
pub struct InMemoryMetricsSink {
    counters: DashMap<DependencyName, Arc<DependencyCounters>>,
}

impl InMemoryMetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn counters(&self, dependency: &DependencyName) -> Arc<DependencyCounters> {
        if let Some(existing) = self.counters.get(dependency) {
            return Arc::clone(&existing);
        }
        Arc::clone(self.counters.entry(dependency.clone()).or_default().value())
    }

    pub fn snapshot(&self, dependency: &DependencyName) -> MetricsSnapshot {
        self.counters
            .get(dependency)
            .map(|c| MetricsSnapshot {
                calls: c.calls.load(Ordering::Relaxed),
                failures: c.failures.load(Ordering::Relaxed),
                timeouts: c.timeouts.load(Ordering::Relaxed),
                cache_hits: c.cache_hits.load(Ordering::Relaxed),
                cache_misses: c.cache_misses.load(Ordering::Relaxed),
                short_circuits: c.short_circuits.load(Ordering::Relaxed),
                fallbacks: c.fallbacks.load(Ordering::Relaxed),
                state_transitions: c.state_transitions.load(Ordering::Relaxed),
                last_latency_us: c.last_latency_us.load(Ordering::Relaxed),
                total_latency_us: c.total_latency_us.load(Ordering::Relaxed),
            })
            .unwrap_or_default()
    }

    pub fn dependencies(&self) -> Vec<DependencyName> {
        self.counters.iter().map(|e| e.key().clone()).collect()
    }
}

impl MetricsSink for InMemoryMetricsSink {
    fn record_attempt(
        &self,
        dependency: &DependencyName,
        failure: Option<FailureKind>,
        latency: Duration,
    ) {
        let c = self.counters(dependency);
        let micros = latency.as_micros() as u64;
        c.calls.fetch_add(1, Ordering::Relaxed);
        c.last_latency_us.store(micros, Ordering::Relaxed);
        c.total_latency_us.fetch_add(micros, Ordering::Relaxed);
        if let Some(kind) = failure {
            c.failures.fetch_add(1, Ordering::Relaxed);
            if kind == FailureKind::Timeout {
                c.timeouts.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn record_cache_lookup(&self, dependency: &DependencyName, hit: bool) {
        let c = self.counters(dependency);
        if hit {
            c.cache_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            c.cache_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn record_short_circuit(&self, dependency: &DependencyName, _reason: FallbackReason) {
        self.counters(dependency)
            .short_circuits
            .fetch_add(1, Ordering::Relaxed);
    }

    fn record_fallback(&self, dependency: &DependencyName, _: FallbackReason, _: FallbackStrategy) {
        self.counters(dependency)
            .fallbacks
            .fetch_add(1, Ordering::Relaxed);
    }

    fn record_state_transition(&self, dependency: &DependencyName, _: CircuitState, _: CircuitState) {
        self.counters(dependency)
            .state_transitions
            .fetch_add(1, Ordering::Relaxed);
    }
}

/// Exports counters and a latency histogram through the global OpenTelemetry
/// meter provider, tagged by `dependency`
pub struct OpenTelemetryMetricsSink {
    calls: Counter<u64>,
    failures: Counter<u64>,
    attempt_duration: Histogram<f64>,
    cache_lookups: Counter<u64>,
    short_circuits: Counter<u64>,
    fallbacks: Counter<u64>,
    transitions: Counter<u64>,
}

impl Debug for OpenTelemetryMetricsSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenTelemetryMetricsSink").finish_non_exhaustive()
    }
}

impl OpenTelemetryMetricsSink {
    pub fn new() -> Self {
        let meter = opentelemetry::global::meter("recipe-resilience");

        Self {
            calls: meter
                .u64_counter(metric_names::CALLS_TOTAL)
                .with_description("Total attempts issued to a dependency")
                .build(),
            failures: meter
                .u64_counter(metric_names::FAILURES_TOTAL)
                .with_description("Failed attempts by failure kind")
                .build(),
            attempt_duration: meter
                .f64_histogram(metric_names::ATTEMPT_DURATION)
                .with_description("Attempt latency")
                .with_unit("ms")
                .build(),
            cache_lookups: meter
                .u64_counter(metric_names::CACHE_LOOKUPS_TOTAL)
                .with_description("Result cache lookups by outcome")
                .build(),
            short_circuits: meter
                .u64_counter(metric_names::SHORT_CIRCUITS_TOTAL)
                .with_description("Calls refused without I/O")
                .build(),
            fallbacks: meter
                .u64_counter(metric_names::FALLBACKS_TOTAL)
                .with_description("Fallback values substituted for failed calls")
                .build(),
            transitions: meter
                .u64_counter(metric_names::BREAKER_TRANSITIONS_TOTAL)
                .with_description("Circuit breaker state transitions")
                .build(),
        }
    }
}

impl Default for OpenTelemetryMetricsSink {
    fn default() -> Self {
        Self::new()
    }
}

fn dependency_label(dependency: &DependencyName) -> KeyValue {
    KeyValue::new("dependency", dependency.to_string())
}

impl MetricsSink for OpenTelemetryMetricsSink {
    fn record_attempt(
        &self,
        dependency: &DependencyName,
        failure: Option<FailureKind>,
        latency: Duration,
    ) {
        let result = failure.map(FailureKind::as_str).unwrap_or("success");
        let labels = [dependency_label(dependency), KeyValue::new("result", result)];

        self.calls.add(1, &labels);
        self.attempt_duration
            .record(latency.as_secs_f64() * 1000.0, &labels);
        if failure.is_some() {
            self.failures.add(1, &labels);
        }
    }

    fn record_cache_lookup(&self, dependency: &DependencyName, hit: bool) {
        self.cache_lookups.add(
            1,
            &[
                dependency_label(dependency),
                KeyValue::new("result", if hit { "hit" } else { "miss" }),
            ],
        );
    }

    fn record_short_circuit(&self, dependency: &DependencyName, reason: FallbackReason) {
        self.short_circuits.add(
            1,
            &[
                dependency_label(dependency),
                KeyValue::new("reason", reason.to_string()),
            ],
        );
    }

    fn record_fallback(
        &self,
        dependency: &DependencyName,
        reason: FallbackReason,
        strategy: FallbackStrategy,
    ) {
        self.fallbacks.add(
            1,
            &[
                dependency_label(dependency),
                KeyValue::new("reason", reason.to_string()),
                KeyValue::new("strategy", strategy.as_str()),
            ],
        );
    }

    fn record_state_transition(&self, dependency: &DependencyName, from: CircuitState, to: CircuitState) {
        self.transitions.add(
            1,
            &[
                dependency_label(dependency),
                KeyValue::new("from", from.as_str()),
                KeyValue::new("to", to.as_str()),
            ],
        );
    }
}
