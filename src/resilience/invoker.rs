//! # Resilient Invoker
//!
//! The single call path business code depends on. One call runs:
//!
//! ```text
//! Disabled? ──yes──────────────────────────────────────────────┐
//!    │no                                                        │
//! CacheCheck ──hit──▶ return cached                            │
//!    │miss                                                      ▼
//! [join in-flight call for the same key, if any]            Fallback
//!    │                                                          ▲
//! ┌─▶ CircuitCheck ──open──────────────────────────────────────┤
//! │      │admitted                                              │
//! │   Execute (deadline) ─▶ Classify ─▶ Record ─▶ RetryDecision ┤ stop
//! └────────────── retry after backoff ◀────────────────────────┘
//!    │success
//! CacheStore ─▶ return live value
//! ```
//!
//! Callers never see a transport error. A degradable dependency always yields
//! a value (possibly the fallback default); a non-degradable one yields an
//! [`InvocationError`] naming the dependency and the classification.

use super::cache::ResultCache;
use super::circuit_breaker::{BreakerPermit, CircuitBreaker, CircuitState};
use super::deadline::{DeadlineGovernor, DeadlineOutcome};
use super::error_classifier::{ErrorClassifier, StandardErrorClassifier};
use super::fallback::{FallbackResolver, FallbackStrategy, FallbackValue};
use super::health::{DependencyHealth, HealthReport, LatencyTracker};
use super::manager::CircuitBreakerManager;
use super::metrics::{MetricsSink, NoOpMetricsSink};
use super::outcome::{
    CallKey, CallOutcome, DependencyName, Failure, FailureKind, FallbackReason, InvocationError,
    TransportError,
};
use super::registry::DependencyRegistry;
use super::retry::{AttemptReport, RetryExecutor, RetryPlan, StopReason};
use crate::config::{ConfigResult, DependencyConfig, RecordingMode, ResilienceConfig};
use crate::context::CallContext;
use crate::error::ResilienceError;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared, WeakShared};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info_span, warn, Instrument};

type SharedValue = Arc<dyn Any + Send + Sync>;
type SharedCall = BoxFuture<'static, Result<(SharedValue, u32), GiveUp>>;
type InFlightKey = (DependencyName, CallKey);

/// Where a returned value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    Cache,
    /// A live call; `coalesced` when this caller joined another caller's call
    Live { attempts: u32, coalesced: bool },
    Fallback {
        reason: FallbackReason,
        strategy: FallbackStrategy,
    },
}

/// A value together with its provenance
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<V> {
    pub value: V,
    pub source: ValueSource,
}

impl<V> Resolved<V> {
    pub fn is_fallback(&self) -> bool {
        matches!(self.source, ValueSource::Fallback { .. })
    }
}

/// How a live call sequence gave up
#[derive(Debug, Clone)]
struct GiveUp {
    reason: FallbackReason,
    status_code: Option<u16>,
    attempts: u32,
    message: String,
}

impl GiveUp {
    fn disabled() -> Self {
        Self {
            reason: FallbackReason::Disabled,
            status_code: None,
            attempts: 0,
            message: "dependency disabled by configuration".to_string(),
        }
    }

    fn from_outcome<V>(outcome: CallOutcome<V>, stop: Option<StopReason>, attempts: u32) -> Self {
        match outcome {
            CallOutcome::CircuitOpen => Self {
                reason: FallbackReason::CircuitOpen,
                status_code: None,
                attempts: attempts.saturating_sub(1),
                message: "circuit open".to_string(),
            },
            CallOutcome::Timeout { elapsed } => Self {
                reason: FallbackReason::RetriesExhausted(FailureKind::Timeout),
                status_code: None,
                attempts,
                message: format!("attempt abandoned after {}ms", elapsed.as_millis()),
            },
            CallOutcome::Failure(failure) => Self {
                reason: if !failure.retryable || stop == Some(StopReason::NonRetryable) {
                    FallbackReason::NonRetryable(failure.kind)
                } else {
                    FallbackReason::RetriesExhausted(failure.kind)
                },
                status_code: failure.status_code,
                attempts,
                message: failure.message,
            },
            // A successful outcome never reaches here
            CallOutcome::Success(_) => Self {
                reason: FallbackReason::RetriesExhausted(FailureKind::Unexpected),
                status_code: None,
                attempts,
                message: "success reported as failure".to_string(),
            },
        }
    }
}

struct InvokerInner {
    registry: Arc<DependencyRegistry>,
    cache: ResultCache,
    breakers: CircuitBreakerManager,
    deadline: DeadlineGovernor,
    classifier: Arc<dyn ErrorClassifier>,
    fallback: FallbackResolver,
    metrics: Arc<dyn MetricsSink>,
    latency: LatencyTracker,
    in_flight: DashMap<InFlightKey, WeakShared<SharedCall>>,
}

/// Orchestrates cache, breaker, retries, deadlines and fallbacks per call.
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct ResilientInvoker {
    inner: Arc<InvokerInner>,
}

impl fmt::Debug for ResilientInvoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilientInvoker")
            .field("breakers", &self.inner.breakers.list_dependencies())
            .field("in_flight", &self.inner.in_flight.len())
            .field("metrics", &self.inner.metrics)
            .finish()
    }
}

pub struct ResilientInvokerBuilder {
    config: ResilienceConfig,
    metrics: Option<Arc<dyn MetricsSink>>,
    classifier: Option<Arc<dyn ErrorClassifier>>,
}

impl ResilientInvokerBuilder {
    pub fn config(mut self, config: ResilienceConfig) -> Self {
        self.config = config;
        self
    }

    pub fn dependency(mut self, name: impl Into<String>, config: DependencyConfig) -> Self {
        self.config.dependencies.insert(name.into(), config);
        self
    }

    pub fn metrics_sink(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn classifier(mut self, classifier: Arc<dyn ErrorClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn build(self) -> ConfigResult<ResilientInvoker> {
        let metrics = self
            .metrics
            .unwrap_or_else(|| Arc::new(NoOpMetricsSink) as Arc<dyn MetricsSink>);
        let classifier = self.classifier.unwrap_or_else(|| {
            Arc::new(StandardErrorClassifier::new(
                self.config.default_dependency.as_str(),
            )) as Arc<dyn ErrorClassifier>
        });
        let deadline = DeadlineGovernor::new(self.config.max_concurrent_calls);
        let registry = Arc::new(DependencyRegistry::new(self.config)?);

        Ok(ResilientInvoker {
            inner: Arc::new(InvokerInner {
                registry,
                cache: ResultCache::new(),
                breakers: CircuitBreakerManager::new(Arc::clone(&metrics)),
                deadline,
                classifier,
                fallback: FallbackResolver::new(),
                metrics,
                latency: LatencyTracker::new(),
                in_flight: DashMap::new(),
            }),
        })
    }
}

impl ResilientInvoker {
    pub fn builder() -> ResilientInvokerBuilder {
        ResilientInvokerBuilder {
            config: ResilienceConfig::default(),
            metrics: None,
            classifier: None,
        }
    }

    pub fn new(config: ResilienceConfig) -> ConfigResult<Self> {
        Self::builder().config(config).build()
    }

    /// Runtime configuration handle (enable/disable, replace settings)
    pub fn registry(&self) -> &Arc<DependencyRegistry> {
        &self.inner.registry
    }

    pub fn breakers(&self) -> &CircuitBreakerManager {
        &self.inner.breakers
    }

    pub fn cache(&self) -> &ResultCache {
        &self.inner.cache
    }

    /// Invoke `operation` for `(dependency, key)` and return a value
    pub async fn call<V, F, Fut>(
        &self,
        ctx: &CallContext,
        dependency: impl Into<DependencyName>,
        key: impl Into<CallKey>,
        operation: F,
    ) -> Result<V, InvocationError>
    where
        V: FallbackValue + Clone + Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, TransportError>> + Send + 'static,
    {
        self.call_detailed(ctx, dependency, key, operation)
            .await
            .map(|resolved| resolved.value)
    }

    /// Like [`call`](Self::call) but overriding the registered configuration
    /// for this one call
    pub async fn call_with_config<V, F, Fut>(
        &self,
        ctx: &CallContext,
        dependency: impl Into<DependencyName>,
        key: impl Into<CallKey>,
        config: DependencyConfig,
        operation: F,
    ) -> Result<V, InvocationError>
    where
        V: FallbackValue + Clone + Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, TransportError>> + Send + 'static,
    {
        let dependency = self.inner.registry.resolve_name(dependency.into());
        self.invoke(ctx, dependency, key.into(), config, operation)
            .await
            .map(|resolved| resolved.value)
    }

    /// Invoke and report where the value came from
    pub async fn call_detailed<V, F, Fut>(
        &self,
        ctx: &CallContext,
        dependency: impl Into<DependencyName>,
        key: impl Into<CallKey>,
        operation: F,
    ) -> Result<Resolved<V>, InvocationError>
    where
        V: FallbackValue + Clone + Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, TransportError>> + Send + 'static,
    {
        let dependency = self.inner.registry.resolve_name(dependency.into());
        let config = self.inner.registry.dependency(&dependency);
        self.invoke(ctx, dependency, key.into(), config, operation)
            .await
    }

    /// Run the call on its own task; the handle can be awaited or cancelled
    pub fn spawn_call<V, F, Fut>(
        &self,
        ctx: CallContext,
        dependency: impl Into<DependencyName>,
        key: impl Into<CallKey>,
        operation: F,
    ) -> CallHandle<V>
    where
        V: FallbackValue + Clone + Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, TransportError>> + Send + 'static,
    {
        let invoker = self.clone();
        let dependency = dependency.into();
        let key = key.into();
        CallHandle {
            handle: tokio::spawn(async move {
                invoker.call(&ctx, dependency, key, operation).await
            }),
        }
    }

    async fn invoke<V, F, Fut>(
        &self,
        ctx: &CallContext,
        dependency: DependencyName,
        key: CallKey,
        config: DependencyConfig,
        operation: F,
    ) -> Result<Resolved<V>, InvocationError>
    where
        V: FallbackValue + Clone + Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, TransportError>> + Send + 'static,
    {
        let span = info_span!(
            "dependency_call",
            dependency = %dependency,
            key = %key,
            correlation_id = %ctx.correlation_id,
        );

        async move {
            let inner = &self.inner;

            if !config.enabled {
                inner
                    .metrics
                    .record_short_circuit(&dependency, FallbackReason::Disabled);
                return self.give_up(ctx, &dependency, &key, &config, GiveUp::disabled());
            }

            if config.cache.enabled {
                inner.cache.configure(&dependency, &config.cache);
                let cached = inner.cache.get::<V>(&dependency, &key).await;
                inner
                    .metrics
                    .record_cache_lookup(&dependency, cached.is_some());
                if let Some(value) = cached {
                    return Ok(Resolved {
                        value,
                        source: ValueSource::Cache,
                    });
                }
            }

            let live = if inner.registry.coalesce_in_flight() {
                self.coalesced(ctx, &dependency, &key, &config, operation)
                    .await
            } else {
                execute(
                    Arc::clone(inner),
                    ctx.clone(),
                    dependency.clone(),
                    key.clone(),
                    config.clone(),
                    operation,
                )
                .await
                .map(|(value, attempts)| (value, attempts, false))
            };

            match live {
                Ok((value, attempts, coalesced)) => Ok(Resolved {
                    value,
                    source: ValueSource::Live {
                        attempts,
                        coalesced,
                    },
                }),
                Err(give_up) => self.give_up(ctx, &dependency, &key, &config, give_up),
            }
        }
        .instrument(span)
        .await
    }

    /// Share one live execution between concurrent misses on the same key
    async fn coalesced<V, F, Fut>(
        &self,
        ctx: &CallContext,
        dependency: &DependencyName,
        key: &CallKey,
        config: &DependencyConfig,
        operation: F,
    ) -> Result<(V, u32, bool), GiveUp>
    where
        V: FallbackValue + Clone + Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, TransportError>> + Send + 'static,
    {
        let map_key = (dependency.clone(), key.clone());

        let (shared, joined, operation) = match self.inner.in_flight.entry(map_key.clone()) {
            Entry::Occupied(mut entry) => match entry.get().upgrade() {
                Some(shared) => (shared, true, Some(operation)),
                None => {
                    let shared = self.lead(ctx, dependency, key, config, operation);
                    if let Some(weak) = shared.downgrade() {
                        entry.insert(weak);
                    }
                    (shared, false, None)
                }
            },
            Entry::Vacant(entry) => {
                let shared = self.lead(ctx, dependency, key, config, operation);
                if let Some(weak) = shared.downgrade() {
                    entry.insert(weak);
                }
                (shared, false, None)
            }
        };

        if joined {
            debug!(dependency = %dependency, key = %key, "Joining in-flight call");
        }

        let result = shared.clone().await;
        self.inner.in_flight.remove_if(&map_key, |_, weak| {
            weak.upgrade()
                .map(|current| current.ptr_eq(&shared))
                .unwrap_or(true)
        });

        match result {
            Ok((value, attempts)) => match value.downcast_ref::<V>() {
                Some(value) => Ok((value.clone(), attempts, joined)),
                None => {
                    warn!(
                        dependency = %dependency,
                        key = %key,
                        expected = std::any::type_name::<V>(),
                        "In-flight call produced a different value type - executing separately"
                    );
                    let operation = operation.ok_or_else(|| GiveUp {
                        reason: FallbackReason::RetriesExhausted(FailureKind::Unexpected),
                        status_code: None,
                        attempts,
                        message: "in-flight value type mismatch".to_string(),
                    })?;
                    execute(
                        Arc::clone(&self.inner),
                        ctx.clone(),
                        dependency.clone(),
                        key.clone(),
                        config.clone(),
                        operation,
                    )
                    .await
                    .map(|(value, attempts)| (value, attempts, false))
                }
            },
            Err(give_up) => Err(give_up),
        }
    }

    fn lead<V, F, Fut>(
        &self,
        ctx: &CallContext,
        dependency: &DependencyName,
        key: &CallKey,
        config: &DependencyConfig,
        operation: F,
    ) -> Shared<SharedCall>
    where
        V: FallbackValue + Clone + Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, TransportError>> + Send + 'static,
    {
        execute(
            Arc::clone(&self.inner),
            ctx.clone(),
            dependency.clone(),
            key.clone(),
            config.clone(),
            operation,
        )
        .map(|result| result.map(|(value, attempts)| (Arc::new(value) as SharedValue, attempts)))
        .in_current_span()
        .boxed()
        .shared()
    }

    fn give_up<V: FallbackValue>(
        &self,
        ctx: &CallContext,
        dependency: &DependencyName,
        key: &CallKey,
        config: &DependencyConfig,
        give_up: GiveUp,
    ) -> Result<Resolved<V>, InvocationError> {
        if !config.degradable {
            crate::logging::log_error(
                dependency.as_str(),
                "invoke",
                &give_up.message,
                Some(&format!(
                    "correlation_id={} reason={} attempts={}",
                    ctx.correlation_id, give_up.reason, give_up.attempts
                )),
            );
            return Err(InvocationError::new(
                dependency.clone(),
                give_up.reason,
                give_up.status_code,
                give_up.attempts,
                give_up.message,
            ));
        }

        let value = self
            .inner
            .fallback
            .resolve::<V>(dependency, key, config.fallback, give_up.reason);
        self.inner
            .metrics
            .record_fallback(dependency, give_up.reason, config.fallback);
        crate::logging::log_fallback(
            dependency.as_str(),
            &ctx.correlation_id.to_string(),
            &give_up.reason.to_string(),
            config.fallback.as_str(),
        );

        Ok(Resolved {
            value,
            source: ValueSource::Fallback {
                reason: give_up.reason,
                strategy: config.fallback,
            },
        })
    }

    /// Per-dependency diagnostic snapshot
    pub fn health(&self) -> HealthReport {
        let inner = &self.inner;
        let config = inner.registry.current();

        let mut names: BTreeSet<DependencyName> = config
            .dependencies
            .keys()
            .map(DependencyName::new)
            .collect();
        names.extend(inner.breakers.list_dependencies());
        names.extend(inner.latency.dependencies());

        let dependencies = names
            .into_iter()
            .map(|name| self.dependency_health_with(&config, name))
            .collect();

        HealthReport {
            generated_at: Utc::now(),
            dependencies,
        }
    }

    pub fn dependency_health(&self, dependency: impl Into<DependencyName>) -> DependencyHealth {
        let config = self.inner.registry.current();
        self.dependency_health_with(&config, dependency.into())
    }

    fn dependency_health_with(
        &self,
        config: &ResilienceConfig,
        dependency: DependencyName,
    ) -> DependencyHealth {
        let inner = &self.inner;
        let snapshot = inner.breakers.get(&dependency).map(|b| b.snapshot());
        let last = inner.latency.last(&dependency);

        DependencyHealth {
            enabled: config.dependency(dependency.as_str()).enabled,
            state: snapshot
                .as_ref()
                .map(|s| s.state)
                .unwrap_or(CircuitState::Closed),
            failure_rate: snapshot.as_ref().map(|s| s.failure_rate).unwrap_or(0.0),
            window_len: snapshot.as_ref().map(|s| s.window_len).unwrap_or(0),
            rejected_calls: snapshot.as_ref().map(|s| s.rejected_calls).unwrap_or(0),
            cache: inner.cache.stats(&dependency),
            last_latency_ms: last.map(|(latency, _)| latency.as_secs_f64() * 1000.0),
            last_call_at: last.map(|(_, at)| at),
            dependency,
        }
    }
}

/// The live part of a call: retry loop over admitted, deadline-bound attempts,
/// then cache store on success
async fn execute<V, F, Fut>(
    inner: Arc<InvokerInner>,
    ctx: CallContext,
    dependency: DependencyName,
    key: CallKey,
    config: DependencyConfig,
    operation: F,
) -> Result<(V, u32), GiveUp>
where
    V: Clone + Send + Sync + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<V, TransportError>> + Send + 'static,
{
    let breaker = inner
        .breakers
        .breaker_for(&dependency, &config.circuit_breaker);
    let executor = RetryExecutor::new(RetryPlan::from(&config.retry));
    let per_call = config.circuit_breaker.recording == RecordingMode::PerCall;
    let held_permit: Mutex<Option<BreakerPermit>> = Mutex::new(None);

    let attempt = AttemptScope {
        inner: &inner,
        ctx: &ctx,
        dependency: &dependency,
        breaker: &breaker,
        config: &config,
        held_permit: &held_permit,
        per_call,
    };
    let operation = &operation;
    let result = executor
        .run(move |number| attempt.run(operation, number))
        .await;

    if per_call {
        let permit = held_permit.lock().take();
        if let Some(permit) = permit {
            if result.outcome.is_success() {
                permit.record_success();
            } else {
                permit.record_failure();
            }
        }
    }

    match result.outcome {
        CallOutcome::Success(value) => {
            if config.cache.enabled {
                inner.cache.put(&dependency, key, value.clone()).await;
            }
            Ok((value, result.attempts))
        }
        outcome => Err(GiveUp::from_outcome(outcome, result.stop, result.attempts)),
    }
}

/// Borrowed state shared by every attempt of one call
#[derive(Clone, Copy)]
struct AttemptScope<'a> {
    inner: &'a InvokerInner,
    ctx: &'a CallContext,
    dependency: &'a DependencyName,
    breaker: &'a Arc<CircuitBreaker>,
    config: &'a DependencyConfig,
    held_permit: &'a Mutex<Option<BreakerPermit>>,
    per_call: bool,
}

impl<'a> AttemptScope<'a> {
    async fn run<V, F, Fut>(self, operation: &F, number: u32) -> AttemptReport<V>
    where
        V: Send + 'static,
        F: Fn() -> Fut,
        Fut: Future<Output = Result<V, TransportError>> + Send + 'static,
    {
        let inner = self.inner;
        let dependency = self.dependency;

        let permit = match self.breaker.try_acquire() {
            Ok(permit) => permit,
            Err(refused) => {
                inner
                    .metrics
                    .record_short_circuit(dependency, FallbackReason::CircuitOpen);
                return AttemptReport {
                    outcome: CallOutcome::CircuitOpen,
                    circuit: refused.state,
                };
            }
        };

        let started = Instant::now();
        let deadline = self.config.timeouts.attempt_deadline();
        let outcome = match inner.deadline.execute(deadline, operation()).await {
            DeadlineOutcome::Completed(Ok(value)) => CallOutcome::Success(value),
            DeadlineOutcome::Completed(Err(transport)) => {
                CallOutcome::Failure(inner.classifier.classify(dependency, &transport))
            }
            DeadlineOutcome::TimedOut { elapsed } => CallOutcome::Timeout { elapsed },
            DeadlineOutcome::Aborted { reason } => CallOutcome::Failure(Failure {
                dependency: dependency.clone(),
                kind: FailureKind::Unexpected,
                status_code: None,
                retryable: false,
                message: reason,
            }),
        };
        let latency = started.elapsed();

        let failure_kind = match &outcome {
            CallOutcome::Success(_) | CallOutcome::CircuitOpen => None,
            CallOutcome::Failure(failure) => Some(failure.kind),
            CallOutcome::Timeout { .. } => Some(FailureKind::Timeout),
        };
        inner.metrics.record_attempt(dependency, failure_kind, latency);
        inner.latency.observe(dependency, latency);
        crate::logging::log_dependency_call(
            dependency.as_str(),
            &self.ctx.correlation_id.to_string(),
            number,
            outcome.label(),
            latency.as_millis() as u64,
            match &outcome {
                CallOutcome::Failure(failure) => Some(failure.message.as_str()),
                _ => None,
            },
        );

        let circuit = if self.per_call {
            // Earlier attempts' permits are released unrecorded
            *self.held_permit.lock() = Some(permit);
            self.breaker.state()
        } else if outcome.is_success() {
            permit.record_success()
        } else {
            permit.record_failure()
        };

        AttemptReport { outcome, circuit }
    }
}

/// Handle to a call running on its own task
#[derive(Debug)]
pub struct CallHandle<V> {
    handle: JoinHandle<Result<V, InvocationError>>,
}

impl<V> CallHandle<V> {
    /// Abandon the call. Nothing it would still have produced reaches the
    /// cache or the breaker.
    pub fn cancel(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl<V> Future for CallHandle<V> {
    type Output = Result<V, ResilienceError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle).poll(cx).map(|joined| match joined {
            Ok(result) => result.map_err(ResilienceError::from),
            Err(join_error) if join_error.is_cancelled() => Err(ResilienceError::Cancelled),
            Err(join_error) => Err(ResilienceError::Internal(join_error.to_string())),
        })
    }
}
