//! # Resilience Module
//!
//! Fault tolerance for calls to external services: result caching, per
//! dependency circuit breakers, bounded retries, hard attempt deadlines and
//! typed fallbacks, all orchestrated by [`ResilientInvoker`].
//!
//! ## Architecture
//!
//! - **Error Classification**: Transport failures become a [`FailureKind`] with a fixed retryability
//! - **Result Cache**: TTL + LRU cache of successful results, isolated per dependency
//! - **Circuit Breakers**: Sliding-window failure rate with cool-down and half-open trials
//! - **Retries & Deadlines**: Bounded attempts, each under connect + read timeout
//! - **Fallbacks**: Empty, restrictive (fail-secure) or no-op success defaults
//! - **Metrics & Health**: Injected sink plus a per-dependency diagnostic snapshot
//!
//! ## Usage
//!
//! ```rust,no_run
//! use recipe_resilience::context::CallContext;
//! use recipe_resilience::config::ResilienceConfig;
//! use recipe_resilience::resilience::{ResilientInvoker, TransportError};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let invoker = ResilientInvoker::new(ResilienceConfig::default())?;
//! let ctx = CallContext::new();
//!
//! // Degradable dependencies always produce a value
//! let tags: Vec<String> = invoker
//!     .call(&ctx, "pricing-scraper", 123_i64, || async {
//!         Ok::<_, TransportError>(vec!["flour".to_string()])
//!     })
//!     .await?;
//! # let _ = tags;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod circuit_breaker;
pub mod deadline;
pub mod error_classifier;
pub mod fallback;
pub mod health;
pub mod invoker;
pub mod manager;
pub mod metrics;
pub mod outcome;
pub mod registry;
pub mod retry;

pub use cache::{CacheStats, ResultCache};
pub use circuit_breaker::{
    BreakerPermit, BreakerSnapshot, CircuitBreaker, CircuitOpenError, CircuitState,
};
pub use deadline::{DeadlineGovernor, DeadlineOutcome};
pub use error_classifier::{classify_status, ErrorClassifier, StandardErrorClassifier};
pub use fallback::{FallbackResolver, FallbackStrategy, FallbackValue};
pub use health::{DependencyHealth, HealthReport, LatencyTracker};
pub use invoker::{CallHandle, Resolved, ResilientInvoker, ResilientInvokerBuilder, ValueSource};
pub use manager::CircuitBreakerManager;
pub use metrics::{
    InMemoryMetricsSink, MetricsSink, MetricsSnapshot, NoOpMetricsSink, OpenTelemetryMetricsSink,
};
pub use outcome::{
    CallKey, CallOutcome, DependencyName, Failure, FailureKind, FallbackReason, InvocationError,
    TransportError,
};
pub use registry::DependencyRegistry;
pub use retry::{AttemptReport, Backoff, RetryDecision, RetryExecutor, RetryPlan, RetryResult, StopReason};
