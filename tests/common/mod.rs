//! Shared helpers for integration tests: a scripted fake dependency and
//! invoker construction with fast retry/timeout settings.

#![allow(dead_code)]

use futures::future::BoxFuture;
use recipe_resilience::config::{DependencyConfig, ResilienceConfig};
use recipe_resilience::resilience::{InMemoryMetricsSink, ResilientInvoker, TransportError};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Fake operation replaying a script of results. Once the script runs out
/// the last entry repeats.
#[derive(Debug, Clone)]
pub struct ScriptedOperation<V> {
    script: Arc<Vec<Result<V, TransportError>>>,
    delay: Option<Duration>,
    calls: Arc<AtomicU32>,
}

impl<V> ScriptedOperation<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(script: Vec<Result<V, TransportError>>) -> Self {
        assert!(!script.is_empty(), "script needs at least one result");
        Self {
            script: Arc::new(script),
            delay: None,
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn always(result: Result<V, TransportError>) -> Self {
        Self::new(vec![result])
    }

    /// Statuses returned in order (non-2xx), then `success` forever
    pub fn statuses_then(statuses: &[u16], success: V) -> Self {
        let mut script: Vec<_> = statuses.iter().map(|s| Err(status(*s))).collect();
        script.push(Ok(success));
        Self::new(script)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Closure handed to the invoker
    pub fn operation(
        &self,
    ) -> impl Fn() -> BoxFuture<'static, Result<V, TransportError>> + Send + Sync + 'static {
        let this = self.clone();
        move || {
            let index = this.calls.fetch_add(1, Ordering::SeqCst) as usize;
            let result = this.script[index.min(this.script.len() - 1)].clone();
            let delay = this.delay;
            Box::pin(async move {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                result
            })
        }
    }
}

pub fn status(code: u16) -> TransportError {
    TransportError::status(code, format!("status {code}"))
}

/// Millisecond backoff and short deadlines so tests run quickly
pub fn fast(config: DependencyConfig) -> DependencyConfig {
    config
        .with_fixed_backoff(Duration::from_millis(1))
        .with_timeouts(Duration::from_millis(100), Duration::from_millis(100))
}

pub fn invoker_with(
    dependencies: Vec<(&str, DependencyConfig)>,
) -> (ResilientInvoker, Arc<InMemoryMetricsSink>) {
    let sink = Arc::new(InMemoryMetricsSink::new());
    let mut builder = ResilientInvoker::builder()
        .config(ResilienceConfig::empty())
        .metrics_sink(sink.clone());
    for (name, config) in dependencies {
        builder = builder.dependency(name, config);
    }
    (builder.build().expect("valid test configuration"), sink)
}

pub fn invoker_for(
    name: &str,
    config: DependencyConfig,
) -> (ResilientInvoker, Arc<InMemoryMetricsSink>) {
    invoker_with(vec![(name, config)])
}
