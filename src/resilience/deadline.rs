//! # Deadline Governor
//!
//! Runs each attempt as its own tokio task on a bounded pool and enforces a
//! hard wall-clock bound (connect timeout + read timeout). When the bound
//! elapses the task is aborted and a timeout is reported; whatever the
//! transport would have delivered afterwards is never observed.
//!
//! The wait for a pool slot is bounded by the same deadline, so a saturated
//! pool surfaces as a timeout instead of an unbounded queue.
//!
//! Dropping the future returned by [`DeadlineGovernor::execute`] (caller
//! cancellation) aborts the attempt in the same way.

use super::outcome::TransportError;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

/// How an attempt ended from the caller's perspective
#[derive(Debug)]
pub enum DeadlineOutcome<V> {
    Completed(Result<V, TransportError>),
    TimedOut { elapsed: Duration },
    /// The attempt task died without producing a result
    Aborted { reason: String },
}

/// Aborts the wrapped task when dropped
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[derive(Debug, Clone)]
pub struct DeadlineGovernor {
    pool: Arc<Semaphore>,
    capacity: usize,
}

impl DeadlineGovernor {
    pub fn new(max_concurrent_calls: usize) -> Self {
        let capacity = max_concurrent_calls.max(1);
        Self {
            pool: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Attempts currently holding a pool slot
    pub fn in_flight(&self) -> usize {
        self.capacity - self.pool.available_permits()
    }

    /// Execute one attempt under `deadline`.
    ///
    /// Waiting for a pool slot is bounded separately by the same `deadline`
    /// and does not eat into the attempt's own bound. A saturated pool that
    /// yields no slot in time reports a timeout without running the attempt.
    pub async fn execute<V, Fut>(&self, deadline: Duration, attempt: Fut) -> DeadlineOutcome<V>
    where
        V: Send + 'static,
        Fut: Future<Output = Result<V, TransportError>> + Send + 'static,
    {
        let queued = Instant::now();
        let permit = match tokio::time::timeout(deadline, Arc::clone(&self.pool).acquire_owned())
            .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => {
                return DeadlineOutcome::Aborted {
                    reason: "worker pool closed".to_string(),
                }
            }
            Err(_) => {
                let elapsed = queued.elapsed();
                warn!(
                    capacity = self.capacity,
                    waited_ms = elapsed.as_millis() as u64,
                    "No worker slot freed up within the deadline"
                );
                return DeadlineOutcome::TimedOut { elapsed };
            }
        };

        let started = Instant::now();
        let mut task = AbortOnDrop(tokio::spawn(async move {
            let _slot = permit;
            attempt.await
        }));

        match tokio::time::timeout(deadline, &mut task.0).await {
            Ok(Ok(result)) => DeadlineOutcome::Completed(result),
            Ok(Err(join_error)) => {
                warn!(error = %join_error, "Attempt task terminated without a result");
                DeadlineOutcome::Aborted {
                    reason: join_error.to_string(),
                }
            }
            Err(_) => {
                let elapsed = started.elapsed();
                debug!(
                    deadline_ms = deadline.as_millis() as u64,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Attempt exceeded deadline - abandoning"
                );
                task.0.abort();
                DeadlineOutcome::TimedOut { elapsed }
            }
        }
    }
}
