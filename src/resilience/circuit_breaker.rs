//! # Circuit Breaker Implementation
//!
//! Sliding-window circuit breaker guarding one dependency.
//!
//! - **Closed**: calls pass through; each recorded outcome enters a bounded
//!   window. Once the window holds at least `minimum_calls` outcomes and the
//!   failure rate reaches `failure_rate_threshold`, the circuit opens.
//! - **Open**: calls are refused without I/O until `cool_down` has elapsed.
//! - **HalfOpen**: `permitted_half_open_calls` trial calls are admitted. All
//!   trials succeeding closes the circuit; any trial failing re-opens it with a
//!   fresh cool-down.
//!
//! Admission hands out a [`BreakerPermit`]. Outcomes are recorded through the
//! permit, and a permit dropped without recording (a cancelled or abandoned
//! attempt) changes nothing except returning its trial slot. Every transition
//! starts a new epoch; permits from an earlier epoch are stale and their
//! outcomes are discarded.

use super::metrics::MetricsSink;
use super::outcome::DependencyName;
use crate::config::CircuitBreakerSettings;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Normal operation - all calls are allowed through
    Closed = 0,
    /// Failure mode - all calls fail fast without executing
    Open = 1,
    /// Testing recovery - limited calls allowed to test dependency health
    HalfOpen = 2,
}

impl CircuitState {
    pub fn as_str(self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Admission was refused
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Circuit breaker is open for {dependency}")]
pub struct CircuitOpenError {
    pub dependency: DependencyName,
    pub state: CircuitState,
}

/// Point-in-time view of a breaker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    pub dependency: DependencyName,
    pub state: CircuitState,
    pub window_len: usize,
    pub window_failures: usize,
    pub failure_rate: f64,
    pub total_successes: u64,
    pub total_failures: u64,
    pub rejected_calls: u64,
    /// Time since the circuit last opened, while open
    pub open_for: Option<Duration>,
}

#[derive(Debug)]
struct BreakerInner {
    settings: CircuitBreakerSettings,
    state: CircuitState,
    epoch: u64,
    /// `true` entries are failures
    window: VecDeque<bool>,
    window_failures: usize,
    opened_at: Option<Instant>,
    half_open_since: Option<Instant>,
    trials_issued: u32,
    trial_successes: u32,
    total_successes: u64,
    total_failures: u64,
    rejected_calls: u64,
}

impl BreakerInner {
    fn failure_rate(&self) -> f64 {
        if self.window.is_empty() {
            0.0
        } else {
            self.window_failures as f64 / self.window.len() as f64
        }
    }

    fn push_outcome(&mut self, failed: bool) {
        self.window.push_back(failed);
        if failed {
            self.window_failures += 1;
        }
        while self.window.len() > self.settings.sliding_window_size {
            if self.window.pop_front() == Some(true) {
                self.window_failures -= 1;
            }
        }
    }

    fn should_trip(&self) -> bool {
        self.window.len() >= self.settings.minimum_calls
            && self.failure_rate() >= self.settings.failure_rate_threshold
    }

    fn clear_window(&mut self) {
        self.window.clear();
        self.window_failures = 0;
    }

    fn issue_trial(&mut self) {
        self.trials_issued += 1;
    }

    /// Move to `to`, starting a new epoch. The returned transition is
    /// announced once the lock is released.
    fn transition(&mut self, to: CircuitState, now: Instant) -> Option<Transition> {
        let from = self.state;
        if from == to {
            return None;
        }
        let failure_rate = self.failure_rate();

        self.state = to;
        self.epoch += 1;
        self.trials_issued = 0;
        self.trial_successes = 0;
        match to {
            CircuitState::Open => {
                self.opened_at = Some(now);
                self.half_open_since = None;
            }
            CircuitState::HalfOpen => {
                self.half_open_since = Some(now);
            }
            CircuitState::Closed => {
                self.opened_at = None;
                self.half_open_since = None;
            }
        }
        self.clear_window();

        Some(Transition {
            from,
            to,
            failure_rate,
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct Transition {
    from: CircuitState,
    to: CircuitState,
    failure_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PermitKind {
    Normal,
    Trial,
}

/// Core circuit breaker with per-dependency mutex-guarded state
pub struct CircuitBreaker {
    dependency: DependencyName,
    inner: Mutex<BreakerInner>,
    metrics: Arc<dyn MetricsSink>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("dependency", &self.dependency)
            .field("state", &self.state())
            .finish()
    }
}

impl CircuitBreaker {
    pub fn new(
        dependency: DependencyName,
        settings: CircuitBreakerSettings,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        info!(
            dependency = %dependency,
            sliding_window_size = settings.sliding_window_size,
            minimum_calls = settings.minimum_calls,
            failure_rate_threshold = settings.failure_rate_threshold,
            cool_down_ms = settings.cool_down_ms,
            "🛡️ Circuit breaker initialized"
        );

        Self {
            dependency,
            inner: Mutex::new(BreakerInner {
                settings,
                state: CircuitState::Closed,
                epoch: 0,
                window: VecDeque::new(),
                window_failures: 0,
                opened_at: None,
                half_open_since: None,
                trials_issued: 0,
                trial_successes: 0,
                total_successes: 0,
                total_failures: 0,
                rejected_calls: 0,
            }),
            metrics,
        }
    }

    pub fn dependency(&self) -> &DependencyName {
        &self.dependency
    }

    /// Current state without side effects
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    /// Request admission for one attempt.
    ///
    /// An open circuit whose cool-down has elapsed moves to half-open here and
    /// the caller receives the trial permit.
    pub fn try_acquire(self: &Arc<Self>) -> Result<BreakerPermit, CircuitOpenError> {
        let (admission, transition) = self.admit();
        self.announce(transition);
        admission
    }

    fn admit(
        self: &Arc<Self>,
    ) -> (Result<BreakerPermit, CircuitOpenError>, Option<Transition>) {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        let mut transition = None;

        let kind = match inner.state {
            CircuitState::Closed => PermitKind::Normal,
            CircuitState::Open => {
                let cooled = inner
                    .opened_at
                    .map(|opened| now.duration_since(opened) >= inner.settings.cool_down())
                    .unwrap_or(true);
                if !cooled {
                    return (Err(self.reject(&mut inner)), None);
                }
                transition = inner.transition(CircuitState::HalfOpen, now);
                inner.issue_trial();
                PermitKind::Trial
            }
            CircuitState::HalfOpen => {
                if inner.trials_issued < inner.settings.permitted_half_open_calls {
                    inner.issue_trial();
                    PermitKind::Trial
                } else if inner
                    .half_open_since
                    .map(|since| now.duration_since(since) >= inner.settings.cool_down())
                    .unwrap_or(false)
                {
                    // Outstanding trials never reported back; hand out fresh ones
                    debug!(
                        dependency = %self.dependency,
                        "Half-open trials went unresolved for a full cool-down - reissuing"
                    );
                    inner.half_open_since = Some(now);
                    inner.trials_issued = 0;
                    inner.trial_successes = 0;
                    inner.epoch += 1;
                    inner.issue_trial();
                    PermitKind::Trial
                } else {
                    return (Err(self.reject(&mut inner)), None);
                }
            }
        };

        let permit = BreakerPermit {
            breaker: Arc::clone(self),
            epoch: inner.epoch,
            kind,
            resolved: false,
        };
        (Ok(permit), transition)
    }

    fn reject(&self, inner: &mut BreakerInner) -> CircuitOpenError {
        inner.rejected_calls += 1;
        debug!(dependency = %self.dependency, state = %inner.state, "Circuit breaker rejected call");
        CircuitOpenError {
            dependency: self.dependency.clone(),
            state: inner.state,
        }
    }

    fn record(&self, epoch: u64, kind: PermitKind, failed: bool) -> CircuitState {
        let mut inner = self.inner.lock();

        if failed {
            inner.total_failures += 1;
        } else {
            inner.total_successes += 1;
        }

        if epoch != inner.epoch {
            debug!(
                dependency = %self.dependency,
                "Discarding outcome from a previous breaker epoch"
            );
            return inner.state;
        }

        let now = Instant::now();
        let transition = match (inner.state, kind) {
            (CircuitState::Closed, _) => {
                inner.push_outcome(failed);
                if inner.should_trip() {
                    inner.transition(CircuitState::Open, now)
                } else {
                    None
                }
            }
            (CircuitState::HalfOpen, PermitKind::Trial) => {
                if failed {
                    inner.transition(CircuitState::Open, now)
                } else {
                    inner.trial_successes += 1;
                    if inner.trial_successes >= inner.settings.permitted_half_open_calls {
                        inner.transition(CircuitState::Closed, now)
                    } else {
                        None
                    }
                }
            }
            _ => None,
        };
        let state = inner.state;
        drop(inner);

        self.announce(transition);
        state
    }

    fn release(&self, epoch: u64, kind: PermitKind) {
        let mut inner = self.inner.lock();
        if kind == PermitKind::Trial
            && inner.state == CircuitState::HalfOpen
            && epoch == inner.epoch
        {
            inner.trials_issued = inner.trials_issued.saturating_sub(1);
        }
    }

    /// Log and report a transition; never called with the state lock held
    fn announce(&self, transition: Option<Transition>) {
        let Some(Transition {
            from,
            to,
            failure_rate,
        }) = transition
        else {
            return;
        };

        crate::logging::log_breaker_transition(
            self.dependency.as_str(),
            from.as_str(),
            to.as_str(),
            failure_rate,
        );
        self.metrics.record_state_transition(&self.dependency, from, to);
    }

    /// Force circuit to open state (for emergency situations)
    pub fn force_open(&self) {
        let transition = self.inner.lock().transition(CircuitState::Open, Instant::now());
        self.announce(transition);
    }

    /// Force circuit to closed state (for recovery situations)
    pub fn force_closed(&self) {
        let transition = self
            .inner
            .lock()
            .transition(CircuitState::Closed, Instant::now());
        self.announce(transition);
    }

    /// Apply new settings; a shrunken window drops its oldest outcomes
    pub fn reconfigure(&self, settings: &CircuitBreakerSettings) {
        let mut inner = self.inner.lock();
        if inner.settings == *settings {
            return;
        }
        inner.settings = settings.clone();
        while inner.window.len() > inner.settings.sliding_window_size {
            if inner.window.pop_front() == Some(true) {
                inner.window_failures -= 1;
            }
        }
        debug!(dependency = %self.dependency, "Circuit breaker reconfigured");
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock();
        BreakerSnapshot {
            dependency: self.dependency.clone(),
            state: inner.state,
            window_len: inner.window.len(),
            window_failures: inner.window_failures,
            failure_rate: inner.failure_rate(),
            total_successes: inner.total_successes,
            total_failures: inner.total_failures,
            rejected_calls: inner.rejected_calls,
            open_for: match inner.state {
                CircuitState::Open => inner.opened_at.map(|at| at.elapsed()),
                _ => None,
            },
        }
    }
}

/// Admission ticket for one attempt
#[derive(Debug)]
pub struct BreakerPermit {
    breaker: Arc<CircuitBreaker>,
    epoch: u64,
    kind: PermitKind,
    resolved: bool,
}

impl BreakerPermit {
    pub fn is_trial(&self) -> bool {
        self.kind == PermitKind::Trial
    }

    /// Record a successful attempt; returns the resulting state
    pub fn record_success(mut self) -> CircuitState {
        self.resolved = true;
        self.breaker.record(self.epoch, self.kind, false)
    }

    /// Record a failed attempt; returns the resulting state
    pub fn record_failure(mut self) -> CircuitState {
        self.resolved = true;
        self.breaker.record(self.epoch, self.kind, true)
    }
}

impl Drop for BreakerPermit {
    fn drop(&mut self) {
        if !self.resolved {
            self.breaker.release(self.epoch, self.kind);
        }
    }
}
