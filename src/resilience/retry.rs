//! # Retry Execution
//!
//! Re-issues a failed call a bounded number of times. A retry happens only when
//! the last outcome was retryable, the attempt budget is not spent, and the
//! dependency's circuit is not open. Each attempt is independent: it gets its
//! own admission check and its own deadline.

use super::circuit_breaker::CircuitState;
use super::outcome::CallOutcome;
use crate::config::{BackoffSettings, RetrySettings};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Delay schedule between attempts
#[derive(Debug, Clone, PartialEq)]
pub enum Backoff {
    Fixed(Duration),
    Exponential {
        base: Duration,
        max: Duration,
        multiplier: f64,
        jitter_factor: f64,
    },
}

impl Backoff {
    /// Delay to wait after the given (1-based) failed attempt
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self {
            Backoff::Fixed(delay) => *delay,
            Backoff::Exponential {
                base,
                max,
                multiplier,
                jitter_factor,
            } => {
                let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
                let mut seconds = base.as_secs_f64() * multiplier.powi(exponent);
                if *jitter_factor > 0.0 {
                    seconds *= 1.0 + fastrand::f64() * jitter_factor;
                }

                // Clamp in float space; a late attempt can exceed Duration::MAX
                Duration::try_from_secs_f64(seconds)
                    .map(|delay| delay.min(*max))
                    .unwrap_or(*max)
            }
        }
    }
}

impl From<&BackoffSettings> for Backoff {
    fn from(settings: &BackoffSettings) -> Self {
        match settings {
            BackoffSettings::Fixed { delay_ms } => Backoff::Fixed(Duration::from_millis(*delay_ms)),
            BackoffSettings::Exponential {
                base_ms,
                max_ms,
                multiplier,
                jitter_factor,
            } => Backoff::Exponential {
                base: Duration::from_millis(*base_ms),
                max: Duration::from_millis(*max_ms),
                multiplier: *multiplier,
                jitter_factor: *jitter_factor,
            },
        }
    }
}

/// Stateless retry configuration for one dependency
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPlan {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl From<&RetrySettings> for RetryPlan {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            backoff: Backoff::from(&settings.backoff),
        }
    }
}

/// Why a retry sequence ended without success
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    NonRetryable,
    AttemptsExhausted,
    /// The breaker refused admission or opened during the sequence
    CircuitOpen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    Stop(StopReason),
}

impl RetryPlan {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Decide what follows a failed attempt
    pub fn decide<V>(
        &self,
        attempt: u32,
        outcome: &CallOutcome<V>,
        circuit: CircuitState,
    ) -> RetryDecision {
        if matches!(outcome, CallOutcome::CircuitOpen) {
            return RetryDecision::Stop(StopReason::CircuitOpen);
        }
        if !outcome.is_retryable() {
            return RetryDecision::Stop(StopReason::NonRetryable);
        }
        if circuit == CircuitState::Open {
            return RetryDecision::Stop(StopReason::CircuitOpen);
        }
        if attempt >= self.max_attempts {
            return RetryDecision::Stop(StopReason::AttemptsExhausted);
        }
        RetryDecision::RetryAfter(self.backoff.delay_for(attempt))
    }
}

/// What one attempt produced, plus the breaker state right after recording it
#[derive(Debug)]
pub struct AttemptReport<V> {
    pub outcome: CallOutcome<V>,
    pub circuit: CircuitState,
}

/// Final result of a retry sequence
#[derive(Debug)]
pub struct RetryResult<V> {
    pub outcome: CallOutcome<V>,
    pub attempts: u32,
    /// `None` when the sequence ended in success
    pub stop: Option<StopReason>,
}

/// Drives attempts according to a [`RetryPlan`]
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    plan: RetryPlan,
}

impl RetryExecutor {
    pub fn new(plan: RetryPlan) -> Self {
        Self { plan }
    }

    pub fn plan(&self) -> &RetryPlan {
        &self.plan
    }

    /// Run attempts until success or a stop condition. `attempt` receives the
    /// 1-based attempt number.
    pub async fn run<V, F, Fut>(&self, mut attempt: F) -> RetryResult<V>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = AttemptReport<V>>,
    {
        let mut number = 1;
        loop {
            let report = attempt(number).await;

            if report.outcome.is_success() {
                return RetryResult {
                    outcome: report.outcome,
                    attempts: number,
                    stop: None,
                };
            }

            match self.plan.decide(number, &report.outcome, report.circuit) {
                RetryDecision::RetryAfter(delay) => {
                    debug!(
                        attempt = number,
                        max_attempts = self.plan.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        outcome = report.outcome.label(),
                        "Retrying after backoff"
                    );
                    tokio::time::sleep(delay).await;
                    number += 1;
                }
                RetryDecision::Stop(reason) => {
                    return RetryResult {
                        outcome: report.outcome,
                        attempts: number,
                        stop: Some(reason),
                    };
                }
            }
        }
    }
}
