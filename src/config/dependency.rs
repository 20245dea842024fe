//! # Per-Dependency Configuration
//!
//! Every named dependency carries one [`DependencyConfig`] describing how the
//! invoker treats it: whether it is reachable at all, how results are cached,
//! how failures are retried, when its circuit opens, how long an attempt may
//! run and which fallback applies once the call path gives up.
//!
//! Durations are stored as millisecond integers so the structs map one-to-one
//! onto YAML; accessor methods hand out [`Duration`] values.

use super::error::{ConfigResult, ConfigurationError};
use crate::constants::defaults;
use crate::resilience::FallbackStrategy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DependencyConfig {
    /// Disabled dependencies route straight to fallback without any I/O
    pub enabled: bool,

    /// Non-degradable dependencies surface a typed error instead of a default
    pub degradable: bool,

    pub fallback: FallbackStrategy,
    pub cache: CacheSettings,
    pub retry: RetrySettings,
    pub circuit_breaker: CircuitBreakerSettings,
    pub timeouts: TimeoutSettings,
}

impl Default for DependencyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            degradable: true,
            fallback: FallbackStrategy::EmptyDefault,
            cache: CacheSettings::default(),
            retry: RetrySettings::default(),
            circuit_breaker: CircuitBreakerSettings::default(),
            timeouts: TimeoutSettings::default(),
        }
    }
}

impl DependencyConfig {
    /// Aggregate, non-sensitive price data: cache aggressively, degrade to empty
    pub fn for_pricing() -> Self {
        Self::default()
    }

    /// Privacy-relevant lookups: short cache, fail secure
    pub fn for_user_directory() -> Self {
        Self {
            fallback: FallbackStrategy::RestrictiveDefault,
            cache: CacheSettings {
                ttl_ms: 5 * 60 * 1000,
                ..CacheSettings::default()
            },
            ..Self::default()
        }
    }

    /// Best-effort side effects: never cached, report zero items processed
    pub fn for_notification() -> Self {
        Self {
            fallback: FallbackStrategy::NoOpSuccess,
            cache: CacheSettings::disabled(),
            retry: RetrySettings {
                max_attempts: 2,
                ..RetrySettings::default()
            },
            ..Self::default()
        }
    }

    /// Media uploads have no meaningful default, so failures surface
    pub fn for_media_manager() -> Self {
        Self {
            degradable: false,
            cache: CacheSettings::disabled(),
            ..Self::default()
        }
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache.enabled = true;
        self.cache.ttl_ms = ttl.as_millis() as u64;
        self
    }

    pub fn with_cache_capacity(mut self, max_entries: u64) -> Self {
        self.cache.max_entries = max_entries;
        self
    }

    pub fn without_cache(mut self) -> Self {
        self.cache.enabled = false;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.retry.max_attempts = max_attempts;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffSettings) -> Self {
        self.retry.backoff = backoff;
        self
    }

    pub fn with_fixed_backoff(self, delay: Duration) -> Self {
        self.with_backoff(BackoffSettings::Fixed {
            delay_ms: delay.as_millis() as u64,
        })
    }

    pub fn with_failure_rate_threshold(mut self, threshold: f64) -> Self {
        self.circuit_breaker.failure_rate_threshold = threshold;
        self
    }

    pub fn with_minimum_calls(mut self, minimum_calls: usize) -> Self {
        self.circuit_breaker.minimum_calls = minimum_calls;
        self
    }

    pub fn with_sliding_window(mut self, size: usize) -> Self {
        self.circuit_breaker.sliding_window_size = size;
        self
    }

    pub fn with_cool_down(mut self, cool_down: Duration) -> Self {
        self.circuit_breaker.cool_down_ms = cool_down.as_millis() as u64;
        self
    }

    pub fn with_recording(mut self, recording: RecordingMode) -> Self {
        self.circuit_breaker.recording = recording;
        self
    }

    pub fn with_timeouts(mut self, connect: Duration, read: Duration) -> Self {
        self.timeouts.connect_timeout_ms = connect.as_millis() as u64;
        self.timeouts.read_timeout_ms = read.as_millis() as u64;
        self
    }

    pub fn with_fallback(mut self, fallback: FallbackStrategy) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn non_degradable(mut self) -> Self {
        self.degradable = false;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Validate configuration parameters for the named dependency
    pub fn validate(&self, dependency: &str) -> ConfigResult<()> {
        let field = |name: &str| format!("dependencies.{dependency}.{name}");

        if self.cache.enabled && self.cache.ttl_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                field("cache.ttl_ms"),
                "0",
                "cache TTL must be greater than 0 when caching is enabled",
            ));
        }
        if self.cache.ttl_ms > defaults::CACHE_TTL_CEILING_MS {
            return Err(ConfigurationError::invalid_value(
                field("cache.ttl_ms"),
                self.cache.ttl_ms.to_string(),
                format!(
                    "cache TTL must not exceed {}ms",
                    defaults::CACHE_TTL_CEILING_MS
                ),
            ));
        }
        if self.cache.enabled && self.cache.max_entries == 0 {
            return Err(ConfigurationError::invalid_value(
                field("cache.max_entries"),
                "0",
                "cache capacity must be at least 1 when caching is enabled",
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigurationError::invalid_value(
                field("retry.max_attempts"),
                "0",
                "at least one attempt is required",
            ));
        }
        self.retry.backoff.validate(&field("retry.backoff"))?;
        self.circuit_breaker.validate(&field("circuit_breaker"))?;

        if self.timeouts.connect_timeout_ms == 0 || self.timeouts.read_timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                field("timeouts"),
                format!(
                    "connect={}ms read={}ms",
                    self.timeouts.connect_timeout_ms, self.timeouts.read_timeout_ms
                ),
                "both timeouts must be greater than 0",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
    pub ttl_ms: u64,
    pub max_entries: u64,
}

impl CacheSettings {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_ms: defaults::CACHE_TTL_MS,
            max_entries: defaults::CACHE_MAX_ENTRIES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub backoff: BackoffSettings,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: defaults::MAX_ATTEMPTS,
            backoff: BackoffSettings::default(),
        }
    }
}

/// Delay schedule between attempts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackoffSettings {
    Fixed {
        delay_ms: u64,
    },
    Exponential {
        base_ms: u64,
        max_ms: u64,
        multiplier: f64,
        jitter_factor: f64,
    },
}

impl Default for BackoffSettings {
    fn default() -> Self {
        BackoffSettings::Exponential {
            base_ms: defaults::BACKOFF_BASE_MS,
            max_ms: defaults::BACKOFF_MAX_MS,
            multiplier: defaults::BACKOFF_MULTIPLIER,
            jitter_factor: defaults::BACKOFF_JITTER_FACTOR,
        }
    }
}

impl BackoffSettings {
    fn validate(&self, field: &str) -> ConfigResult<()> {
        if let BackoffSettings::Exponential {
            base_ms,
            max_ms,
            multiplier,
            jitter_factor,
        } = self
        {
            if *multiplier < 1.0 {
                return Err(ConfigurationError::invalid_value(
                    format!("{field}.multiplier"),
                    multiplier.to_string(),
                    "multiplier must be at least 1.0",
                ));
            }
            if !(0.0..=1.0).contains(jitter_factor) {
                return Err(ConfigurationError::invalid_value(
                    format!("{field}.jitter_factor"),
                    jitter_factor.to_string(),
                    "jitter factor must be within [0, 1]",
                ));
            }
            if max_ms < base_ms {
                return Err(ConfigurationError::invalid_value(
                    format!("{field}.max_ms"),
                    max_ms.to_string(),
                    format!("max delay must not be below base delay {base_ms}ms"),
                ));
            }
        }
        Ok(())
    }
}

/// Which outcomes feed the breaker's sliding window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecordingMode {
    /// One window entry per attempt, retries included
    #[default]
    PerAttempt,
    /// One window entry per call, holding the post-retry outcome
    PerCall,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    pub sliding_window_size: usize,
    /// Outcomes required in the window before the failure rate is evaluated
    pub minimum_calls: usize,
    /// Failure rate in (0, 1] at or above which the circuit opens
    pub failure_rate_threshold: f64,
    pub cool_down_ms: u64,
    pub permitted_half_open_calls: u32,
    pub recording: RecordingMode,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            sliding_window_size: defaults::SLIDING_WINDOW_SIZE,
            minimum_calls: defaults::MINIMUM_CALLS,
            failure_rate_threshold: defaults::FAILURE_RATE_THRESHOLD,
            cool_down_ms: defaults::COOL_DOWN_MS,
            permitted_half_open_calls: defaults::PERMITTED_HALF_OPEN_CALLS,
            recording: RecordingMode::default(),
        }
    }
}

impl CircuitBreakerSettings {
    pub fn cool_down(&self) -> Duration {
        Duration::from_millis(self.cool_down_ms)
    }

    fn validate(&self, field: &str) -> ConfigResult<()> {
        if self.sliding_window_size == 0 {
            return Err(ConfigurationError::invalid_value(
                format!("{field}.sliding_window_size"),
                "0",
                "sliding window must hold at least one outcome",
            ));
        }
        if self.minimum_calls == 0 || self.minimum_calls > self.sliding_window_size {
            return Err(ConfigurationError::invalid_value(
                format!("{field}.minimum_calls"),
                self.minimum_calls.to_string(),
                format!(
                    "minimum calls must be between 1 and the window size {}",
                    self.sliding_window_size
                ),
            ));
        }
        if !(self.failure_rate_threshold > 0.0 && self.failure_rate_threshold <= 1.0) {
            return Err(ConfigurationError::invalid_value(
                format!("{field}.failure_rate_threshold"),
                self.failure_rate_threshold.to_string(),
                "threshold must be within (0, 1]",
            ));
        }
        if self.cool_down_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                format!("{field}.cool_down_ms"),
                "0",
                "cool-down must be greater than 0",
            ));
        }
        if self.permitted_half_open_calls == 0 {
            return Err(ConfigurationError::invalid_value(
                format!("{field}.permitted_half_open_calls"),
                "0",
                "at least one trial call must be permitted",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: defaults::CONNECT_TIMEOUT_MS,
            read_timeout_ms: defaults::READ_TIMEOUT_MS,
        }
    }
}

impl TimeoutSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Hard wall-clock bound for a single attempt
    pub fn attempt_deadline(&self) -> Duration {
        self.connect_timeout() + self.read_timeout()
    }
}
