//! # System Constants
//!
//! Well-known dependency names and the default tuning values applied when a
//! dependency has no explicit configuration.

/// Names of the outbound collaborators the recipe backend talks to
pub mod dependencies {
    pub const PRICING_SCRAPER: &str = "pricing-scraper";
    pub const USER_DIRECTORY: &str = "user-directory";
    pub const NOTIFICATION: &str = "notification";
    pub const MEDIA_MANAGER: &str = "media-manager";

    /// Attribution used when a call site cannot name its dependency
    pub const UNATTRIBUTED: &str = "unattributed";
}

/// Default values for per-dependency configuration
pub mod defaults {
    pub const CACHE_TTL_MS: u64 = 30 * 60 * 1000;
    pub const CACHE_MAX_ENTRIES: u64 = 1_000;
    /// Longest accepted cache TTL (one year)
    pub const CACHE_TTL_CEILING_MS: u64 = 365 * 24 * 60 * 60 * 1000;

    pub const MAX_ATTEMPTS: u32 = 3;
    pub const BACKOFF_BASE_MS: u64 = 100;
    pub const BACKOFF_MAX_MS: u64 = 5_000;
    pub const BACKOFF_MULTIPLIER: f64 = 2.0;
    pub const BACKOFF_JITTER_FACTOR: f64 = 0.1;

    pub const SLIDING_WINDOW_SIZE: usize = 10;
    pub const MINIMUM_CALLS: usize = 5;
    pub const FAILURE_RATE_THRESHOLD: f64 = 0.5;
    pub const COOL_DOWN_MS: u64 = 30_000;
    pub const PERMITTED_HALF_OPEN_CALLS: u32 = 1;

    pub const CONNECT_TIMEOUT_MS: u64 = 2_000;
    pub const READ_TIMEOUT_MS: u64 = 5_000;

    /// Upper bound on concurrently executing attempts across all dependencies
    pub const MAX_CONCURRENT_CALLS: usize = 64;
}

/// Metric names emitted by the OpenTelemetry sink
pub mod metric_names {
    pub const CALLS_TOTAL: &str = "recipe.dependency.calls.total";
    pub const FAILURES_TOTAL: &str = "recipe.dependency.failures.total";
    pub const ATTEMPT_DURATION: &str = "recipe.dependency.attempt.duration";
    pub const CACHE_LOOKUPS_TOTAL: &str = "recipe.dependency.cache.lookups.total";
    pub const SHORT_CIRCUITS_TOTAL: &str = "recipe.dependency.short_circuits.total";
    pub const FALLBACKS_TOTAL: &str = "recipe.dependency.fallbacks.total";
    pub const BREAKER_TRANSITIONS_TOTAL: &str = "recipe.dependency.breaker.transitions.total";
}
