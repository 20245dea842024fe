//! # Structured Logging Module
//!
//! Environment-aware structured logging for outbound dependency calls.
//! Console output by default, JSON lines when `RESILIENCE_LOG_FORMAT=json`.

use chrono::Utc;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = current_environment();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(get_log_level(&environment)));
        let json = std::env::var("RESILIENCE_LOG_FORMAT")
            .map(|format| format.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let layer = if json {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(false)
                .json()
                .with_filter(filter)
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_filter(filter)
                .boxed()
        };

        // A host application may already own the global subscriber
        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            environment = %environment,
            json = json,
            "🔧 STRUCTURED LOGGING: Initialized"
        );
    });
}

/// Current deployment environment from environment variables
pub fn current_environment() -> String {
    std::env::var("RESILIENCE_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

fn get_log_level(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

/// Log the completion of a single attempt against a dependency
pub fn log_dependency_call(
    dependency: &str,
    correlation_id: &str,
    attempt: u32,
    status: &str,
    duration_ms: u64,
    details: Option<&str>,
) {
    tracing::info!(
        dependency = %dependency,
        correlation_id = %correlation_id,
        attempt = attempt,
        status = %status,
        duration_ms = duration_ms,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "🌐 DEPENDENCY_CALL"
    );
}

/// Log a fallback substitution
pub fn log_fallback(dependency: &str, correlation_id: &str, reason: &str, strategy: &str) {
    tracing::warn!(
        dependency = %dependency,
        correlation_id = %correlation_id,
        reason = %reason,
        strategy = %strategy,
        timestamp = %Utc::now().to_rfc3339(),
        "🪂 FALLBACK"
    );
}

/// Log a circuit breaker state change
pub fn log_breaker_transition(dependency: &str, from: &str, to: &str, failure_rate: f64) {
    tracing::warn!(
        dependency = %dependency,
        from_state = %from,
        to_state = %to,
        failure_rate = failure_rate,
        timestamp = %Utc::now().to_rfc3339(),
        "🛡️ BREAKER_TRANSITION"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "❌ ERROR"
    );
}
