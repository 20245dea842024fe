//! # Call Outcome Types
//!
//! Identifiers and tagged results shared by every resilience component:
//! which dependency a call targets, which request within it, what the
//! transport reported and how the call path ultimately gave up.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Identifier of an external collaborator; partition key for all state
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DependencyName(Arc<str>);

impl DependencyName {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DependencyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DependencyName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for DependencyName {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}

impl AsRef<str> for DependencyName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Identifies one request within a dependency; used as the cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallKey(String);

impl CallKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CallKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for CallKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<i64> for CallKey {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

impl From<u64> for CallKey {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl From<Uuid> for CallKey {
    fn from(value: Uuid) -> Self {
        Self(value.to_string())
    }
}

/// What an operation reports when it could not produce a value
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Non-success HTTP status; body kept for diagnostics only
    #[error("HTTP {status}")]
    Status { status: u16, body: String },

    #[error("transport timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("response could not be decoded: {0}")]
    Decode(String),
}

impl TransportError {
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self::Status {
            status,
            body: body.into(),
        }
    }
}

/// Enumerated failure classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    RateLimited,
    ServerError,
    ClientError,
    Unexpected,
}

impl FailureKind {
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            FailureKind::Timeout | FailureKind::RateLimited | FailureKind::ServerError
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::Timeout => "timeout",
            FailureKind::RateLimited => "rate_limited",
            FailureKind::ServerError => "server_error",
            FailureKind::ClientError => "client_error",
            FailureKind::Unexpected => "unexpected",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified failure with its retryability verdict
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub dependency: DependencyName,
    pub kind: FailureKind,
    pub status_code: Option<u16>,
    pub retryable: bool,
    pub message: String,
}

/// Tagged result of one invocation attempt
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome<V> {
    Success(V),
    Failure(Failure),
    /// The deadline elapsed and the attempt was abandoned
    Timeout { elapsed: Duration },
    /// The breaker refused admission; no I/O happened
    CircuitOpen,
}

impl<V> CallOutcome<V> {
    pub fn is_success(&self) -> bool {
        matches!(self, CallOutcome::Success(_))
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            CallOutcome::Success(_) | CallOutcome::CircuitOpen => false,
            CallOutcome::Failure(failure) => failure.retryable,
            CallOutcome::Timeout { .. } => true,
        }
    }

    /// Label used for logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            CallOutcome::Success(_) => "success",
            CallOutcome::Failure(failure) => failure.kind.as_str(),
            CallOutcome::Timeout { .. } => "timeout",
            CallOutcome::CircuitOpen => "circuit_open",
        }
    }
}

/// Why the call path gave up and reached for a fallback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason", content = "kind")]
pub enum FallbackReason {
    CircuitOpen,
    Disabled,
    RetriesExhausted(FailureKind),
    NonRetryable(FailureKind),
}

impl FallbackReason {
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            FallbackReason::RetriesExhausted(kind) | FallbackReason::NonRetryable(kind) => {
                Some(*kind)
            }
            FallbackReason::CircuitOpen | FallbackReason::Disabled => None,
        }
    }
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackReason::CircuitOpen => f.write_str("circuit_open"),
            FallbackReason::Disabled => f.write_str("disabled"),
            FallbackReason::RetriesExhausted(kind) => write!(f, "retries_exhausted:{kind}"),
            FallbackReason::NonRetryable(kind) => write!(f, "non_retryable:{kind}"),
        }
    }
}

/// The only failure a caller of a non-degradable dependency ever observes
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("dependency '{dependency}' unavailable ({reason}) after {attempts} attempt(s): {message}")]
pub struct InvocationError {
    pub dependency: DependencyName,
    pub reason: FallbackReason,
    pub status_code: Option<u16>,
    pub retryable: bool,
    pub attempts: u32,
    pub message: String,
}

impl InvocationError {
    pub fn new(
        dependency: DependencyName,
        reason: FallbackReason,
        status_code: Option<u16>,
        attempts: u32,
        message: impl Into<String>,
    ) -> Self {
        let retryable = reason
            .failure_kind()
            .map(FailureKind::is_retryable)
            .unwrap_or(false);
        Self {
            dependency,
            reason,
            status_code,
            retryable,
            attempts,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> Option<FailureKind> {
        self.reason.failure_kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_key_conversions_agree() {
        assert_eq!(CallKey::from(123_i64), CallKey::from("123"));
        assert_eq!(CallKey::from(123_u64), CallKey::new(String::from("123")));
    }

    #[test]
    fn test_dependency_name_is_cheap_to_clone() {
        let name = DependencyName::new("pricing-scraper");
        let copy = name.clone();
        assert_eq!(name, copy);
        assert_eq!(copy.to_string(), "pricing-scraper");
    }

    #[test]
    fn test_dependency_name_serializes_as_plain_string() {
        let name = DependencyName::new("user-directory");
        let json = serde_json::to_string(&name).unwrap();
        assert_eq!(json, "\"user-directory\"");

        let parsed: DependencyName = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, name);
    }

    #[test]
    fn test_outcome_retryability() {
        let failure = |kind: FailureKind| {
            CallOutcome::<()>::Failure(Failure {
                dependency: "x".into(),
                kind,
                status_code: None,
                retryable: kind.is_retryable(),
                message: String::new(),
            })
        };

        assert!(failure(FailureKind::ServerError).is_retryable());
        assert!(!failure(FailureKind::ClientError).is_retryable());
        assert!(CallOutcome::<()>::Timeout {
            elapsed: Duration::from_secs(1)
        }
        .is_retryable());
        assert!(!CallOutcome::<()>::CircuitOpen.is_retryable());
        assert!(!CallOutcome::Success(1).is_retryable());
    }

    #[test]
    fn test_invocation_error_names_dependency() {
        let err = InvocationError::new(
            "media-manager".into(),
            FallbackReason::NonRetryable(FailureKind::ClientError),
            Some(404),
            1,
            "HTTP 404",
        );

        assert!(!err.retryable);
        assert_eq!(err.kind(), Some(FailureKind::ClientError));
        assert!(err.to_string().contains("media-manager"));
        assert!(err.to_string().contains("non_retryable:client_error"));
    }

    #[test]
    fn test_circuit_open_error_is_not_retryable() {
        let err = InvocationError::new(
            "media-manager".into(),
            FallbackReason::CircuitOpen,
            None,
            0,
            "circuit open",
        );
        assert!(!err.retryable);
        assert_eq!(err.kind(), None);
    }
}
