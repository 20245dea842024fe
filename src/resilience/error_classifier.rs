//! # Dependency Error Classification
//!
//! Turns whatever a transport reported into a typed [`Failure`] with a
//! retryability verdict. Classification depends only on the status code; the
//! response body is attached to the message for diagnostics and never changes
//! the verdict.
//!
//! | Status            | Kind          | Retryable |
//! |-------------------|---------------|-----------|
//! | 408, 504          | `Timeout`     | yes       |
//! | 429               | `RateLimited` | yes       |
//! | 500, 502, 503     | `ServerError` | yes       |
//! | 400, 404, 422     | `ClientError` | no        |
//! | anything else     | `Unexpected`  | no        |
//!
//! Transport errors without a status map as follows: a transport timeout is
//! `Timeout`, a refused or reset connection is `ServerError` (the dependency is
//! unreachable), and an undecodable payload is `Unexpected`.

use super::outcome::{DependencyName, Failure, FailureKind, TransportError};
use std::fmt::Debug;

/// Longest body excerpt carried into a failure message
const MAX_BODY_EXCERPT: usize = 256;

/// Pure status-code classification
pub fn classify_status(status_code: u16) -> FailureKind {
    match status_code {
        408 | 504 => FailureKind::Timeout,
        429 => FailureKind::RateLimited,
        500 | 502 | 503 => FailureKind::ServerError,
        400 | 404 | 422 => FailureKind::ClientError,
        _ => FailureKind::Unexpected,
    }
}

/// Strategy seam for turning transport errors into failures
pub trait ErrorClassifier: Send + Sync + Debug {
    fn classify(&self, dependency: &DependencyName, error: &TransportError) -> Failure;
}

#[derive(Debug, Clone)]
pub struct StandardErrorClassifier {
    /// Attribution used when a call site hands over an empty dependency name
    default_dependency: DependencyName,
}

impl StandardErrorClassifier {
    pub fn new(default_dependency: impl Into<DependencyName>) -> Self {
        Self {
            default_dependency: default_dependency.into(),
        }
    }

    fn attribute(&self, dependency: &DependencyName) -> DependencyName {
        if dependency.as_str().trim().is_empty() {
            self.default_dependency.clone()
        } else {
            dependency.clone()
        }
    }
}

impl Default for StandardErrorClassifier {
    fn default() -> Self {
        Self::new(crate::constants::dependencies::UNATTRIBUTED)
    }
}

impl ErrorClassifier for StandardErrorClassifier {
    fn classify(&self, dependency: &DependencyName, error: &TransportError) -> Failure {
        let dependency = self.attribute(dependency);

        let (kind, status_code, message) = match error {
            TransportError::Status { status, body } => {
                let kind = classify_status(*status);
                let excerpt = body_excerpt(body);
                let message = if excerpt.is_empty() {
                    format!("HTTP {status} from {dependency}")
                } else {
                    format!("HTTP {status} from {dependency}: {excerpt}")
                };
                (kind, Some(*status), message)
            }
            TransportError::Timeout => (
                FailureKind::Timeout,
                None,
                format!("transport timeout calling {dependency}"),
            ),
            TransportError::Connect(reason) => (
                FailureKind::ServerError,
                None,
                format!("{dependency} unreachable: {reason}"),
            ),
            TransportError::Decode(reason) => (
                FailureKind::Unexpected,
                None,
                format!("undecodable response from {dependency}: {reason}"),
            ),
        };

        Failure {
            dependency,
            kind,
            status_code,
            retryable: kind.is_retryable(),
            message,
        }
    }
}

fn body_excerpt(body: &str) -> &str {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(MAX_BODY_EXCERPT) {
        Some((idx, _)) => &trimmed[..idx],
        None => trimmed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> StandardErrorClassifier {
        StandardErrorClassifier::new("pricing-scraper")
    }

    #[test]
    fn test_status_table() {
        assert_eq!(classify_status(408), FailureKind::Timeout);
        assert_eq!(classify_status(504), FailureKind::Timeout);
        assert_eq!(classify_status(429), FailureKind::RateLimited);
        assert_eq!(classify_status(500), FailureKind::ServerError);
        assert_eq!(classify_status(502), FailureKind::ServerError);
        assert_eq!(classify_status(503), FailureKind::ServerError);
        assert_eq!(classify_status(400), FailureKind::ClientError);
        assert_eq!(classify_status(404), FailureKind::ClientError);
        assert_eq!(classify_status(422), FailureKind::ClientError);
        assert_eq!(classify_status(401), FailureKind::Unexpected);
        assert_eq!(classify_status(501), FailureKind::Unexpected);
        assert_eq!(classify_status(302), FailureKind::Unexpected);
    }

    #[test]
    fn test_rate_limit_is_retryable() {
        let failure = classifier().classify(
            &"pricing-scraper".into(),
            &TransportError::status(429, "slow down"),
        );
        assert_eq!(failure.kind, FailureKind::RateLimited);
        assert!(failure.retryable);
        assert_eq!(failure.status_code, Some(429));
        assert!(failure.message.contains("slow down"));
    }

    #[test]
    fn test_empty_body_degrades_cleanly() {
        let failure =
            classifier().classify(&"pricing-scraper".into(), &TransportError::status(503, ""));
        assert_eq!(failure.message, "HTTP 503 from pricing-scraper");
    }

    #[test]
    fn test_long_body_is_truncated() {
        let body = "x".repeat(MAX_BODY_EXCERPT * 4);
        let failure =
            classifier().classify(&"pricing-scraper".into(), &TransportError::status(500, body));
        assert!(failure.message.len() < MAX_BODY_EXCERPT + 64);
    }

    #[test]
    fn test_multibyte_body_truncation_is_char_safe() {
        let body = "é".repeat(MAX_BODY_EXCERPT + 10);
        let excerpt = body_excerpt(&body);
        assert_eq!(excerpt.chars().count(), MAX_BODY_EXCERPT);
    }

    #[test]
    fn test_missing_dependency_uses_configured_default() {
        let failure = classifier().classify(&"".into(), &TransportError::status(404, ""));
        assert_eq!(failure.dependency.as_str(), "pricing-scraper");
        assert!(!failure.retryable);
    }

    #[test]
    fn test_transport_errors_without_status() {
        let c = classifier();
        let dep: DependencyName = "user-directory".into();

        let timeout = c.classify(&dep, &TransportError::Timeout);
        assert_eq!(timeout.kind, FailureKind::Timeout);
        assert!(timeout.retryable);

        let refused = c.classify(&dep, &TransportError::Connect("refused".into()));
        assert_eq!(refused.kind, FailureKind::ServerError);
        assert!(refused.retryable);
        assert_eq!(refused.status_code, None);

        let garbled = c.classify(&dep, &TransportError::Decode("eof".into()));
        assert_eq!(garbled.kind, FailureKind::Unexpected);
        assert!(!garbled.retryable);
    }
}
