//! # Crate Error Types
//!
//! Top-level error returned by operations that span several subsystems
//! (configuration loading, invoker construction, typed clients).

use crate::config::ConfigurationError;
use crate::resilience::{InvocationError, TransportError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResilienceError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Invocation(#[from] InvocationError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Call cancelled before completion")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ResilienceError {
    /// Name of the failed dependency, when the error is attributable to one
    pub fn dependency(&self) -> Option<&str> {
        match self {
            ResilienceError::Invocation(err) => Some(err.dependency.as_str()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ResilienceError>;
