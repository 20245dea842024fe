#![allow(clippy::doc_markdown)] // Allow technical terms like OpenTelemetry, LRU in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Recipe Resilience
//!
//! Resilient outbound-call core for the recipe backend.
//!
//! ## Overview
//!
//! The recipe backend delegates to several external services (pricing
//! scraper, user directory, notification, media manager). This crate is the
//! one layer every such call goes through: it classifies failures, memoizes
//! expensive reads, short-circuits a failing dependency, retries transient
//! faults, bounds latency and falls back to a safe default.
//!
//! ## Module Organization
//!
//! - [`resilience`] - Classifier, cache, circuit breaker, retries, deadlines, fallbacks and the invoker
//! - [`clients`] - Typed pricing, user-directory and notification clients
//! - [`config`] - Per-dependency configuration and YAML loading
//! - [`context`] - Explicit per-call context (correlation ID)
//! - [`logging`] - Structured logging setup
//! - [`error`] - Crate-level error type
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use recipe_resilience::clients::{HttpPricingApi, HttpTransport, PricingClient};
//! use recipe_resilience::config::ConfigLoader;
//! use recipe_resilience::context::CallContext;
//! use recipe_resilience::resilience::ResilientInvoker;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! recipe_resilience::logging::init_structured_logging();
//!
//! let config = ConfigLoader::load()?;
//! let timeouts = config.dependency("pricing-scraper").timeouts.clone();
//! let invoker = ResilientInvoker::new(config)?;
//!
//! let transport = HttpTransport::new("http://pricing-scraper:8080/api/", &timeouts)?;
//! let pricing = PricingClient::new(invoker, Arc::new(HttpPricingApi::new(transport)));
//!
//! let result = pricing.recipe_pricing(&CallContext::new(), 123).await?;
//! println!("total: {} cents", result.total_cost_cents);
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # Unit and integration tests
//! ```

pub mod clients;
pub mod config;
pub mod constants;
pub mod context;
pub mod error;
pub mod logging;
pub mod resilience;

pub use config::{ConfigLoader, DependencyConfig, ResilienceConfig};
pub use context::CallContext;
pub use error::{ResilienceError, Result};
pub use resilience::{
    DependencyName, FailureKind, FallbackStrategy, HealthReport, InvocationError,
    ResilientInvoker, TransportError,
};
