//! # Resilience Configuration
//!
//! YAML-backed configuration for every outbound dependency the process calls.
//!
//! ## Architecture
//!
//! - **Per-dependency settings**: cache, retry, circuit breaker, timeouts, fallback
//! - **Shared defaults**: unlisted dependencies (and omitted fields of listed
//!   ones, when loaded from YAML) inherit the `defaults` section
//! - **Environment awareness**: `development` / `test` / `production` sections
//!   override the base document
//! - **Explicit validation**: loading fails fast on out-of-range values
//!
//! ## Usage
//!
//! ```rust,no_run
//! use recipe_resilience::config::ConfigLoader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigLoader::load_from_file("config/resilience.yaml")?;
//! let pricing = config.dependency("pricing-scraper");
//! println!("pricing cache TTL: {:?}", pricing.cache.ttl());
//! # Ok(())
//! # }
//! ```

pub mod dependency;
pub mod error;
pub mod loader;

use crate::constants::{defaults, dependencies};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub use dependency::{
    BackoffSettings, CacheSettings, CircuitBreakerSettings, DependencyConfig, RecordingMode,
    RetrySettings, TimeoutSettings,
};
pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigLoader;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Attribution for call sites that cannot name their dependency
    pub default_dependency: String,

    /// Bound on concurrently executing attempts across all dependencies
    pub max_concurrent_calls: usize,

    /// Share one in-flight computation between concurrent misses on a key
    pub coalesce_in_flight: bool,

    /// Applied to dependencies without their own entry
    pub defaults: DependencyConfig,

    pub dependencies: HashMap<String, DependencyConfig>,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        let dependencies = HashMap::from([
            (
                dependencies::PRICING_SCRAPER.to_string(),
                DependencyConfig::for_pricing(),
            ),
            (
                dependencies::USER_DIRECTORY.to_string(),
                DependencyConfig::for_user_directory(),
            ),
            (
                dependencies::NOTIFICATION.to_string(),
                DependencyConfig::for_notification(),
            ),
            (
                dependencies::MEDIA_MANAGER.to_string(),
                DependencyConfig::for_media_manager(),
            ),
        ]);

        Self {
            default_dependency: dependencies::UNATTRIBUTED.to_string(),
            max_concurrent_calls: defaults::MAX_CONCURRENT_CALLS,
            coalesce_in_flight: true,
            defaults: DependencyConfig::default(),
            dependencies,
        }
    }
}

impl ResilienceConfig {
    /// Configuration with no named dependencies; everything uses `defaults`
    pub fn empty() -> Self {
        Self {
            dependencies: HashMap::new(),
            ..Self::default()
        }
    }

    pub fn with_dependency(mut self, name: impl Into<String>, config: DependencyConfig) -> Self {
        self.dependencies.insert(name.into(), config);
        self
    }

    /// Effective configuration for a dependency
    pub fn dependency(&self, name: &str) -> &DependencyConfig {
        self.dependencies.get(name).unwrap_or(&self.defaults)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.default_dependency.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "default_dependency",
                "resilience configuration",
            ));
        }
        if self.max_concurrent_calls == 0 {
            return Err(ConfigurationError::invalid_value(
                "max_concurrent_calls",
                "0",
                "worker pool must allow at least one concurrent call",
            ));
        }

        self.defaults.validate("defaults")?;
        for (name, config) in &self.dependencies {
            if name.trim().is_empty() {
                return Err(ConfigurationError::validation_error(
                    "dependency names must not be empty",
                ));
            }
            config.validate(name)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let config = ResilienceConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.dependencies.len(), 4);
    }

    #[test]
    fn test_unknown_dependency_uses_defaults() {
        let config = ResilienceConfig::default();
        assert_eq!(config.dependency("recipe-importer"), &config.defaults);
        assert_eq!(
            config.dependency(dependencies::USER_DIRECTORY).fallback,
            crate::resilience::FallbackStrategy::RestrictiveDefault
        );
    }

    #[test]
    fn test_zero_pool_rejected() {
        let config = ResilienceConfig {
            max_concurrent_calls: 0,
            ..ResilienceConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_invalid_dependency_is_reported_by_name() {
        let config = ResilienceConfig::empty().with_dependency(
            "pricing-scraper",
            DependencyConfig::default().with_max_attempts(0),
        );
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("pricing-scraper"), "{err}");
    }
}
