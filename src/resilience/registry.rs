//! # Dependency Registry
//!
//! Hot-swappable view of the resilience configuration. Readers take a
//! lock-free snapshot per call; writers publish a whole new configuration, so
//! a call never observes a half-applied change. Changes take effect on the
//! next call without restarting the process.

use super::outcome::DependencyName;
use crate::config::{ConfigResult, DependencyConfig, ResilienceConfig};
use arc_swap::ArcSwap;
use std::sync::Arc;
use tracing::info;

#[derive(Debug)]
pub struct DependencyRegistry {
    config: ArcSwap<ResilienceConfig>,
}

impl DependencyRegistry {
    pub fn new(config: ResilienceConfig) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self {
            config: ArcSwap::from_pointee(config),
        })
    }

    /// Snapshot of the whole configuration
    pub fn current(&self) -> Arc<ResilienceConfig> {
        self.config.load_full()
    }

    /// Attribute a call-site name, substituting the configured default for a
    /// blank one
    pub fn resolve_name(&self, name: DependencyName) -> DependencyName {
        if name.as_str().trim().is_empty() {
            DependencyName::new(&self.config.load().default_dependency)
        } else {
            name
        }
    }

    /// Effective configuration for one dependency
    pub fn dependency(&self, name: &DependencyName) -> DependencyConfig {
        self.config.load().dependency(name.as_str()).clone()
    }

    pub fn is_enabled(&self, name: &DependencyName) -> bool {
        self.config.load().dependency(name.as_str()).enabled
    }

    pub fn coalesce_in_flight(&self) -> bool {
        self.config.load().coalesce_in_flight
    }

    /// Flip the enabled flag. An unlisted dependency gets its own entry copied
    /// from the defaults.
    pub fn set_enabled(&self, name: &DependencyName, enabled: bool) {
        self.config.rcu(|current| {
            let mut next = ResilienceConfig::clone(current);
            let entry = next
                .dependencies
                .entry(name.to_string())
                .or_insert_with(|| current.defaults.clone());
            entry.enabled = enabled;
            next
        });
        info!(dependency = %name, enabled = enabled, "Dependency enabled flag changed");
    }

    /// Replace one dependency's configuration
    pub fn upsert(&self, name: &DependencyName, config: DependencyConfig) -> ConfigResult<()> {
        config.validate(name.as_str())?;
        self.config.rcu(|current| {
            let mut next = ResilienceConfig::clone(current);
            next.dependencies.insert(name.to_string(), config.clone());
            next
        });
        info!(dependency = %name, "Dependency configuration replaced");
        Ok(())
    }

    /// Replace the whole configuration
    pub fn replace(&self, config: ResilienceConfig) -> ConfigResult<()> {
        config.validate()?;
        let dependencies = config.dependencies.len();
        self.config.store(Arc::new(config));
        info!(dependencies = dependencies, "Resilience configuration replaced");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::dependencies;

    fn registry() -> DependencyRegistry {
        DependencyRegistry::new(ResilienceConfig::default()).unwrap()
    }

    #[test]
    fn test_set_enabled_is_visible_immediately() {
        let registry = registry();
        let pricing = DependencyName::new(dependencies::PRICING_SCRAPER);

        assert!(registry.is_enabled(&pricing));
        registry.set_enabled(&pricing, false);
        assert!(!registry.is_enabled(&pricing));
        registry.set_enabled(&pricing, true);
        assert!(registry.is_enabled(&pricing));
    }

    #[test]
    fn test_snapshots_are_isolated_from_later_swaps() {
        let registry = registry();
        let pricing = DependencyName::new(dependencies::PRICING_SCRAPER);
        let before = registry.current();

        registry.set_enabled(&pricing, false);

        assert!(before.dependency(pricing.as_str()).enabled);
        assert!(!registry.current().dependency(pricing.as_str()).enabled);
    }

    #[test]
    fn test_disabling_unlisted_dependency_creates_entry() {
        let registry = registry();
        let importer = DependencyName::new("recipe-importer");

        registry.set_enabled(&importer, false);

        assert!(!registry.is_enabled(&importer));
        assert!(registry.current().defaults.enabled);
    }

    #[test]
    fn test_invalid_upsert_is_rejected() {
        let registry = registry();
        let pricing = DependencyName::new(dependencies::PRICING_SCRAPER);

        let result = registry.upsert(&pricing, DependencyConfig::default().with_max_attempts(0));

        assert!(result.is_err());
        assert_eq!(registry.dependency(&pricing).retry.max_attempts, 3);
    }

    #[test]
    fn test_blank_name_resolves_to_default() {
        let registry = registry();
        assert_eq!(
            registry.resolve_name("  ".into()).as_str(),
            dependencies::UNATTRIBUTED
        );
        assert_eq!(registry.resolve_name("x".into()).as_str(), "x");
    }
}
