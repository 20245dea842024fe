//! # Configuration Loader
//!
//! Handles YAML reading, environment detection, environment-section merging and
//! per-dependency default inheritance.

use super::error::{ConfigResult, ConfigurationError};
use super::ResilienceConfig;
use serde_yaml::Value as YamlValue;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const ENVIRONMENTS: [&str; 3] = ["development", "test", "production"];
const DEFAULT_CONFIG_PATH: &str = "config/resilience.yaml";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from `RESILIENCE_CONFIG_PATH` (or the default path),
    /// falling back to built-in defaults when no file exists
    pub fn load() -> ConfigResult<ResilienceConfig> {
        let path = std::env::var("RESILIENCE_CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

        if !path.exists() {
            warn!(
                path = %path.display(),
                "No resilience configuration file found - using built-in defaults"
            );
            let config = ResilienceConfig::default();
            config.validate()?;
            return Ok(config);
        }
        Self::load_from_file(path)
    }

    /// Load a configuration file with environment auto-detection
    pub fn load_from_file(path: impl AsRef<Path>) -> ConfigResult<ResilienceConfig> {
        let environment = crate::logging::current_environment();
        Self::load_from_file_with_env(path, &environment)
    }

    /// Load a configuration file with an explicit environment.
    /// Useful for testing without modifying global environment variables
    pub fn load_from_file_with_env(
        path: impl AsRef<Path>,
        environment: &str,
    ) -> ConfigResult<ResilienceConfig> {
        let path = path.as_ref();
        let content = Self::read_config_file_safely(path)?;
        let config = Self::load_and_merge_config(&content, &path.display().to_string(), environment)?;

        info!(
            path = %path.display(),
            environment = %environment,
            dependencies = config.dependencies.len(),
            "Resilience configuration loaded"
        );
        Ok(config)
    }

    /// Load configuration from an in-memory YAML document
    pub fn load_from_str(yaml: &str, environment: &str) -> ConfigResult<ResilienceConfig> {
        Self::load_and_merge_config(yaml, "<inline>", environment)
    }

    fn read_config_file_safely(path: &Path) -> ConfigResult<String> {
        const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

        let metadata = std::fs::metadata(path)
            .map_err(|e| ConfigurationError::file_read_error(path.display().to_string(), e))?;

        if !metadata.is_file() {
            return Err(ConfigurationError::invalid_value(
                "file_type",
                "directory or special file",
                "Configuration path must point to a regular file",
            ));
        }
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigurationError::invalid_value(
                "file_size",
                metadata.len().to_string(),
                format!("Configuration file exceeds {MAX_CONFIG_FILE_SIZE} bytes"),
            ));
        }

        std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::file_read_error(path.display().to_string(), e))
    }

    fn load_and_merge_config(
        content: &str,
        source: &str,
        environment: &str,
    ) -> ConfigResult<ResilienceConfig> {
        let mut yaml_data: YamlValue = serde_yaml::from_str(content)
            .map_err(|e| ConfigurationError::invalid_yaml(source, e))?;

        // An empty document means "all defaults"
        if yaml_data.is_null() {
            yaml_data = YamlValue::Mapping(Default::default());
        }

        if let Some(env_overrides) = yaml_data
            .get(YamlValue::String(environment.to_string()))
            .cloned()
        {
            debug!(environment = %environment, "Applying environment-specific overrides");
            Self::merge_yaml_values(&mut yaml_data, env_overrides)?;
        }

        if let YamlValue::Mapping(ref mut map) = yaml_data {
            for env in ENVIRONMENTS {
                map.remove(YamlValue::String(env.to_string()));
            }
        } else {
            return Err(ConfigurationError::invalid_yaml(
                source,
                "top-level document must be a mapping",
            ));
        }

        Self::apply_dependency_defaults(&mut yaml_data)?;

        let config: ResilienceConfig = serde_yaml::from_value(yaml_data).map_err(|e| {
            ConfigurationError::invalid_yaml(
                source,
                format!("Failed to deserialize configuration: {e}"),
            )
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Each listed dependency starts from the `defaults` section and overrides
    /// only the keys it names
    fn apply_dependency_defaults(yaml_data: &mut YamlValue) -> ConfigResult<()> {
        let Some(defaults) = yaml_data.get("defaults").cloned() else {
            return Ok(());
        };

        if let Some(YamlValue::Mapping(dependencies)) = yaml_data.get_mut("dependencies") {
            for (name, entry) in dependencies.iter_mut() {
                let mut merged = defaults.clone();
                let overrides = std::mem::replace(entry, YamlValue::Null);
                if !overrides.is_null() {
                    Self::merge_yaml_values(&mut merged, overrides).map_err(|e| {
                        ConfigurationError::config_merge_error(format!(
                            "dependency {name:?}: {e}"
                        ))
                    })?;
                }
                *entry = merged;
            }
        }
        Ok(())
    }

    /// Recursively merge YAML values (overrides into base)
    fn merge_yaml_values(base: &mut YamlValue, override_value: YamlValue) -> ConfigResult<()> {
        match (&mut *base, override_value) {
            (YamlValue::Mapping(base_map), YamlValue::Mapping(override_map)) => {
                for (key, value) in override_map {
                    if let Some(existing_value) = base_map.get_mut(&key) {
                        Self::merge_yaml_values(existing_value, value)?;
                    } else {
                        base_map.insert(key, value);
                    }
                }
            }
            (base_ref, override_val) => {
                *base_ref = override_val;
            }
        }
        Ok(())
    }
}
