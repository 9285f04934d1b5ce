//! Configuration Loader
//!
//! Environment-aware configuration loading. Handles YAML file discovery,
//! environment detection and deep-merging of environment overrides.

use super::error::{ConfigResult, ConfigurationError};
use super::ApprovalConfig;
use crate::constants::system::CONFIG_FILE_NAMES;
use serde_yaml::Value as YamlValue;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const ENVIRONMENT_SECTIONS: [&str; 3] = ["development", "test", "production"];

/// Loaded configuration together with where it came from
#[derive(Debug)]
pub struct ConfigManager {
    config: ApprovalConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment.
    /// Useful for testing without modifying global environment variables
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(|| PathBuf::from("config"));

        debug!(
            "Loading configuration for environment '{}' from directory: {}",
            environment,
            config_directory.display()
        );

        let config = Self::load_and_merge_config(&config_directory, environment)?;
        config.validate()?;

        info!(
            environment = %environment,
            max_conflict_retries = config.engine.max_conflict_retries,
            channel_capacity = config.events.channel_capacity,
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Wrap an already-built configuration, e.g. defaults in tests
    pub fn from_config(config: ApprovalConfig) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: Self::detect_environment(),
            config_directory: PathBuf::from("config"),
        }))
    }

    pub fn config(&self) -> &ApprovalConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    fn detect_environment() -> String {
        env::var("APPROVAL_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }

    /// Safely read a configuration file with a size limit
    fn read_config_file_safely(path: &Path) -> ConfigResult<String> {
        const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

        let metadata = std::fs::metadata(path)
            .map_err(|e| ConfigurationError::file_read_error(path.display().to_string(), e))?;

        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigurationError::invalid_value(
                "file_size",
                metadata.len().to_string(),
                format!("Configuration file larger than {MAX_CONFIG_FILE_SIZE} bytes"),
            ));
        }

        if !metadata.is_file() {
            return Err(ConfigurationError::invalid_value(
                "file_type",
                "directory or special file",
                "Configuration path must point to a regular file",
            ));
        }

        std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::file_read_error(path.display().to_string(), e))
    }

    fn find_config_file(config_directory: &Path) -> ConfigResult<PathBuf> {
        let mut searched_paths = Vec::new();

        for name in CONFIG_FILE_NAMES {
            let config_path = config_directory.join(name);
            searched_paths.push(config_path.clone());

            if config_path.exists() {
                debug!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        Err(ConfigurationError::config_file_not_found(searched_paths))
    }

    /// Load and merge configuration with environment-specific overrides
    fn load_and_merge_config(config_directory: &Path, environment: &str) -> ConfigResult<ApprovalConfig> {
        let config_file = Self::find_config_file(config_directory)?;
        let yaml_content = Self::read_config_file_safely(&config_file)?;

        let mut yaml_data: YamlValue = serde_yaml::from_str(&yaml_content)
            .map_err(|e| ConfigurationError::invalid_yaml(config_file.display().to_string(), e))?;

        if let Some(env_overrides) = yaml_data
            .get(YamlValue::String(environment.to_string()))
            .cloned()
        {
            debug!("Applying environment-specific overrides for: {}", environment);
            Self::merge_yaml_values(&mut yaml_data, env_overrides);
        }

        if let YamlValue::Mapping(ref mut map) = yaml_data {
            for section in ENVIRONMENT_SECTIONS {
                map.remove(YamlValue::String(section.to_string()));
            }
        }

        // An empty file parses to null; treat it as all defaults
        if yaml_data.is_null() {
            return Ok(ApprovalConfig::default());
        }

        serde_yaml::from_value(yaml_data).map_err(|e| {
            ConfigurationError::invalid_yaml(
                config_file.display().to_string(),
                format!("Failed to deserialize configuration: {e}"),
            )
        })
    }

    /// Recursively merge YAML values (environment overrides into base config)
    fn merge_yaml_values(base: &mut YamlValue, override_value: YamlValue) {
        match (&mut *base, override_value) {
            (YamlValue::Mapping(base_map), YamlValue::Mapping(override_map)) => {
                for (key, value) in override_map {
                    if let Some(existing_value) = base_map.get_mut(&key) {
                        Self::merge_yaml_values(existing_value, value);
                    } else {
                        base_map.insert(key, value);
                    }
                }
            }
            (base_ref, override_val) => {
                *base_ref = override_val;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_config_yaml() -> &'static str {
        r#"
engine:
  max_conflict_retries: 5
  default_organization_levels: 2
  sweep_interval_seconds: 300

events:
  channel_capacity: 512

logging:
  level: info
  json: false

test:
  engine:
    sweep_interval_seconds: 1
  logging:
    level: debug

production:
  logging:
    json: true
"#
    }

    fn setup_test_config_dir() -> (TempDir, PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let config_dir = temp_dir.path().to_path_buf();
        fs::write(config_dir.join("approval-config.yaml"), create_test_config_yaml()).unwrap();
        (temp_dir, config_dir)
    }

    #[test]
    fn test_config_file_discovery() {
        let (_temp_dir, config_dir) = setup_test_config_dir();

        let config_file = ConfigManager::find_config_file(&config_dir).unwrap();
        assert_eq!(config_file.file_name().unwrap(), "approval-config.yaml");
    }

    #[test]
    fn test_config_file_not_found() {
        let temp_dir = TempDir::new().unwrap();

        let result = ConfigManager::find_config_file(temp_dir.path());
        if let Err(ConfigurationError::ConfigFileNotFound { searched_paths }) = result {
            assert_eq!(searched_paths.len(), 2);
        } else {
            panic!("Expected ConfigFileNotFound error");
        }
    }

    #[test]
    fn test_environment_specific_overrides() {
        let (_temp_dir, config_dir) = setup_test_config_dir();

        let manager =
            ConfigManager::load_from_directory_with_env(Some(config_dir.clone()), "test").unwrap();
        let config = manager.config();
        assert_eq!(manager.environment(), "test");
        assert_eq!(config.engine.sweep_interval_seconds, 1);
        assert_eq!(config.engine.default_organization_levels, 2);
        assert_eq!(config.logging.level, "debug");
        assert!(!config.logging.json);

        let manager =
            ConfigManager::load_from_directory_with_env(Some(config_dir.clone()), "production")
                .unwrap();
        assert_eq!(manager.config().engine.sweep_interval_seconds, 300);
        assert!(manager.config().logging.json);

        let manager =
            ConfigManager::load_from_directory_with_env(Some(config_dir), "development").unwrap();
        assert_eq!(manager.config().events.channel_capacity, 512);
        assert_eq!(manager.config().logging.level, "info");
    }

    #[test]
    fn test_invalid_values_fail_validation() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join("approval-config.yml"),
            "events:\n  channel_capacity: 0\n",
        )
        .unwrap();

        let result =
            ConfigManager::load_from_directory_with_env(Some(temp_dir.path().to_path_buf()), "test");
        assert!(matches!(result, Err(ConfigurationError::InvalidValue { .. })));
    }

    #[test]
    fn test_invalid_yaml() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("approval-config.yaml"), "engine: [unclosed").unwrap();

        let result =
            ConfigManager::load_from_directory_with_env(Some(temp_dir.path().to_path_buf()), "test");
        assert!(matches!(result, Err(ConfigurationError::InvalidYaml { .. })));
    }

    #[test]
    fn test_empty_file_yields_defaults() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("approval-config.yaml"), "").unwrap();

        let manager =
            ConfigManager::load_from_directory_with_env(Some(temp_dir.path().to_path_buf()), "test")
                .unwrap();
        assert_eq!(manager.config(), &ApprovalConfig::default());
    }
}
