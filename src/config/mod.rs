//! # Approval Engine Configuration
//!
//! YAML-based configuration with environment-specific overrides.
//!
//! ## Architecture
//!
//! - **Single file**: `config/approval-config.yaml` holds the base settings
//! - **Environment Awareness**: a top-level `development`, `test` or
//!   `production` section is deep-merged over the base
//! - **Explicit Validation**: zero capacities and intervals are refused
//!
//! ## Usage
//!
//! ```rust,no_run
//! use approval_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let retries = manager.config().engine.max_conflict_retries;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use crate::constants::system;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ApprovalConfig {
    pub engine: EngineConfig,
    pub events: EventsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Optimistic-concurrency retries per operation before surfacing `StaleState`
    pub max_conflict_retries: u32,
    /// Hierarchy levels climbed when a flow leaves `organization_levels` unset
    pub default_organization_levels: u32,
    /// Period of the background timeout sweeper
    pub sweep_interval_seconds: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_conflict_retries: system::DEFAULT_MAX_CONFLICT_RETRIES,
            default_organization_levels: system::DEFAULT_ORGANIZATION_LEVELS,
            sweep_interval_seconds: system::DEFAULT_SWEEP_INTERVAL_SECONDS,
        }
    }
}

impl EngineConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    pub channel_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: system::DEFAULT_EVENT_CHANNEL_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `approval_core=debug`
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl ApprovalConfig {
    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.engine.default_organization_levels == 0 {
            return Err(ConfigurationError::invalid_value(
                "engine.default_organization_levels",
                "0",
                "at least one hierarchy level is required",
            ));
        }

        if self.engine.sweep_interval_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "engine.sweep_interval_seconds",
                "0",
                "sweep interval must be greater than 0",
            ));
        }

        if self.events.channel_capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "events.channel_capacity",
                "0",
                "channel capacity must be greater than 0",
            ));
        }

        if self.logging.level.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "logging.level",
                "logging configuration",
            ));
        }

        Ok(())
    }
}
