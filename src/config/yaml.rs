//! YAML configuration loading.

use std::path::Path;

use crate::core::schedule::parse_timezone;

use super::error::ConfigError;
use super::types::CronConfig;

/// YAML configuration loader.
pub struct YamlLoader;

impl YamlLoader {
    /// Load configuration from a file.
    pub fn load(path: impl AsRef<Path>) -> Result<CronConfig, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileReadError {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn parse(yaml: &str) -> Result<CronConfig, ConfigError> {
        let config: CronConfig = serde_yaml::from_str(yaml)?;
        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate a configuration.
    pub fn validate(config: &CronConfig) -> Result<(), ConfigError> {
        // A zero period would make tokio's interval panic
        if config.tick_interval_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "tick_interval_ms must be greater than zero".into(),
            ));
        }

        parse_timezone(&config.timezone)
            .map_err(|e| ConfigError::InvalidConfig(e.to_string()))?;

        Ok(())
    }
}
