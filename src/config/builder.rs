//! Programmatic configuration builder.

use std::time::Duration;

use super::error::ConfigError;
use super::types::{CronConfig, PanicPolicy};
use super::yaml::YamlLoader;

/// Builder for [`CronConfig`].
#[derive(Debug, Clone, Default)]
pub struct CronConfigBuilder {
    config: CronConfig,
}

impl CronConfigBuilder {
    /// Start from the defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the tick interval.
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.config.tick_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the timezone cron fields are evaluated in.
    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.config.timezone = timezone.into();
        self
    }

    /// Set the panic policy for job bodies.
    pub fn with_panic_policy(mut self, policy: PanicPolicy) -> Self {
        self.config.panic_policy = policy;
        self
    }

    /// Set the seed for generated entry names.
    pub fn with_name_seed(mut self, seed: u64) -> Self {
        self.config.name_seed = seed;
        self
    }

    /// Validate and build the configuration.
    pub fn build(self) -> Result<CronConfig, ConfigError> {
        YamlLoader::validate(&self.config)?;
        Ok(self.config)
    }
}
