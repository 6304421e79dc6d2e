//! Configuration loading and parsing.
//!
//! This module provides YAML-based configuration for the manager along with
//! a programmatic builder.

mod builder;
mod error;
mod types;
mod yaml;

pub use builder::CronConfigBuilder;
pub use error::ConfigError;
pub use types::{CronConfig, DEFAULT_NAME_SEED, DEFAULT_TICK_INTERVAL_MS, PanicPolicy};
pub use yaml::YamlLoader;
