//! Configuration type definitions.
//!
//! This module contains the manager configuration and the policy applied to
//! job bodies that panic.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default tick period in milliseconds.
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1000;

/// Default seed for generated entry names; the first generated name is seed + 1.
pub const DEFAULT_NAME_SEED: u64 = 1_000_000;

/// What the dispatcher does when a job body panics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PanicPolicy {
    /// Catch the panic, log it and report it as a failed invocation.
    #[default]
    Isolate,
    /// Finish the entry's bookkeeping, then close the manager and record the
    /// panic (see `Cron::check`).
    Propagate,
}

/// Manager configuration (cronlet.yaml).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CronConfig {
    /// Tick period of the driver in milliseconds.
    pub tick_interval_ms: u64,
    /// IANA timezone that cron fields are evaluated in.
    pub timezone: String,
    /// Panic handling for job bodies.
    pub panic_policy: PanicPolicy,
    /// Seed for sequentially generated entry names.
    pub name_seed: u64,
}

impl Default for CronConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            timezone: "UTC".to_string(),
            panic_policy: PanicPolicy::default(),
            name_seed: DEFAULT_NAME_SEED,
        }
    }
}

impl CronConfig {
    /// Tick period as a [`Duration`].
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}
