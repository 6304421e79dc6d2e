//! Scheduler type definitions.
//!
//! This module contains the error type, registration options and the
//! per-tick dispatch report.

use thiserror::Error;

use crate::config::ConfigError;
use crate::core::schedule::ScheduleError;
use crate::core::types::{RunId, RunLimit};

/// Errors that can occur in the scheduler.
#[derive(Debug, Error)]
pub enum CronError {
    /// An entry with this name is already registered.
    #[error("cron job \"{0}\" already exists")]
    DuplicateName(String),

    /// The schedule pattern could not be compiled.
    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: ScheduleError,
    },

    /// A finite run count of zero was requested.
    #[error("run count must be at least 1")]
    InvalidTimes,

    /// No tokio runtime was available to drive the timer.
    #[error("no tokio runtime available to drive the scheduler")]
    NoRuntime,

    /// The manager has been closed.
    #[error("cron manager is closed")]
    Closed,

    /// A job panicked and, under the propagate policy, halted the manager.
    #[error("cron job \"{entry}\" panicked: {message}")]
    JobPanicked { entry: String, message: String },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Options applied to an entry before it becomes visible to the dispatcher.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryOptions {
    /// Explicit name; generated sequentially when `None`.
    pub name: Option<String>,
    /// Suppress overlapping invocations.
    pub singleton: bool,
    /// How many times the entry may run.
    pub limit: RunLimit,
}

impl EntryOptions {
    /// Unnamed, non-singleton, unlimited.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set or clear the explicit name.
    pub fn named(mut self, name: Option<&str>) -> Self {
        self.name = name.map(str::to_string);
        self
    }

    /// Enable singleton mode.
    pub fn singleton(mut self) -> Self {
        self.singleton = true;
        self
    }

    /// Limit the entry to `times` runs.
    pub fn times(mut self, times: u64) -> Self {
        self.limit = RunLimit::Finite(times);
        self
    }

    /// Limit the entry to a single run.
    pub fn once(self) -> Self {
        self.times(1)
    }
}

/// A job panic escalated under [`PanicPolicy::Propagate`](crate::config::PanicPolicy).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPanic {
    /// Entry whose job body panicked.
    pub entry: String,
    /// The invocation that panicked.
    pub run_id: RunId,
    /// Panic payload rendered as text.
    pub message: String,
}

impl From<&JobPanic> for CronError {
    fn from(panic: &JobPanic) -> Self {
        CronError::JobPanicked {
            entry: panic.entry.clone(),
            message: panic.message.clone(),
        }
    }
}

/// Summary of one dispatcher pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Entries whose schedule matched the tick instant.
    pub due: usize,
    /// Job invocations launched.
    pub launched: usize,
    /// Due entries skipped (stopped, overlapping singleton, exhausted).
    pub skipped: usize,
    /// Closed entries removed by the cleanup step.
    pub removed: usize,
}
