//! Cron manager and per-tick dispatch.
//!
//! This module provides the [`Cron`] facade that registers entries and the
//! dispatcher that launches due entries on every timer tick.

mod dispatcher;
mod engine;
mod types;

pub use engine::Cron;
pub use types::{CronError, DispatchReport, EntryOptions, JobPanic};
