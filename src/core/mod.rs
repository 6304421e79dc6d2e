//! Core domain types: schedules, entries and their status.

pub mod entry;
pub mod schedule;
pub mod types;
