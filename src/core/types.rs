//! Core value types shared by entries and the manager.
//!
//! These types provide the lifecycle status, its lock-free cell, the run limit
//! and the per-invocation run identifier.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use uuid::Uuid;

/// Lifecycle status of an entry or of the manager as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Idle and eligible for dispatch.
    Ready,
    /// An invocation is executing (entries) or the dispatcher is active (manager).
    Running,
    /// Paused; skipped every tick until started again.
    Stopped,
    /// Terminal. Entries are removed, the manager detaches from its timer.
    Closed,
}

impl Status {
    fn as_u8(self) -> u8 {
        match self {
            Status::Ready => 0,
            Status::Running => 1,
            Status::Stopped => 2,
            Status::Closed => 3,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Status::Ready,
            1 => Status::Running,
            2 => Status::Stopped,
            _ => Status::Closed,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Ready => "ready",
            Status::Running => "running",
            Status::Stopped => "stopped",
            Status::Closed => "closed",
        };
        write!(f, "{s}")
    }
}

/// A [`Status`] stored in a single atomic byte.
///
/// Every transition that the dispatcher branches on reports the *previous*
/// value, so overlap and exhaustion checks are decided by exactly one caller.
#[derive(Debug)]
pub struct AtomicStatus(AtomicU8);

impl AtomicStatus {
    /// Create a new cell holding `status`.
    pub fn new(status: Status) -> Self {
        Self(AtomicU8::new(status.as_u8()))
    }

    /// Read the current status.
    pub fn load(&self) -> Status {
        Status::from_u8(self.0.load(Ordering::SeqCst))
    }

    /// Unconditionally replace the status.
    pub fn store(&self, status: Status) {
        self.0.store(status.as_u8(), Ordering::SeqCst);
    }

    /// Replace the status and return the previous one.
    pub fn swap(&self, status: Status) -> Status {
        Status::from_u8(self.0.swap(status.as_u8(), Ordering::SeqCst))
    }

    /// Replace `current` with `new`; on failure returns the value actually seen.
    pub fn compare_exchange(&self, current: Status, new: Status) -> Result<Status, Status> {
        self.0
            .compare_exchange(
                current.as_u8(),
                new.as_u8(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .map(Status::from_u8)
            .map_err(Status::from_u8)
    }

    /// Move to `new` unless the cell is [`Status::Closed`].
    ///
    /// Returns the previous status. Closed is never left once entered.
    pub fn transition_unless_closed(&self, new: Status) -> Status {
        let mut current = self.load();
        loop {
            if current == Status::Closed {
                return current;
            }
            match self.compare_exchange(current, new) {
                Ok(previous) => return previous,
                Err(actual) => current = actual,
            }
        }
    }
}

/// How many more times an entry may be dispatched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunLimit {
    /// Repeat indefinitely.
    #[default]
    Unlimited,
    /// Run at most this many more times.
    Finite(u64),
}

impl fmt::Display for RunLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunLimit::Unlimited => write!(f, "unlimited"),
            RunLimit::Finite(n) => write!(f, "{n}"),
        }
    }
}

/// Unique identifier for a single invocation of a job body.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Uuid);

impl RunId {
    /// Generate a new random RunId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
