//! Lifecycle events and event handling.
//!
//! This module provides event emission for entry and job lifecycle events,
//! enabling observability into dispatch and deferred registration.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::core::types::RunId;

/// How a single job invocation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// The job body ran to completion.
    Completed,
    /// The job body panicked with the given message.
    Panicked(String),
    /// The job task was cancelled, e.g. by runtime shutdown.
    Cancelled,
}

impl JobOutcome {
    /// Whether the invocation completed without panicking.
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Completed)
    }
}

/// Lifecycle events emitted by the manager and the dispatcher.
#[derive(Debug, Clone)]
pub enum Event {
    /// An entry was registered by a deferred registration.
    EntryAdded { entry: String, timestamp: Instant },

    /// A closed entry was removed from the registry.
    EntryRemoved { entry: String, timestamp: Instant },

    /// A job invocation was launched.
    JobStarted {
        entry: String,
        run_id: RunId,
        timestamp: Instant,
    },

    /// A job invocation finished.
    JobCompleted {
        entry: String,
        run_id: RunId,
        outcome: JobOutcome,
        duration: Duration,
        timestamp: Instant,
    },

    /// A deferred registration failed after its caller had already returned.
    RegistrationFailed {
        /// Requested name, if one was given.
        entry: Option<String>,
        error: String,
        timestamp: Instant,
    },
}

impl Event {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> Instant {
        match self {
            Event::EntryAdded { timestamp, .. } => *timestamp,
            Event::EntryRemoved { timestamp, .. } => *timestamp,
            Event::JobStarted { timestamp, .. } => *timestamp,
            Event::JobCompleted { timestamp, .. } => *timestamp,
            Event::RegistrationFailed { timestamp, .. } => *timestamp,
        }
    }

    /// Name of the entry the event concerns, if known.
    pub fn entry(&self) -> Option<&str> {
        match self {
            Event::EntryAdded { entry, .. }
            | Event::EntryRemoved { entry, .. }
            | Event::JobStarted { entry, .. }
            | Event::JobCompleted { entry, .. } => Some(entry),
            Event::RegistrationFailed { entry, .. } => entry.as_deref(),
        }
    }

    /// Create an EntryAdded event.
    pub fn entry_added(entry: impl Into<String>) -> Self {
        Event::EntryAdded {
            entry: entry.into(),
            timestamp: Instant::now(),
        }
    }

    /// Create an EntryRemoved event.
    pub fn entry_removed(entry: impl Into<String>) -> Self {
        Event::EntryRemoved {
            entry: entry.into(),
            timestamp: Instant::now(),
        }
    }

    /// Create a JobStarted event.
    pub fn job_started(entry: impl Into<String>, run_id: RunId) -> Self {
        Event::JobStarted {
            entry: entry.into(),
            run_id,
            timestamp: Instant::now(),
        }
    }

    /// Create a JobCompleted event.
    pub fn job_completed(
        entry: impl Into<String>,
        run_id: RunId,
        outcome: JobOutcome,
        duration: Duration,
    ) -> Self {
        Event::JobCompleted {
            entry: entry.into(),
            run_id,
            outcome,
            duration,
            timestamp: Instant::now(),
        }
    }

    /// Create a RegistrationFailed event.
    pub fn registration_failed(entry: Option<String>, error: impl ToString) -> Self {
        Event::RegistrationFailed {
            entry,
            error: error.to_string(),
            timestamp: Instant::now(),
        }
    }
}

/// Handler for receiving lifecycle events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle an event.
    async fn handle(&self, event: &Event);
}

/// Event bus for distributing events to registered handlers.
pub struct EventBus {
    handlers: RwLock<Vec<Arc<dyn EventHandler>>>,
}

impl EventBus {
    /// Create a new event bus with no handlers.
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
        }
    }

    /// Register an event handler.
    pub async fn register(&self, handler: Arc<dyn EventHandler>) {
        let mut handlers = self.handlers.write().await;
        handlers.push(handler);
    }

    /// Emit an event to all registered handlers.
    pub async fn emit(&self, event: Event) {
        let handlers = self.handlers.read().await;
        for handler in handlers.iter() {
            handler.handle(&event).await;
        }
    }

    /// Get the number of registered handlers.
    pub async fn handler_count(&self) -> usize {
        self.handlers.read().await.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
