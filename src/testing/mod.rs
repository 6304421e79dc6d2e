//! Testing utilities for users of the cronlet library.
//!
//! This module provides helpers for testing code that registers jobs:
//!
//! - [`JobProbe`]: A job factory that counts invocations and tracks how many
//!   ran at the same time
//! - [`EventRecorder`]: An event handler that keeps every event it receives

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

use crate::core::entry::{Job, JobFuture};
use crate::events::{Event, EventHandler};

#[derive(Debug, Default)]
struct ProbeState {
    started: AtomicUsize,
    finished: AtomicUsize,
    active: AtomicUsize,
    peak: AtomicUsize,
}

/// Job factory that records how it was invoked.
///
/// # Example
///
/// ```
/// use cronlet::testing::JobProbe;
/// use std::time::Duration;
///
/// let probe = JobProbe::new().with_duration(Duration::from_millis(50));
/// let job = probe.job();
/// // Register `job` with `Cron::add_with`, then inspect:
/// assert_eq!(probe.started(), 0);
/// assert_eq!(probe.peak_concurrency(), 0);
/// # drop(job);
/// ```
#[derive(Debug, Clone, Default)]
pub struct JobProbe {
    state: Arc<ProbeState>,
    duration: Option<Duration>,
}

impl JobProbe {
    /// Create a probe whose job returns immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every invocation sleep for `duration` before returning.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Build a job bound to this probe.
    pub fn job(&self) -> Job {
        let state = Arc::clone(&self.state);
        let duration = self.duration;
        Arc::new(move || {
            let state = Arc::clone(&state);
            Box::pin(async move {
                state.started.fetch_add(1, Ordering::SeqCst);
                let active = state.active.fetch_add(1, Ordering::SeqCst) + 1;
                state.peak.fetch_max(active, Ordering::SeqCst);

                if let Some(duration) = duration {
                    tokio::time::sleep(duration).await;
                }

                state.active.fetch_sub(1, Ordering::SeqCst);
                state.finished.fetch_add(1, Ordering::SeqCst);
            }) as JobFuture
        })
    }

    /// Invocations that have begun.
    pub fn started(&self) -> usize {
        self.state.started.load(Ordering::SeqCst)
    }

    /// Invocations that have returned.
    pub fn finished(&self) -> usize {
        self.state.finished.load(Ordering::SeqCst)
    }

    /// Invocations currently in flight.
    pub fn active(&self) -> usize {
        self.state.active.load(Ordering::SeqCst)
    }

    /// Highest number of invocations seen in flight at once.
    pub fn peak_concurrency(&self) -> usize {
        self.state.peak.load(Ordering::SeqCst)
    }
}

/// Event handler that records every event.
#[derive(Default)]
pub struct EventRecorder {
    events: Mutex<Vec<Event>>,
}

impl EventRecorder {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// All events received so far.
    pub async fn events(&self) -> Vec<Event> {
        self.events.lock().await.clone()
    }

    /// Events matching `predicate`.
    pub async fn filter<P>(&self, predicate: P) -> Vec<Event>
    where
        P: Fn(&Event) -> bool,
    {
        self.events
            .lock()
            .await
            .iter()
            .filter(|event| predicate(event))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventHandler for EventRecorder {
    async fn handle(&self, event: &Event) {
        self.events.lock().await.push(event.clone());
    }
}
