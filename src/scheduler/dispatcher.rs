//! Per-tick dispatch.
//!
//! Each pass scans a snapshot of the registry, applies the admission policy
//! to every due entry and launches admitted job bodies as detached tasks.
//! The pass never waits for a job body.
//!
//! Admission, per due entry:
//! 1. Stopped entries are skipped.
//! 2. Closed entries are collected and removed after the scan.
//! 3. The entry is claimed as Running and an in-flight slot is reserved; a
//!    singleton that already has an invocation in flight is skipped.
//! 4. One run is consumed. The final run closes the entry; a run claimed
//!    after the final one is skipped.
//! 5. The job body is launched. When the last in-flight invocation finishes
//!    the entry goes back to Ready, stays Stopped, or is removed if it was
//!    closed meanwhile.
//!
//! Under [`PanicPolicy::Propagate`] a panicking job body halts the whole
//! manager once the entry's bookkeeping is done.

use chrono::{DateTime, Utc};
use std::any::Any;
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tokio::runtime::Handle;

use crate::config::PanicPolicy;
use crate::core::entry::{Consumed, Entry};
use crate::core::types::{AtomicStatus, RunId, Status};
use crate::events::{Event, EventBus, JobOutcome};
use crate::registry::Registry;

use super::types::{DispatchReport, JobPanic};

/// Result of applying the admission policy to one due entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Admission {
    /// Launch an invocation. `last` marks the entry's final allowed run.
    Dispatch { last: bool },
    /// Do not launch this tick.
    Skip(SkipReason),
    /// The entry is closed and should be removed.
    Remove,
}

/// Why a due entry was not launched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SkipReason {
    Stopped,
    Overlap,
    Exhausted,
}

/// Decide whether `entry` runs this tick, updating its status and counter.
pub(crate) fn admit(entry: &Entry) -> Admission {
    let status = entry.status_cell();

    let mut current = status.load();
    loop {
        match current {
            Status::Stopped => return Admission::Skip(SkipReason::Stopped),
            Status::Closed => return Admission::Remove,
            Status::Ready | Status::Running => {
                match status.compare_exchange(current, Status::Running) {
                    Ok(_) => break,
                    Err(actual) => current = actual,
                }
            }
        }
    }

    if !entry.claim() {
        return Admission::Skip(SkipReason::Overlap);
    }

    let admission = match entry.runs().consume() {
        Consumed::Unlimited => Admission::Dispatch { last: false },
        Consumed::More(remaining) => {
            tracing::trace!(entry = %entry.name(), remaining, "Run consumed");
            Admission::Dispatch { last: false }
        }
        Consumed::Last => {
            if status.swap(Status::Closed) == Status::Closed {
                Admission::Skip(SkipReason::Exhausted)
            } else {
                Admission::Dispatch { last: true }
            }
        }
        Consumed::Exhausted => {
            status.store(Status::Closed);
            Admission::Skip(SkipReason::Exhausted)
        }
    };

    if !matches!(admission, Admission::Dispatch { .. }) {
        entry.release();
    }
    admission
}

/// Launches due entries and settles them when their job body returns.
#[derive(Clone)]
pub(crate) struct Dispatcher {
    registry: Arc<Registry>,
    events: Arc<EventBus>,
    runtime: Handle,
    panic_policy: PanicPolicy,
    manager_status: Arc<AtomicStatus>,
    fault: Arc<OnceLock<JobPanic>>,
}

impl Dispatcher {
    pub(crate) fn new(
        registry: Arc<Registry>,
        events: Arc<EventBus>,
        runtime: Handle,
        panic_policy: PanicPolicy,
        manager_status: Arc<AtomicStatus>,
        fault: Arc<OnceLock<JobPanic>>,
    ) -> Self {
        Self {
            registry,
            events,
            runtime,
            panic_policy,
            manager_status,
            fault,
        }
    }

    /// Run one pass for the tick instant `now`.
    pub(crate) async fn run_pass(&self, now: DateTime<Utc>) -> DispatchReport {
        let mut report = DispatchReport::default();
        let mut closed = Vec::new();

        for entry in self.registry.snapshot() {
            if !entry.schedule().is_due(now) {
                continue;
            }
            report.due += 1;

            match admit(&entry) {
                Admission::Dispatch { last } => {
                    if last {
                        tracing::debug!(entry = %entry.name(), "Dispatching final run");
                    }
                    report.launched += 1;
                    self.launch(entry);
                }
                Admission::Skip(reason) => {
                    tracing::debug!(entry = %entry.name(), ?reason, "Skipping due entry");
                    report.skipped += 1;
                }
                Admission::Remove => closed.push(entry),
            }
        }

        // Removal is batched so the scan never mutates the registry
        for entry in self.registry.remove_batch(&closed) {
            report.removed += 1;
            tracing::info!(entry = %entry.name(), "Removed closed entry");
            self.events.emit(Event::entry_removed(entry.name())).await;
        }

        if report.due > 0 {
            tracing::debug!(
                due = report.due,
                launched = report.launched,
                skipped = report.skipped,
                removed = report.removed,
                "Dispatch pass finished"
            );
        }
        report
    }

    /// Launch a detached invocation of `entry`.
    fn launch(&self, entry: Arc<Entry>) {
        let dispatcher = self.clone();
        self.runtime.spawn(async move {
            dispatcher.invoke(entry).await;
        });
    }

    async fn invoke(&self, entry: Arc<Entry>) {
        let run_id = RunId::new();
        self.events
            .emit(Event::job_started(entry.name(), run_id.clone()))
            .await;

        let start = Instant::now();
        let job = entry.job();
        // The body runs in its own task so a panic unwinds there, not here
        let result = self.runtime.spawn(async move { job().await }).await;
        let duration = start.elapsed();

        let outcome = match result {
            Ok(()) => JobOutcome::Completed,
            Err(e) if e.is_panic() => {
                let message = panic_message(e.into_panic().as_ref());
                tracing::error!(
                    entry = %entry.name(),
                    run_id = %run_id,
                    panic = %message,
                    "Job panicked"
                );
                JobOutcome::Panicked(message)
            }
            Err(_) => {
                tracing::warn!(entry = %entry.name(), run_id = %run_id, "Job cancelled");
                JobOutcome::Cancelled
            }
        };

        if self.settle(&entry) {
            tracing::info!(entry = %entry.name(), "Removed closed entry");
            self.events.emit(Event::entry_removed(entry.name())).await;
        }

        if let (JobOutcome::Panicked(message), PanicPolicy::Propagate) =
            (&outcome, self.panic_policy)
        {
            self.halt(&entry, &run_id, message);
        }

        self.events
            .emit(Event::job_completed(entry.name(), run_id, outcome, duration))
            .await;
    }

    /// Record the first escalated panic and close the manager.
    fn halt(&self, entry: &Entry, run_id: &RunId, message: &str) {
        let _ = self.fault.set(JobPanic {
            entry: entry.name().to_string(),
            run_id: run_id.clone(),
            message: message.to_string(),
        });
        if self.manager_status.swap(Status::Closed) != Status::Closed {
            tracing::error!(
                entry = %entry.name(),
                run_id = %run_id,
                panic = %message,
                "Job panic escalated, closing cron manager"
            );
        }
    }

    /// Post-invocation status update. Returns true if the entry was removed.
    fn settle(&self, entry: &Arc<Entry>) -> bool {
        let remaining = entry.release();
        let status = entry.status_cell();
        let mut current = status.load();
        loop {
            match current {
                Status::Closed => return self.registry.remove_entry(entry),
                Status::Stopped => return false,
                // Overlapping invocations still running keep the entry Running
                _ if remaining > 0 => return false,
                Status::Ready | Status::Running => {
                    match status.compare_exchange(current, Status::Ready) {
                        Ok(_) => return false,
                        Err(actual) => current = actual,
                    }
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
