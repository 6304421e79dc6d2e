//! Registered job entries.
//!
//! An [`Entry`] pairs an immutable identity (name, creation time, schedule and
//! job body) with the only state the dispatcher mutates concurrently: its
//! status, its in-flight invocation count and its remaining run count. All
//! three are accessed through atomics.
//!
//! Status records whether the entry is paused or closed; the in-flight count
//! alone decides singleton overlap, so resuming an entry mid-run cannot let
//! a second invocation start.

use chrono::{DateTime, Utc};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};

use super::schedule::Schedule;
use super::types::{AtomicStatus, RunLimit, Status};

/// Boxed future returned by a job body.
pub type JobFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// A zero-argument async job body, shareable across invocations.
pub type Job = Arc<dyn Fn() -> JobFuture + Send + Sync + 'static>;

/// Wrap an async closure into a [`Job`].
pub fn job_fn<F, Fut>(f: F) -> Job
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move || Box::pin(f()) as JobFuture)
}

/// Outcome of consuming one run from a [`RunCounter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Consumed {
    /// The counter is unlimited; nothing was consumed.
    Unlimited,
    /// Runs remain after this one.
    More(u64),
    /// This was the final allowed run.
    Last,
    /// The final run was already claimed by someone else.
    Exhausted,
}

/// Remaining-run counter with an explicit unlimited mode.
#[derive(Debug)]
pub(crate) struct RunCounter {
    unlimited: AtomicBool,
    remaining: AtomicI64,
}

impl RunCounter {
    pub(crate) fn new(limit: RunLimit) -> Self {
        let counter = Self {
            unlimited: AtomicBool::new(true),
            remaining: AtomicI64::new(0),
        };
        counter.set(limit);
        counter
    }

    pub(crate) fn set(&self, limit: RunLimit) {
        match limit {
            RunLimit::Unlimited => self.unlimited.store(true, Ordering::SeqCst),
            RunLimit::Finite(n) => {
                let n = i64::try_from(n).unwrap_or(i64::MAX);
                self.remaining.store(n, Ordering::SeqCst);
                self.unlimited.store(false, Ordering::SeqCst);
            }
        }
    }

    pub(crate) fn get(&self) -> RunLimit {
        if self.unlimited.load(Ordering::SeqCst) {
            return RunLimit::Unlimited;
        }
        RunLimit::Finite(self.remaining.load(Ordering::SeqCst).max(0) as u64)
    }

    /// Atomically decrement, then classify the value left behind.
    pub(crate) fn consume(&self) -> Consumed {
        if self.unlimited.load(Ordering::SeqCst) {
            return Consumed::Unlimited;
        }
        let left = self.remaining.fetch_sub(1, Ordering::SeqCst) - 1;
        match left {
            n if n > 0 => Consumed::More(n as u64),
            0 => Consumed::Last,
            _ => Consumed::Exhausted,
        }
    }
}

/// A single registered recurring job.
pub struct Entry {
    name: String,
    created_at: DateTime<Utc>,
    sequence: u64,
    schedule: Schedule,
    job: Job,
    singleton: AtomicBool,
    in_flight: AtomicUsize,
    runs: RunCounter,
    status: AtomicStatus,
}

impl Entry {
    pub(crate) fn new(
        name: String,
        sequence: u64,
        schedule: Schedule,
        job: Job,
        singleton: bool,
        limit: RunLimit,
    ) -> Self {
        Self {
            name,
            created_at: Utc::now(),
            sequence,
            schedule,
            job,
            singleton: AtomicBool::new(singleton),
            in_flight: AtomicUsize::new(0),
            runs: RunCounter::new(limit),
            status: AtomicStatus::new(Status::Ready),
        }
    }

    /// Unique name within the owning registry.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registration time.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Sort key for listings: registration time, then registration order.
    pub(crate) fn order_key(&self) -> (DateTime<Utc>, u64) {
        (self.created_at, self.sequence)
    }

    /// The compiled schedule.
    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    /// The pattern the schedule was compiled from.
    pub fn pattern(&self) -> &str {
        self.schedule.pattern()
    }

    /// Current status.
    pub fn status(&self) -> Status {
        self.status.load()
    }

    pub(crate) fn status_cell(&self) -> &AtomicStatus {
        &self.status
    }

    pub(crate) fn runs(&self) -> &RunCounter {
        &self.runs
    }

    pub(crate) fn job(&self) -> Job {
        Arc::clone(&self.job)
    }

    /// Invocations launched and not yet settled.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Reserve an invocation slot. A singleton only gets one when none are
    /// in flight; returns false if the slot was refused.
    pub(crate) fn claim(&self) -> bool {
        if self.is_singleton() {
            self.in_flight
                .compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        } else {
            self.in_flight.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    /// Give back a slot taken by [`Entry::claim`]; returns how many remain.
    pub(crate) fn release(&self) -> usize {
        match self
            .in_flight
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        {
            Ok(previous) => previous - 1,
            Err(_) => 0,
        }
    }

    /// Whether overlapping invocations are suppressed.
    pub fn is_singleton(&self) -> bool {
        self.singleton.load(Ordering::SeqCst)
    }

    /// Enable or disable singleton mode.
    pub fn set_singleton(&self, singleton: bool) {
        self.singleton.store(singleton, Ordering::SeqCst);
    }

    /// Remaining runs.
    pub fn run_limit(&self) -> RunLimit {
        self.runs.get()
    }

    /// Replace the remaining run count.
    pub fn set_times(&self, limit: RunLimit) {
        self.runs.set(limit);
    }

    /// Resume dispatch of a stopped entry.
    ///
    /// Only a Stopped entry moves to Ready; running and closed entries are
    /// left as they are.
    pub fn start(&self) {
        let _ = self.status.compare_exchange(Status::Stopped, Status::Ready);
    }

    /// Pause dispatch. In-flight invocations are not interrupted.
    pub fn stop(&self) {
        self.status.transition_unless_closed(Status::Stopped);
    }

    /// Close the entry; it is removed on the next due tick or when its
    /// in-flight invocation completes.
    pub fn close(&self) {
        self.status.store(Status::Closed);
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("name", &self.name)
            .field("pattern", &self.schedule.pattern())
            .field("created_at", &self.created_at)
            .field("singleton", &self.is_singleton())
            .field("in_flight", &self.in_flight())
            .field("runs", &self.run_limit())
            .field("status", &self.status())
            .finish()
    }
}
