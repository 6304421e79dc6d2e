//! Periodic clock service.
//!
//! The [`Timer`] drives callbacks at a fixed interval on a tokio runtime and
//! runs one-shot delayed work. A periodic callback detaches itself by
//! returning [`TickControl::Exit`].

use std::future::Future;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// What a periodic callback wants after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickControl {
    /// Keep the callback registered.
    Continue,
    /// Detach the callback permanently.
    Exit,
}

/// Clock service bound to a tokio runtime.
#[derive(Debug, Clone)]
pub struct Timer {
    runtime: Handle,
    interval: Duration,
}

impl Timer {
    /// Create a timer ticking every `interval` on `runtime`.
    pub fn new(runtime: Handle, interval: Duration) -> Self {
        Self { runtime, interval }
    }

    /// Create a timer on the runtime of the calling context.
    ///
    /// Returns `None` outside a tokio runtime.
    pub fn current(interval: Duration) -> Option<Self> {
        Handle::try_current()
            .ok()
            .map(|runtime| Self::new(runtime, interval))
    }

    /// The tick period.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Handle of the runtime the timer spawns on.
    pub fn runtime(&self) -> Handle {
        self.runtime.clone()
    }

    /// Invoke `callback` once per tick until it returns [`TickControl::Exit`].
    ///
    /// The first tick fires immediately. Ticks missed because the runtime
    /// was busy are skipped rather than replayed in a burst.
    pub fn add_interval<F>(&self, mut callback: F) -> JoinHandle<()>
    where
        F: FnMut() -> TickControl + Send + 'static,
    {
        let period = self.interval;
        self.runtime.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if callback() == TickControl::Exit {
                    tracing::debug!("Timer callback detached");
                    break;
                }
            }
        })
    }

    /// Run `work` once after `delay`.
    pub fn add_once<F>(&self, delay: Duration, work: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            work.await
        })
    }

    /// Spawn `work` immediately on the timer's runtime.
    pub fn spawn<F>(&self, work: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.runtime.spawn(work)
    }
}
