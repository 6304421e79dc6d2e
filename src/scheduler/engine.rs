//! Cron manager implementation.
//!
//! The manager is responsible for:
//! - Registering entries, immediately or after a delay
//! - Global and per-entry start/stop
//! - Driving the dispatcher once per timer tick
//! - Detaching from the timer once closed

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::config::{ConfigError, CronConfig, YamlLoader};
use crate::core::entry::{Entry, Job, job_fn};
use crate::core::schedule::{Schedule, parse_timezone};
use crate::core::types::{AtomicStatus, RunLimit, Status};
use crate::events::{Event, EventBus};
use crate::registry::Registry;
use crate::timer::{TickControl, Timer};

use super::dispatcher::Dispatcher;
use super::types::{CronError, DispatchReport, EntryOptions, JobPanic};

/// State shared by every handle and by the timer callback.
struct Shared {
    registry: Arc<Registry>,
    events: Arc<EventBus>,
    dispatcher: Dispatcher,
    timer: Timer,
    status: Arc<AtomicStatus>,
    fault: Arc<OnceLock<JobPanic>>,
    timezone: Tz,
    config: CronConfig,
    name_counter: AtomicU64,
    sequence: AtomicU64,
    driver: OnceLock<JoinHandle<()>>,
}

/// Periodic job manager.
///
/// Cloning yields another handle to the same registry. The timer callback
/// only holds a weak reference: once [`Cron::close`] is called, or the last
/// handle is dropped, the next tick detaches the driver.
#[derive(Clone)]
pub struct Cron {
    shared: Arc<Shared>,
}

impl Cron {
    /// Create a manager driven by the current tokio runtime.
    pub fn new(config: CronConfig) -> Result<Self, CronError> {
        let timer = Timer::current(config.tick_interval()).ok_or(CronError::NoRuntime)?;
        Self::with_timer(config, timer)
    }

    /// Create a manager with [`CronConfig::default`].
    pub fn with_defaults() -> Result<Self, CronError> {
        Self::new(CronConfig::default())
    }

    /// Create a manager driven by an explicit timer.
    ///
    /// The timer's interval takes precedence over `config.tick_interval_ms`.
    pub fn with_timer(config: CronConfig, timer: Timer) -> Result<Self, CronError> {
        YamlLoader::validate(&config)?;
        if timer.interval().is_zero() {
            return Err(ConfigError::InvalidConfig(
                "timer interval must be greater than zero".into(),
            )
            .into());
        }
        let timezone = parse_timezone(&config.timezone)
            .map_err(|e| ConfigError::InvalidConfig(e.to_string()))?;

        let registry = Arc::new(Registry::new());
        let events = Arc::new(EventBus::new());
        let status = Arc::new(AtomicStatus::new(Status::Running));
        let fault = Arc::new(OnceLock::new());
        let dispatcher = Dispatcher::new(
            Arc::clone(&registry),
            Arc::clone(&events),
            timer.runtime(),
            config.panic_policy,
            Arc::clone(&status),
            Arc::clone(&fault),
        );

        let shared = Arc::new(Shared {
            registry,
            events,
            dispatcher,
            timer,
            status,
            fault,
            timezone,
            name_counter: AtomicU64::new(config.name_seed),
            sequence: AtomicU64::new(0),
            config,
            driver: OnceLock::new(),
        });

        let weak = Arc::downgrade(&shared);
        let driver = shared.timer.add_interval(move || tick(&weak));
        let _ = shared.driver.set(driver);

        tracing::info!(
            tick_interval = ?shared.timer.interval(),
            timezone = %shared.timezone,
            "Cron manager started"
        );
        Ok(Self { shared })
    }

    /// Register an unlimited entry.
    pub fn add<F, Fut>(
        &self,
        pattern: &str,
        job: F,
        name: Option<&str>,
    ) -> Result<Arc<Entry>, CronError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.add_with(pattern, job_fn(job), EntryOptions::new().named(name))
    }

    /// Register an entry that never overlaps with itself.
    pub fn add_singleton<F, Fut>(
        &self,
        pattern: &str,
        job: F,
        name: Option<&str>,
    ) -> Result<Arc<Entry>, CronError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.add_with(pattern, job_fn(job), EntryOptions::new().named(name).singleton())
    }

    /// Register an entry that runs once and is then removed.
    pub fn add_once<F, Fut>(
        &self,
        pattern: &str,
        job: F,
        name: Option<&str>,
    ) -> Result<Arc<Entry>, CronError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.add_with(pattern, job_fn(job), EntryOptions::new().named(name).once())
    }

    /// Register an entry that runs `times` times and is then removed.
    pub fn add_times<F, Fut>(
        &self,
        pattern: &str,
        times: u64,
        job: F,
        name: Option<&str>,
    ) -> Result<Arc<Entry>, CronError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.add_with(pattern, job_fn(job), EntryOptions::new().named(name).times(times))
    }

    /// Register an entry with explicit options.
    pub fn add_with(
        &self,
        pattern: &str,
        job: Job,
        options: EntryOptions,
    ) -> Result<Arc<Entry>, CronError> {
        let shared = &self.shared;
        if shared.status.load() == Status::Closed {
            return Err(CronError::Closed);
        }
        if options.limit == RunLimit::Finite(0) {
            return Err(CronError::InvalidTimes);
        }
        if let Some(name) = options
            .name
            .as_deref()
            .filter(|n| shared.registry.contains(n))
        {
            return Err(CronError::DuplicateName(name.to_string()));
        }

        let schedule = Schedule::with_anchor(pattern, shared.timezone, Utc::now())
            .map_err(|source| CronError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })?;

        let name = match options.name {
            Some(name) => name,
            None => self.generate_name(),
        };
        let sequence = shared.sequence.fetch_add(1, Ordering::SeqCst);
        let entry = Entry::new(name, sequence, schedule, job, options.singleton, options.limit);

        let entry = shared
            .registry
            .insert(entry)
            .map_err(|rejected| CronError::DuplicateName(rejected.name().to_string()))?;

        tracing::info!(
            entry = %entry.name(),
            pattern = %entry.pattern(),
            singleton = entry.is_singleton(),
            runs = %entry.run_limit(),
            "Entry added"
        );
        Ok(entry)
    }

    /// Next free sequential name.
    fn generate_name(&self) -> String {
        loop {
            let id = self.shared.name_counter.fetch_add(1, Ordering::SeqCst) + 1;
            let name = id.to_string();
            if !self.shared.registry.contains(&name) {
                return name;
            }
        }
    }

    /// Register an unlimited entry after `delay`.
    ///
    /// Failures are logged and emitted as [`Event::RegistrationFailed`]; the
    /// returned handle also resolves to the registration result.
    pub fn delay_add<F, Fut>(
        &self,
        delay: Duration,
        pattern: &str,
        job: F,
        name: Option<&str>,
    ) -> JoinHandle<Result<Arc<Entry>, CronError>>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.delay_add_with(delay, pattern, job_fn(job), EntryOptions::new().named(name))
    }

    /// Register a singleton entry after `delay`.
    pub fn delay_add_singleton<F, Fut>(
        &self,
        delay: Duration,
        pattern: &str,
        job: F,
        name: Option<&str>,
    ) -> JoinHandle<Result<Arc<Entry>, CronError>>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.delay_add_with(
            delay,
            pattern,
            job_fn(job),
            EntryOptions::new().named(name).singleton(),
        )
    }

    /// Register a run-once entry after `delay`.
    pub fn delay_add_once<F, Fut>(
        &self,
        delay: Duration,
        pattern: &str,
        job: F,
        name: Option<&str>,
    ) -> JoinHandle<Result<Arc<Entry>, CronError>>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.delay_add_with(delay, pattern, job_fn(job), EntryOptions::new().named(name).once())
    }

    /// Register an entry limited to `times` runs after `delay`.
    pub fn delay_add_times<F, Fut>(
        &self,
        delay: Duration,
        pattern: &str,
        times: u64,
        job: F,
        name: Option<&str>,
    ) -> JoinHandle<Result<Arc<Entry>, CronError>>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.delay_add_with(
            delay,
            pattern,
            job_fn(job),
            EntryOptions::new().named(name).times(times),
        )
    }

    /// Register an entry with explicit options after `delay`.
    pub fn delay_add_with(
        &self,
        delay: Duration,
        pattern: &str,
        job: Job,
        options: EntryOptions,
    ) -> JoinHandle<Result<Arc<Entry>, CronError>> {
        let cron = self.clone();
        let pattern = pattern.to_string();
        self.shared.timer.add_once(delay, async move {
            let requested = options.name.clone();
            match cron.add_with(&pattern, job, options) {
                Ok(entry) => {
                    cron.shared.events.emit(Event::entry_added(entry.name())).await;
                    Ok(entry)
                }
                Err(e) => {
                    tracing::error!(
                        entry = ?requested,
                        pattern = %pattern,
                        error = %e,
                        "Deferred registration failed"
                    );
                    cron.shared
                        .events
                        .emit(Event::registration_failed(requested, &e))
                        .await;
                    Err(e)
                }
            }
        })
    }

    /// Look up an entry by name.
    pub fn search(&self, name: &str) -> Option<Arc<Entry>> {
        self.shared.registry.get(name)
    }

    /// Remove an entry by name. In-flight invocations are not interrupted.
    pub fn remove(&self, name: &str) -> Option<Arc<Entry>> {
        let removed = self.shared.registry.remove(name);
        if removed.is_some() {
            tracing::info!(entry = %name, "Entry removed");
        }
        removed
    }

    /// Start dispatching.
    ///
    /// With no names the manager as a whole resumes; otherwise only the named
    /// entries do. Unknown names are ignored. Has no effect once closed.
    pub fn start(&self, names: &[&str]) {
        if names.is_empty() {
            let previous = self.shared.status.transition_unless_closed(Status::Running);
            if previous == Status::Stopped || previous == Status::Ready {
                tracing::info!("Cron manager resumed");
            }
            return;
        }
        for entry in names.iter().filter_map(|name| self.search(name)) {
            entry.start();
            tracing::debug!(entry = %entry.name(), "Entry started");
        }
    }

    /// Stop dispatching.
    ///
    /// With no names the whole manager pauses (the timer keeps ticking);
    /// otherwise only the named entries do. In-flight invocations continue.
    pub fn stop(&self, names: &[&str]) {
        if names.is_empty() {
            let previous = self.shared.status.transition_unless_closed(Status::Stopped);
            if previous == Status::Running {
                tracing::info!("Cron manager stopped");
            }
            return;
        }
        for entry in names.iter().filter_map(|name| self.search(name)) {
            entry.stop();
            tracing::debug!(entry = %entry.name(), "Entry stopped");
        }
    }

    /// Close the manager. The driver detaches on its next tick; this is final.
    pub fn close(&self) {
        if self.shared.status.swap(Status::Closed) != Status::Closed {
            tracing::info!("Cron manager closed");
        }
    }

    /// Global status.
    pub fn status(&self) -> Status {
        self.shared.status.load()
    }

    /// The job panic that halted the manager, if any.
    ///
    /// Only set under [`PanicPolicy::Propagate`](crate::config::PanicPolicy).
    pub fn fault(&self) -> Option<&JobPanic> {
        self.shared.fault.get()
    }

    /// `Err(CronError::JobPanicked)` once a propagated job panic has halted
    /// the manager.
    pub fn check(&self) -> Result<(), CronError> {
        match self.fault() {
            Some(panic) => Err(panic.into()),
            None => Ok(()),
        }
    }

    /// Whether the timer callback has detached.
    pub fn is_detached(&self) -> bool {
        self.shared
            .driver
            .get()
            .is_some_and(|driver| driver.is_finished())
    }

    /// Number of registered entries.
    pub fn size(&self) -> usize {
        self.shared.registry.len()
    }

    /// Snapshot of every entry, ordered by registration time.
    pub fn entries(&self) -> Vec<Arc<Entry>> {
        self.shared.registry.sorted()
    }

    /// Event bus for registering lifecycle handlers.
    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.shared.events
    }

    /// Active configuration.
    pub fn config(&self) -> &CronConfig {
        &self.shared.config
    }

    /// Run one dispatch pass for `at` without waiting for the timer.
    ///
    /// Does nothing unless the manager is running.
    pub async fn dispatch_at(&self, at: DateTime<Utc>) -> DispatchReport {
        if self.shared.status.load() != Status::Running {
            return DispatchReport::default();
        }
        self.shared.dispatcher.run_pass(at).await
    }
}

/// Timer callback: detach once closed or orphaned, dispatch while running.
fn tick(weak: &Weak<Shared>) -> TickControl {
    let Some(shared) = weak.upgrade() else {
        tracing::debug!("Cron manager dropped, detaching driver");
        return TickControl::Exit;
    };
    match shared.status.load() {
        Status::Closed => {
            tracing::info!("Cron manager closed, detaching driver");
            TickControl::Exit
        }
        Status::Running => {
            let dispatcher = shared.dispatcher.clone();
            shared.timer.spawn(async move {
                dispatcher.run_pass(Utc::now()).await;
            });
            TickControl::Continue
        }
        Status::Ready | Status::Stopped => TickControl::Continue,
    }
}
