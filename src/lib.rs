//! In-process periodic job manager.
//!
//! Register async jobs against cron patterns or fixed intervals, and a
//! [`Cron`] manager launches them on a tokio runtime as their schedule
//! comes due. Entries can be limited to a number of runs, kept from
//! overlapping with themselves, paused and resumed individually or all
//! at once.
//!
//! ```no_run
//! use cronlet::Cron;
//!
//! # async fn demo() -> Result<(), cronlet::CronError> {
//! let cron = Cron::with_defaults()?;
//! cron.add_singleton("@every 5s", || async { println!("tick") }, Some("heartbeat"))?;
//! cron.add_times("0 */1 * * * *", 3, || async { println!("three times") }, None)?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod events;
pub(crate) mod registry;
pub mod scheduler;
pub mod testing;
pub mod timer;

pub use config::{CronConfig, CronConfigBuilder, PanicPolicy, YamlLoader};
pub use core::entry::{Entry, Job, JobFuture, job_fn};
pub use core::schedule::{Schedule, ScheduleError};
pub use core::types::{RunId, RunLimit, Status};
pub use events::{Event, EventBus, EventHandler, JobOutcome};
pub use scheduler::{Cron, CronError, DispatchReport, EntryOptions, JobPanic};
pub use timer::{TickControl, Timer};
