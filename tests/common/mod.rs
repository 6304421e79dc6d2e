//! Common test utilities shared across integration tests.

use cronlet::testing::JobProbe;
use cronlet::{Cron, CronConfigBuilder, Entry, EntryOptions, PanicPolicy};
use std::sync::Arc;
use std::time::Duration;

/// Pattern that matches every second.
pub const EVERY_SECOND: &str = "* * * * * *";

/// Install a test subscriber once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Manager ticking once per second on the current runtime.
pub fn manager() -> Cron {
    manager_with_policy(PanicPolicy::Isolate)
}

/// Manager ticking once per second with the given panic policy.
pub fn manager_with_policy(policy: PanicPolicy) -> Cron {
    init_tracing();
    let config = CronConfigBuilder::new()
        .with_tick_interval(Duration::from_secs(1))
        .with_panic_policy(policy)
        .build()
        .unwrap();
    Cron::new(config).unwrap()
}

/// Register `tracker`'s job on [`EVERY_SECOND`] with `options`.
pub fn add_tracked(cron: &Cron, tracker: &JobProbe, options: EntryOptions) -> Arc<Entry> {
    cron.add_with(EVERY_SECOND, tracker.job(), options).unwrap()
}

/// Wait until `condition` holds, polling every 10ms.
///
/// # Panics
///
/// Panics if the timeout is reached first.
pub async fn wait_until<F>(mut condition: F, timeout: Duration, what: &str)
where
    F: FnMut() -> bool,
{
    let start = tokio::time::Instant::now();
    loop {
        if condition() {
            return;
        }
        if start.elapsed() > timeout {
            panic!("Timeout waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
