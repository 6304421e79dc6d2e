//! Deferred registration integration tests.

use cronlet::testing::{EventRecorder, JobProbe};
use cronlet::{CronError, EntryOptions, Event};
use std::sync::Arc;
use std::time::Duration;

use crate::common::{EVERY_SECOND, manager};

#[tokio::test(start_paused = true)]
async fn test_delay_add_registers_after_delay() {
    let cron = manager();
    let recorder = Arc::new(EventRecorder::new());
    cron.event_bus().register(recorder.clone()).await;

    let delay = Duration::from_secs(2);
    let handle = cron.delay_add(delay, EVERY_SECOND, || async {}, Some("later"));

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(cron.search("later").is_none());

    let entry = handle.await.unwrap().unwrap();
    assert_eq!(entry.name(), "later");
    assert!(cron.search("later").is_some());

    let added = recorder
        .filter(|e| matches!(e, Event::EntryAdded { entry, .. } if entry == "later"))
        .await;
    assert_eq!(added.len(), 1);
    cron.close();
}

#[tokio::test(start_paused = true)]
async fn test_deferred_duplicate_is_reported_not_raised() {
    let cron = manager();
    let recorder = Arc::new(EventRecorder::new());
    cron.event_bus().register(recorder.clone()).await;

    cron.add(EVERY_SECOND, || async {}, Some("x")).unwrap();
    let handle =
        cron.delay_add_singleton(Duration::from_secs(1), EVERY_SECOND, || async {}, Some("x"));

    let result = handle.await.expect("deferred task must not panic");
    assert!(matches!(result, Err(CronError::DuplicateName(ref name)) if name == "x"));
    assert_eq!(cron.size(), 1);

    let failures = recorder
        .filter(|e| matches!(e, Event::RegistrationFailed { .. }))
        .await;
    assert_eq!(failures.len(), 1);
    match &failures[0] {
        Event::RegistrationFailed { entry, error, .. } => {
            assert_eq!(entry.as_deref(), Some("x"));
            assert!(error.contains("already exists"));
        }
        other => panic!("Expected RegistrationFailed event, got {other:?}"),
    }
    cron.close();
}

#[tokio::test(start_paused = true)]
async fn test_delay_add_times_runs_limited() {
    let cron = manager();
    let probe = JobProbe::new();
    let _pending = cron.delay_add_with(
        Duration::from_millis(1500),
        EVERY_SECOND,
        probe.job(),
        EntryOptions::new().named(Some("d")).times(2),
    );

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(probe.started(), 2);
    assert!(cron.search("d").is_none());
    cron.close();
}

#[tokio::test(start_paused = true)]
async fn test_deferred_invalid_pattern_is_reported() {
    let cron = manager();
    let recorder = Arc::new(EventRecorder::new());
    cron.event_bus().register(recorder.clone()).await;

    let result = cron
        .delay_add_once(Duration::from_secs(1), "not a cron", || async {}, None)
        .await
        .unwrap();
    assert!(matches!(result, Err(CronError::InvalidPattern { .. })));

    let failures = recorder
        .filter(|e| matches!(e, Event::RegistrationFailed { entry: None, .. }))
        .await;
    assert_eq!(failures.len(), 1);
    cron.close();
}

#[tokio::test(start_paused = true)]
async fn test_deferred_add_after_close_fails() {
    let cron = manager();
    let delay = Duration::from_secs(1);
    let handle = cron.delay_add_times(delay, EVERY_SECOND, 3, || async {}, Some("late"));
    cron.close();

    let result = handle.await.unwrap();
    assert!(matches!(result, Err(CronError::Closed)));
    assert_eq!(cron.size(), 0);
}
