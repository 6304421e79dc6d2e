//! Dispatch integration tests.
//!
//! Tests that verify run limits, singleton suppression, overlap and panic
//! handling as driven by the manager's own timer.

use chrono::Utc;
use cronlet::testing::{EventRecorder, JobProbe};
use cronlet::{CronError, EntryOptions, Event, JobOutcome, PanicPolicy, RunLimit, Status};
use std::sync::Arc;
use std::time::Duration;

use crate::common::{EVERY_SECOND, add_tracked, manager, manager_with_policy, wait_until};

#[tokio::test(start_paused = true)]
async fn test_run_limit_runs_exactly_n_times_then_removes() {
    let cron = manager();
    let probe = JobProbe::new();
    add_tracked(&cron, &probe, EntryOptions::new().named(Some("a")).times(3));

    // Ticks at 0s..=5s
    tokio::time::sleep(Duration::from_millis(5500)).await;

    assert_eq!(probe.started(), 3);
    assert!(cron.search("a").is_none());
    assert_eq!(cron.size(), 0);
    cron.close();
}

#[tokio::test(start_paused = true)]
async fn test_add_once_runs_a_single_time() {
    let cron = manager();
    let probe = JobProbe::new();
    add_tracked(&cron, &probe, EntryOptions::new().once());

    tokio::time::sleep(Duration::from_millis(3500)).await;

    assert_eq!(probe.started(), 1);
    assert_eq!(cron.size(), 0);
    cron.close();
}

#[tokio::test(start_paused = true)]
async fn test_singleton_does_not_overlap() {
    let cron = manager();
    let probe = JobProbe::new().with_duration(Duration::from_secs(10));
    add_tracked(&cron, &probe, EntryOptions::new().named(Some("s")).singleton());

    // Ticks at 0s..=3s, the first invocation is still sleeping
    tokio::time::sleep(Duration::from_millis(3500)).await;

    assert_eq!(probe.started(), 1);
    assert_eq!(probe.peak_concurrency(), 1);
    assert_eq!(cron.search("s").unwrap().status(), Status::Running);
    cron.close();
}

#[tokio::test(start_paused = true)]
async fn test_singleton_skips_do_not_consume_runs() {
    let cron = manager();
    let probe = JobProbe::new().with_duration(Duration::from_millis(2500));
    let options = EntryOptions::new().named(Some("s")).singleton().times(2);
    let entry = add_tracked(&cron, &probe, options);

    // First run covers ticks 0s..=2s; ticks 1s and 2s are skipped
    tokio::time::sleep(Duration::from_millis(2700)).await;
    assert_eq!(probe.finished(), 1);
    assert_eq!(entry.run_limit(), RunLimit::Finite(1));

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(probe.started(), 2);
    assert!(cron.search("s").is_none());
    cron.close();
}

#[tokio::test(start_paused = true)]
async fn test_non_singleton_overlaps() {
    let cron = manager();
    let probe = JobProbe::new().with_duration(Duration::from_secs(10));
    add_tracked(&cron, &probe, EntryOptions::new());

    tokio::time::sleep(Duration::from_millis(3500)).await;

    assert_eq!(probe.started(), 4);
    assert_eq!(probe.peak_concurrency(), 4);
    cron.close();
}

#[tokio::test(start_paused = true)]
async fn test_unlimited_entry_is_never_removed() {
    let cron = manager();
    let probe = JobProbe::new();
    let entry = add_tracked(&cron, &probe, EntryOptions::new().named(Some("forever")));

    tokio::time::sleep(Duration::from_millis(20_500)).await;

    assert!(probe.started() >= 20);
    assert!(cron.search("forever").is_some());
    assert_eq!(entry.run_limit(), RunLimit::Unlimited);
    assert_eq!(entry.status(), Status::Ready);
    cron.close();
}

#[tokio::test(start_paused = true)]
async fn test_stopped_entry_is_not_dispatched() {
    let cron = manager();
    let stopped = JobProbe::new();
    let running = JobProbe::new();
    add_tracked(&cron, &stopped, EntryOptions::new().named(Some("a")).times(2));
    add_tracked(&cron, &running, EntryOptions::new().named(Some("b")));
    cron.stop(&["a"]);

    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(stopped.started(), 0);
    assert!(running.started() >= 3);
    // Stopped entries keep their remaining runs
    assert_eq!(cron.search("a").unwrap().run_limit(), RunLimit::Finite(2));

    cron.start(&["a"]);
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(stopped.started(), 2);
    assert!(cron.search("a").is_none());
    cron.close();
}

#[tokio::test(start_paused = true)]
async fn test_removed_entry_stops_dispatching() {
    let cron = manager();
    let probe = JobProbe::new();
    add_tracked(&cron, &probe, EntryOptions::new().named(Some("gone")));

    tokio::time::sleep(Duration::from_millis(1500)).await;
    let seen = probe.started();
    assert!(seen >= 1);

    assert!(cron.remove("gone").is_some());
    assert!(cron.remove("gone").is_none());
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(probe.started(), seen);
    cron.close();
}

#[tokio::test(start_paused = true)]
async fn test_panicking_job_is_isolated() {
    let cron = manager();
    let recorder = Arc::new(EventRecorder::new());
    cron.event_bus().register(recorder.clone()).await;

    cron.add(EVERY_SECOND, || async { panic!("boom") }, Some("bad")).unwrap();
    let healthy = JobProbe::new();
    add_tracked(&cron, &healthy, EntryOptions::new().named(Some("good")));

    tokio::time::sleep(Duration::from_millis(2500)).await;

    assert!(healthy.started() >= 2);
    let bad = cron.search("bad").unwrap();
    assert_eq!(bad.status(), Status::Ready);
    assert_eq!(cron.status(), Status::Running);
    assert!(cron.fault().is_none());
    assert!(cron.check().is_ok());

    let panicked = recorder
        .filter(|e| {
            matches!(
                e,
                Event::JobCompleted { entry, outcome: JobOutcome::Panicked(message), .. }
                    if entry == "bad" && message == "boom"
            )
        })
        .await;
    assert!(panicked.len() >= 2);
    cron.close();
}

#[tokio::test(start_paused = true)]
async fn test_propagated_panic_closes_manager() {
    let cron = manager_with_policy(PanicPolicy::Propagate);
    let recorder = Arc::new(EventRecorder::new());
    cron.event_bus().register(recorder.clone()).await;

    let healthy = JobProbe::new();
    add_tracked(&cron, &healthy, EntryOptions::new().named(Some("good")));
    cron.add_once(EVERY_SECOND, || async { panic!("fatal") }, Some("bad")).unwrap();

    wait_until(|| cron.fault().is_some(), Duration::from_secs(3), "escalated panic").await;
    assert_eq!(cron.status(), Status::Closed);
    let fault = cron.fault().unwrap();
    assert_eq!(fault.entry, "bad");
    assert_eq!(fault.message, "fatal");
    let err = cron.check().unwrap_err();
    assert!(matches!(err, CronError::JobPanicked { ref entry, .. } if entry == "bad"));
    assert_eq!(err.to_string(), "cron job \"bad\" panicked: fatal");

    // Bookkeeping ran before the manager closed
    assert!(cron.search("bad").is_none());
    let removed = recorder
        .filter(|e| matches!(e, Event::EntryRemoved { entry, .. } if entry == "bad"))
        .await;
    assert_eq!(removed.len(), 1);
    let completed = recorder
        .filter(|e| matches!(e, Event::JobCompleted { outcome: JobOutcome::Panicked(_), .. }))
        .await;
    assert_eq!(completed.len(), 1);

    // Nothing else is dispatched once the driver lets go
    wait_until(|| cron.is_detached(), Duration::from_secs(3), "driver detach").await;
    let seen = healthy.started();
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(healthy.started(), seen);
}

#[tokio::test(start_paused = true)]
async fn test_singleton_restart_keeps_single_flight() {
    let cron = manager();
    let tracker = JobProbe::new().with_duration(Duration::from_secs(10));
    add_tracked(&cron, &tracker, EntryOptions::new().named(Some("s")).singleton());

    tokio::time::sleep(Duration::from_millis(1500)).await;
    // Starting an entry that is mid-run must not free its slot
    cron.start(&["s"]);
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(tracker.started(), 1);
    assert_eq!(tracker.peak_concurrency(), 1);
    cron.close();
}

#[tokio::test(start_paused = true)]
async fn test_singleton_stop_then_start_keeps_single_flight() {
    let cron = manager();
    let tracker = JobProbe::new().with_duration(Duration::from_secs(10));
    let entry = add_tracked(&cron, &tracker, EntryOptions::new().named(Some("s")).singleton());

    tokio::time::sleep(Duration::from_millis(1500)).await;
    cron.stop(&["s"]);
    cron.start(&["s"]);
    assert_eq!(entry.status(), Status::Ready);
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(tracker.started(), 1);
    assert_eq!(tracker.peak_concurrency(), 1);
    assert_eq!(entry.in_flight(), 1);
    cron.close();
}

#[tokio::test(start_paused = true)]
async fn test_closed_idle_entry_is_removed_on_next_pass() {
    let cron = manager();
    let recorder = Arc::new(EventRecorder::new());
    cron.event_bus().register(recorder.clone()).await;

    let tracker = JobProbe::new();
    let entry = add_tracked(&cron, &tracker, EntryOptions::new().named(Some("idle")));
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(entry.status(), Status::Ready);

    entry.close();
    let report = cron.dispatch_at(Utc::now()).await;
    assert_eq!(report.removed, 1);
    assert_eq!(report.launched, 0);
    assert!(cron.search("idle").is_none());

    // Later ticks do not report it again
    tokio::time::sleep(Duration::from_secs(2)).await;
    let removed = recorder
        .filter(|e| matches!(e, Event::EntryRemoved { entry, .. } if entry == "idle"))
        .await;
    assert_eq!(removed.len(), 1);
    cron.close();
}

#[tokio::test(start_paused = true)]
async fn test_lifecycle_events_are_emitted_per_run() {
    let cron = manager();
    let recorder = Arc::new(EventRecorder::new());
    cron.event_bus().register(recorder.clone()).await;

    let probe = JobProbe::new();
    add_tracked(&cron, &probe, EntryOptions::new().named(Some("e")).times(2));

    tokio::time::sleep(Duration::from_millis(3500)).await;

    let started = recorder
        .filter(|e| matches!(e, Event::JobStarted { .. }))
        .await;
    let completed = recorder
        .filter(|e| matches!(e, Event::JobCompleted { outcome: JobOutcome::Completed, .. }))
        .await;
    let removed = recorder
        .filter(|e| matches!(e, Event::EntryRemoved { .. }))
        .await;

    assert_eq!(started.len(), 2);
    assert_eq!(completed.len(), 2);
    assert_eq!(removed.len(), 1);
    assert!(started.iter().all(|e| e.entry() == Some("e")));
    cron.close();
}
