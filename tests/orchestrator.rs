//! Orchestrator state machine and mutual exclusion behavior.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::{engine, hour, record, FakeSource, FakeStore};
use occupancy_pipeline::config::{CronConfig, TaskConfig};
use occupancy_pipeline::sync::SyncEngine;
use occupancy_pipeline::task::{ControlStatus, RunOptions, RunStatus, TaskOrchestrator, TaskPhase};

fn orchestrator(engine: SyncEngine) -> Arc<TaskOrchestrator> {
    let task = TaskConfig {
        timeout_secs: 600,
        // Tests must observe the timeout as an error, not a process exit.
        exit_on_timeout: false,
    };
    let cron = CronConfig {
        schedule: "0 0 4 * * *".to_string(),
        timezone: "UTC".to_string(),
        idle_at_startup: true,
    };
    TaskOrchestrator::new(Arc::new(engine), &task, &cron).expect("valid orchestrator config")
}

fn seeded() -> (Arc<FakeSource>, Arc<FakeStore>, Arc<TaskOrchestrator>) {
    let source = Arc::new(FakeSource::default());
    let store = Arc::new(FakeStore::default());
    *source.occupancy.lock() = vec![record(1, hour(0)), record(1, hour(1)), record(1, hour(2))];
    *store.watermark.lock() = Some(hour(0));
    let orchestrator = orchestrator(engine(&source, &store));
    (source, store, orchestrator)
}

#[tokio::test]
async fn start_and_stop_walk_the_phase_machine() {
    let (_source, _store, orchestrator) = seeded();

    assert_eq!(orchestrator.phase(), TaskPhase::Idle);
    assert_eq!(orchestrator.stop(), ControlStatus::AlreadyIdle);

    assert_eq!(orchestrator.start(), ControlStatus::Scheduled);
    assert_eq!(orchestrator.phase(), TaskPhase::Scheduled);
    assert_eq!(orchestrator.start(), ControlStatus::AlreadyScheduled);

    assert_eq!(orchestrator.stop(), ControlStatus::Idle);
    assert_eq!(orchestrator.phase(), TaskPhase::Idle);
    assert_eq!(orchestrator.stop(), ControlStatus::AlreadyIdle);
}

#[tokio::test]
async fn waited_run_reports_complete() {
    let (_source, store, orchestrator) = seeded();

    let status = orchestrator
        .run(RunOptions {
            wait: true,
            ..RunOptions::default()
        })
        .await;

    assert_eq!(status, RunStatus::Complete);
    // Hours 0 and 1 land; hour 2 is the trailing trim.
    assert_eq!(store.occupancy_inserts.load(Ordering::SeqCst), 2);
    // The manual flag cleared on completion.
    let second = orchestrator
        .run(RunOptions {
            wait: true,
            ..RunOptions::default()
        })
        .await;
    assert_eq!(second, RunStatus::Complete);
}

#[tokio::test]
async fn concurrent_manual_runs_are_rejected() {
    let (source, store, orchestrator) = seeded();
    *source.delay.lock() = Some(Duration::from_millis(200));

    let first = orchestrator.run(RunOptions::default()).await;
    assert_eq!(first, RunStatus::Started);

    // The run is still in flight: a second trigger does no work.
    let second = orchestrator
        .run(RunOptions {
            wait: true,
            ..RunOptions::default()
        })
        .await;
    assert_eq!(second, RunStatus::AlreadyRunning);

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(store.occupancy_inserts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn waited_run_surfaces_configuration_errors() {
    let source = Arc::new(FakeSource::default());
    let store = Arc::new(FakeStore::default());
    // No watermark and no explicit start date.
    let orchestrator = orchestrator(engine(&source, &store));

    let status = orchestrator
        .run(RunOptions {
            wait: true,
            ..RunOptions::default()
        })
        .await;

    match status {
        RunStatus::Error { error } => assert!(error.contains("watermark")),
        other => panic!("expected error status, got {other:?}"),
    }

    // The failure cleared the manual flag; the next run is accepted.
    *store.watermark.lock() = Some(hour(0));
    let retry = orchestrator
        .run(RunOptions {
            wait: true,
            ..RunOptions::default()
        })
        .await;
    assert_eq!(retry, RunStatus::Complete);
}

#[tokio::test]
async fn timed_out_run_reports_the_timeout() {
    let (source, _store, orchestrator) = seeded();
    *source.delay.lock() = Some(Duration::from_millis(300));

    let status = orchestrator
        .run(RunOptions {
            wait: true,
            timeout: Some(Duration::from_millis(50)),
            ..RunOptions::default()
        })
        .await;

    match status {
        RunStatus::Error { error } => assert!(error.contains("timed out")),
        other => panic!("expected timeout error, got {other:?}"),
    }
}

#[tokio::test]
async fn invalid_cron_expression_is_rejected_at_construction() {
    let source = Arc::new(FakeSource::default());
    let store = Arc::new(FakeStore::default());
    let task = TaskConfig {
        timeout_secs: 600,
        exit_on_timeout: false,
    };
    let cron = CronConfig {
        schedule: "not-a-schedule".to_string(),
        timezone: "UTC".to_string(),
        idle_at_startup: true,
    };

    let result = TaskOrchestrator::new(Arc::new(engine(&source, &store)), &task, &cron);
    assert!(result.is_err());
}
