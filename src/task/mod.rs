//! # Task Orchestration
//!
//! Owns the process lifecycle state for the reconciliation task: the
//! `{Idle, Scheduled, Running}` phase, the cron ticker, the run timeout,
//! and mutual exclusion between the scheduled and manual trigger paths.
//! Both paths contend on one run mutex, so a scheduled tick and a manual
//! trigger can never execute the engine concurrently.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::{CronConfig, TaskConfig};
use crate::error::{PipelineError, Result};
use crate::sync::{SyncEngine, SyncOptions, SyncReport};

/// Lifecycle phase of the scheduled task. Manual runs do not change the
/// phase; they are tracked by the separate `manual_running` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPhase {
    Idle,
    Scheduled,
    Running,
}

/// Outcome of a `start()`/`stop()` call, serialized as `{"status": ...}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum ControlStatus {
    Scheduled,
    AlreadyScheduled,
    CurrentlyRunning,
    Idle,
    AlreadyIdle,
}

/// Outcome of a manual `run()` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum RunStatus {
    Started,
    Complete,
    AlreadyRunning,
    Error { error: String },
}

/// Options for a manual run.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Block until the run completes and report its outcome.
    pub wait: bool,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    /// Per-run override of the configured timeout.
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, Copy)]
enum RunKind {
    Scheduled,
    Manual,
}

impl RunKind {
    fn as_str(self) -> &'static str {
        match self {
            RunKind::Scheduled => "scheduled",
            RunKind::Manual => "manual",
        }
    }
}

struct TaskState {
    phase: TaskPhase,
    manual_running: bool,
    ticker: Option<JoinHandle<()>>,
}

pub struct TaskOrchestrator {
    engine: Arc<SyncEngine>,
    schedule: Schedule,
    schedule_expr: String,
    timezone: Tz,
    timeout: Duration,
    exit_on_timeout: bool,
    state: Mutex<TaskState>,
    run_lock: Arc<AsyncMutex<()>>,
}

impl TaskOrchestrator {
    pub fn new(
        engine: Arc<SyncEngine>,
        task: &TaskConfig,
        cron: &CronConfig,
    ) -> Result<Arc<Self>> {
        let schedule = Schedule::from_str(&cron.schedule).map_err(|e| {
            PipelineError::Configuration(format!("invalid cron schedule {:?}: {e}", cron.schedule))
        })?;
        let timezone: Tz = cron.timezone.parse().map_err(|e| {
            PipelineError::Configuration(format!("invalid timezone {:?}: {e}", cron.timezone))
        })?;

        Ok(Arc::new(Self {
            engine,
            schedule,
            schedule_expr: cron.schedule.clone(),
            timezone,
            timeout: Duration::from_secs(task.timeout_secs),
            exit_on_timeout: task.exit_on_timeout,
            state: Mutex::new(TaskState {
                phase: TaskPhase::Idle,
                manual_running: false,
                ticker: None,
            }),
            run_lock: Arc::new(AsyncMutex::new(())),
        }))
    }

    pub fn phase(&self) -> TaskPhase {
        self.state.lock().phase
    }

    /// Arm the recurring cron timer.
    pub fn start(self: &Arc<Self>) -> ControlStatus {
        let mut state = self.state.lock();
        match state.phase {
            TaskPhase::Running => ControlStatus::CurrentlyRunning,
            TaskPhase::Scheduled => ControlStatus::AlreadyScheduled,
            TaskPhase::Idle => {
                state.phase = TaskPhase::Scheduled;
                state.ticker = Some(self.spawn_ticker());
                info!(schedule = %self.schedule_expr, timezone = %self.timezone, "task scheduled");
                ControlStatus::Scheduled
            }
        }
    }

    /// Disarm the cron timer. A run already in flight is not cancelled.
    pub fn stop(&self) -> ControlStatus {
        let mut state = self.state.lock();
        if state.phase == TaskPhase::Idle {
            return ControlStatus::AlreadyIdle;
        }
        if let Some(ticker) = state.ticker.take() {
            ticker.abort();
        }
        state.phase = TaskPhase::Idle;
        info!("task stopped");
        ControlStatus::Idle
    }

    /// Manual trigger.
    pub async fn run(self: &Arc<Self>, opts: RunOptions) -> RunStatus {
        {
            let state = self.state.lock();
            if state.manual_running {
                return RunStatus::AlreadyRunning;
            }
        }
        let Ok(permit) = Arc::clone(&self.run_lock).try_lock_owned() else {
            return RunStatus::AlreadyRunning;
        };
        self.state.lock().manual_running = true;

        let timeout = opts.timeout.unwrap_or(self.timeout);
        let sync_opts = SyncOptions {
            start_date: opts.start_date,
            end_date: opts.end_date,
        };

        if opts.wait {
            match Arc::clone(self)
                .guarded_run(permit, RunKind::Manual, sync_opts, timeout)
                .await
            {
                Ok(_) => RunStatus::Complete,
                Err(err) => RunStatus::Error {
                    error: err.to_string(),
                },
            }
        } else {
            let orchestrator = Arc::clone(self);
            tokio::spawn(async move {
                let _ = orchestrator
                    .guarded_run(permit, RunKind::Manual, sync_opts, timeout)
                    .await;
            });
            RunStatus::Started
        }
    }

    fn spawn_ticker(self: &Arc<Self>) -> JoinHandle<()> {
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let now = Utc::now().with_timezone(&orchestrator.timezone);
                let Some(next) = orchestrator.schedule.after(&now).next() else {
                    warn!("cron schedule has no future fire times; ticker exiting");
                    break;
                };
                let delay = (next - now).to_std().unwrap_or(Duration::ZERO);
                tokio::time::sleep(delay).await;
                orchestrator.scheduled_tick().await;
            }
        })
    }

    async fn scheduled_tick(self: &Arc<Self>) {
        let Ok(permit) = Arc::clone(&self.run_lock).try_lock_owned() else {
            warn!("previous run still in progress; skipping scheduled tick");
            return;
        };
        self.state.lock().phase = TaskPhase::Running;
        let _ = Arc::clone(self)
            .guarded_run(permit, RunKind::Scheduled, SyncOptions::default(), self.timeout)
            .await;
    }

    /// Execution wrapper shared by both trigger paths. Holds the run
    /// permit for the duration, bounds the run with a timeout, and resets
    /// the lifecycle state afterward. A timed-out run future is dropped,
    /// abandoning in-flight I/O; under the default policy the process then
    /// exits so the supervisor restarts it rather than reusing a possibly
    /// wedged HTTP or database client.
    async fn guarded_run(
        self: Arc<Self>,
        _permit: OwnedMutexGuard<()>,
        kind: RunKind,
        opts: SyncOptions,
        timeout: Duration,
    ) -> Result<SyncReport> {
        info!(kind = kind.as_str(), "reconciliation run starting");
        let outcome = tokio::time::timeout(timeout, self.engine.run(&opts)).await;

        {
            let mut state = self.state.lock();
            match kind {
                RunKind::Manual => state.manual_running = false,
                RunKind::Scheduled => {
                    // stop() may have gone to Idle mid-run; do not
                    // resurrect the schedule in that case.
                    if state.phase == TaskPhase::Running {
                        state.phase = TaskPhase::Scheduled;
                    }
                }
            }
        }

        match outcome {
            Ok(Ok(report)) => {
                info!(
                    kind = kind.as_str(),
                    rows_considered = report.rows_considered,
                    rows_inserted = report.rows_inserted,
                    "reconciliation run finished"
                );
                Ok(report)
            }
            Ok(Err(err)) => {
                error!(kind = kind.as_str(), error = %err, "reconciliation run failed");
                Err(err)
            }
            Err(_) => {
                error!(
                    kind = kind.as_str(),
                    timeout_secs = timeout.as_secs(),
                    "reconciliation run timed out; in-flight operations abandoned"
                );
                if self.exit_on_timeout {
                    error!("terminating so the supervisor restarts the process with fresh connections");
                    std::process::exit(1);
                }
                Err(PipelineError::Timeout(timeout))
            }
        }
    }
}
