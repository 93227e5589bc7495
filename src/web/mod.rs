//! # HTTP Control Surface
//!
//! Thin axum layer over the orchestrator: lifecycle control, status, and
//! the SQL maintenance entry point. All real behavior lives behind the
//! service objects carried in [`AppState`].

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::Result;
use crate::store::PgStore;
use crate::sync::parse_date;
use crate::task::{ControlStatus, RunOptions, RunStatus, TaskOrchestrator};

/// Shared handler state. Service objects are constructed once at process
/// start and passed in by reference; handlers never reach for globals.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<TaskOrchestrator>,
    pub store: Arc<PgStore>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/start", post(start))
        .route("/stop", post(stop))
        .route("/run", post(run))
        .route("/execute-sql-file", post(execute_sql_file))
        .with_state(state)
}

async fn status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "status": state.orchestrator.phase() }))
}

async fn start(State(state): State<AppState>) -> Json<ControlStatus> {
    Json(state.orchestrator.start())
}

async fn stop(State(state): State<AppState>) -> Json<ControlStatus> {
    Json(state.orchestrator.stop())
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RunParams {
    wait: Option<bool>,
    start_date: Option<String>,
    end_date: Option<String>,
    /// Milliseconds.
    timeout: Option<u64>,
}

fn run_options(params: &RunParams) -> Result<RunOptions> {
    Ok(RunOptions {
        wait: params.wait.unwrap_or(false),
        start_date: params.start_date.as_deref().map(parse_date).transpose()?,
        end_date: params.end_date.as_deref().map(parse_date).transpose()?,
        timeout: params.timeout.map(Duration::from_millis),
    })
}

async fn run(State(state): State<AppState>, Query(params): Query<RunParams>) -> Json<RunStatus> {
    let opts = match run_options(&params) {
        Ok(opts) => opts,
        Err(err) => {
            return Json(RunStatus::Error {
                error: err.to_string(),
            })
        }
    };
    Json(state.orchestrator.run(opts).await)
}

#[derive(Debug, Deserialize)]
struct SqlFileParams {
    file: String,
}

async fn execute_sql_file(
    State(state): State<AppState>,
    Query(params): Query<SqlFileParams>,
) -> Json<Value> {
    match state.store.execute_sql_file(&params.file).await {
        Ok(()) => Json(json!({ "status": "complete" })),
        Err(err) => Json(json!({ "status": "error", "error": err.to_string() })),
    }
}
