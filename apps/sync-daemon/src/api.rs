//! # Admin API
//!
//! JSON endpoints the marketplace back office uses to watch and steer the
//! Tally sync.
//!
//! ## Routes
//! ```text
//! GET  /health                                   liveness
//! GET  /api/tally/status                         latest snapshot, queue, cursor
//! GET  /api/tally/logs?limit=N                   snapshot history, newest first
//! GET  /api/tally/tasks?status=failed&limit=N    outbound task listing
//! POST /api/tally/sync/{entity_type}/{entity_id} manual push of one entity
//! POST /api/tally/jobs/{job}/run                 run a scheduled job now
//! PUT  /api/tally/settings                       toggle tally_sync_enabled
//! ```

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use tracing::info;

use ironmart_core::{
    HealthSnapshot, JobKind, RuntimeSettings, SyncEntityType, SyncOneOutcome, SyncTask,
    SyncTaskStatus,
};
use ironmart_sync::{JobRunOutcome, TallyStatus, TallySyncEngine};

use crate::error::ApiResult;

/// Page size when the caller does not ask for one.
const DEFAULT_LIST_LIMIT: i64 = 50;

/// Shared handler state.
pub type AppState = Arc<TallySyncEngine>;

/// Builds the admin router over a running engine.
pub fn router(engine: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/tally/status", get(status_handler))
        .route("/api/tally/logs", get(logs_handler))
        .route("/api/tally/tasks", get(tasks_handler))
        .route("/api/tally/sync/{entity_type}/{entity_id}", post(sync_handler))
        .route("/api/tally/jobs/{job}/run", post(run_job_handler))
        .route("/api/tally/settings", put(settings_handler))
        .with_state(engine)
}

// =============================================================================
// Query Parameters
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct LogsQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TasksQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

// =============================================================================
// Handlers
// =============================================================================

async fn health_handler() -> impl IntoResponse {
    "OK"
}

async fn status_handler(State(engine): State<AppState>) -> ApiResult<Json<TallyStatus>> {
    Ok(Json(engine.status().await?))
}

async fn logs_handler(
    State(engine): State<AppState>,
    Query(query): Query<LogsQuery>,
) -> ApiResult<Json<Vec<HealthSnapshot>>> {
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    Ok(Json(engine.logs(limit).await?))
}

async fn tasks_handler(
    State(engine): State<AppState>,
    Query(query): Query<TasksQuery>,
) -> ApiResult<Json<Vec<SyncTask>>> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<SyncTaskStatus>)
        .transpose()?;
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    Ok(Json(engine.tasks(status, limit).await?))
}

/// Offline Tally is a normal answer here: 202 with `queued`.
async fn sync_handler(
    State(engine): State<AppState>,
    Path((entity_type, entity_id)): Path<(String, String)>,
) -> ApiResult<(StatusCode, Json<SyncOneOutcome>)> {
    let entity_type: SyncEntityType = entity_type.parse()?;
    let outcome = engine.sync_one(entity_type, &entity_id).await?;

    info!(%entity_type, %entity_id, ?outcome, "Manual sync requested");

    let status = match outcome {
        SyncOneOutcome::QueuedOffline | SyncOneOutcome::InFlight => StatusCode::ACCEPTED,
        _ => StatusCode::OK,
    };
    Ok((status, Json(outcome)))
}

async fn run_job_handler(
    State(engine): State<AppState>,
    Path(job): Path<String>,
) -> ApiResult<Json<JobRunOutcome>> {
    let kind: JobKind = job.parse()?;
    Ok(Json(engine.run_job(kind).await?))
}

async fn settings_handler(
    State(engine): State<AppState>,
    Json(settings): Json<RuntimeSettings>,
) -> ApiResult<Json<RuntimeSettings>> {
    Ok(Json(engine.set_enabled(settings.tally_sync_enabled).await?))
}
