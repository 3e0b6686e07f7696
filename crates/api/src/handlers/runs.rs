use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use db::{RunRecord, RunStatus};

use crate::{ApiError, AppState};

pub async fn get(
    Path(run_id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<RunRecord>, ApiError> {
    match state.runs.get_run(run_id).await {
        Ok(run) => Ok(Json(run)),
        Err(db::DbError::NotFound) => Err(ApiError::NotFound(format!("run {run_id}"))),
        Err(e) => Err(e.into()),
    }
}

/// Takes effect before the run's next iteration; a node already executing
/// finishes.
pub async fn cancel(
    Path(run_id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<Value>, ApiError> {
    let cancelled = match state.runs.transition(run_id, RunStatus::Cancelled, None).await {
        Ok(cancelled) => cancelled,
        Err(db::DbError::NotFound) => return Err(ApiError::NotFound(format!("run {run_id}"))),
        Err(e) => return Err(e.into()),
    };

    if !cancelled {
        let run = state.runs.get_run(run_id).await?;
        return Err(ApiError::Conflict(format!("run {run_id} is already {}", run.status)));
    }

    info!(%run_id, "run cancelled");
    Ok(Json(json!({ "status": "cancelled", "run_id": run_id })))
}
