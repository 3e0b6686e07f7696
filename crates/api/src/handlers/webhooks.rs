use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use tracing::info;

use crate::{ApiError, AppState};

/// `POST /webhooks/{service_name}`: the body becomes `trigger_data` of one
/// new run per active blueprint triggered by `service_name`.
pub async fn handle_webhook(
    Path(service_name): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let run_ids = state.dispatcher.dispatch(&service_name, payload).await?;

    if run_ids.is_empty() {
        info!(service = %service_name, "no active workflow for webhook");
        return Ok((
            StatusCode::OK,
            Json(json!({
                "status": "ignored",
                "count": 0,
                "reason": format!("no active workflow for {service_name}"),
            })),
        ));
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "status": "dispatched",
            "count": run_ids.len(),
            "run_ids": run_ids,
        })),
    ))
}
