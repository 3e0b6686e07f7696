use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use engine::Blueprint;

use crate::{ApiError, AppState};

#[derive(Deserialize)]
pub struct ExecuteWorkflowDto {
    pub blueprint: Value,
    #[serde(default)]
    pub payload: Value,
}

/// `POST /workflow/execute`: run a blueprint right away, whether or not it
/// is saved or active.
pub async fn execute(
    State(state): State<AppState>,
    Json(dto): Json<ExecuteWorkflowDto>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let blueprint: Blueprint = serde_json::from_value(dto.blueprint).map_err(engine::EngineError::from)?;
    let payload = match dto.payload {
        Value::Null => json!({}),
        other => other,
    };

    let run_id = state.engine.launch(&blueprint, payload).await?;

    Ok((StatusCode::ACCEPTED, Json(json!({ "status": "success", "run_id": run_id }))))
}
