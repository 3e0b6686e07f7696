pub mod executions;
pub mod runs;
pub mod webhooks;
pub mod workflows;

use axum::Json;
use serde_json::{json, Value};

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
