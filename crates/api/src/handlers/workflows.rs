use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use db::BlueprintRow;
use engine::{validate_blueprint, Blueprint, EngineError};

use crate::{ApiError, AppState};

#[derive(Deserialize)]
pub struct CreateWorkflowDto {
    #[serde(default)]
    pub name: Option<String>,
    pub blueprint: Value,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Deserialize)]
pub struct SetActiveDto {
    pub is_active: bool,
}

fn not_found(id: &str) -> impl FnOnce(db::DbError) -> ApiError + '_ {
    move |e| match e {
        db::DbError::NotFound => ApiError::NotFound(format!("workflow {id}")),
        other => other.into(),
    }
}

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<BlueprintRow>>, ApiError> {
    Ok(Json(state.blueprints.list_blueprints().await?))
}

pub async fn get(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<BlueprintRow>, ApiError> {
    let row = state.blueprints.get_blueprint(&id).await.map_err(not_found(&id))?;
    Ok(Json(row))
}

/// Validate and store a blueprint. The blueprint's own `id` is kept when it
/// has one, so saving again replaces the earlier version.
pub async fn create(
    State(state): State<AppState>,
    Json(dto): Json<CreateWorkflowDto>,
) -> Result<(StatusCode, Json<BlueprintRow>), ApiError> {
    let mut blueprint: Blueprint = serde_json::from_value(dto.blueprint).map_err(EngineError::from)?;
    validate_blueprint(&blueprint)?;

    let id = blueprint
        .id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    blueprint.id = Some(id.clone());
    if let Some(name) = dto.name.filter(|n| !n.is_empty()) {
        blueprint.name = name;
    }

    let definition = serde_json::to_value(&blueprint).map_err(EngineError::from)?;
    let row = BlueprintRow::new(id, blueprint.name.clone(), definition, dto.is_active);
    state.blueprints.save_blueprint(&row).await?;

    Ok((StatusCode::CREATED, Json(row)))
}

pub async fn set_active(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(dto): Json<SetActiveDto>,
) -> Result<Json<BlueprintRow>, ApiError> {
    state
        .blueprints
        .set_active(&id, dto.is_active)
        .await
        .map_err(not_found(&id))?;
    let row = state.blueprints.get_blueprint(&id).await.map_err(not_found(&id))?;
    Ok(Json(row))
}

pub async fn delete(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    state.blueprints.delete_blueprint(&id).await.map_err(not_found(&id))?;
    Ok(StatusCode::NO_CONTENT)
}
