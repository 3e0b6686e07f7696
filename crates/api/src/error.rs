//! HTTP error type: every failure leaves as `{"status": "error", "message"}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use db::DbError;
use engine::EngineError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Database(#[from] DbError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Engine(e) if e.is_validation() => StatusCode::BAD_REQUEST,
            ApiError::Engine(EngineError::Database(DbError::NotFound))
            | ApiError::Database(DbError::NotFound) => StatusCode::NOT_FOUND,
            ApiError::Engine(EngineError::RetryExhausted { .. }) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Database(e) if e.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Engine(_) | ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("request failed: {self}");
        }
        let body = json!({ "status": "error", "message": self.to_string() });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(ApiError::Engine(EngineError::EmptyBlueprint).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::Database(DbError::NotFound).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::Engine(EngineError::Database(DbError::NotFound)).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Engine(EngineError::UnknownNode("x".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
