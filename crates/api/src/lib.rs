//! `api` crate: HTTP surface over the engine.
//!
//! Exposes:
//!   POST   /webhooks/{service_name}
//!   POST   /workflow/execute
//!   POST   /workflows
//!   GET    /workflows
//!   GET    /workflows/{id}
//!   PATCH  /workflows/{id}
//!   DELETE /workflows/{id}
//!   GET    /runs/{run_id}
//!   POST   /runs/{run_id}/cancel
//!   GET    /health

pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use db::{BlueprintStore, RunStore};
use engine::{GraphEngine, TriggerDispatcher};

pub use error::ApiError;

/// Shared handles for every request.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<GraphEngine>,
    pub dispatcher: Arc<TriggerDispatcher>,
    pub runs: Arc<dyn RunStore>,
    pub blueprints: Arc<dyn BlueprintStore>,
}

impl AppState {
    pub fn new(engine: Arc<GraphEngine>, blueprints: Arc<dyn BlueprintStore>) -> Self {
        let runs = Arc::clone(engine.store());
        let dispatcher = Arc::new(TriggerDispatcher::new(Arc::clone(&blueprints), Arc::clone(&engine)));
        Self { engine, dispatcher, runs, blueprints }
    }
}

/// Build the router with CORS and request tracing.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/webhooks/{service_name}", post(handlers::webhooks::handle_webhook))
        .route("/workflow/execute", post(handlers::executions::execute))
        .route(
            "/workflows",
            post(handlers::workflows::create).get(handlers::workflows::list),
        )
        .route(
            "/workflows/{id}",
            get(handlers::workflows::get)
                .patch(handlers::workflows::set_active)
                .delete(handlers::workflows::delete),
        )
        .route("/runs/{run_id}", get(handlers::runs::get))
        .route("/runs/{run_id}/cancel", post(handlers::runs::cancel))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Bind `addr` and serve until Ctrl-C.
pub async fn serve(addr: &str, state: AppState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
}
