pub mod errors;
pub mod model_routes;
pub mod run_routes;
pub mod suite_routes;

use crate::{
    coordinator::RunCoordinator, orchestrator::Orchestrator, settings::Settings,
    status::StatusRegistry,
};
use axum::{
    http::Method,
    routing::{delete, get, post},
    Router,
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub orchestrator: Arc<Orchestrator>,
    pub coordinator: Arc<RunCoordinator>,
    pub registry: StatusRegistry,
    pub settings: Arc<Settings>,
}

// Kept separate from `serve` for integration tests.
pub fn create_app(state: AppState) -> Router {
    let model_router = Router::new()
        .route(
            "/api/models",
            post(model_routes::register).get(model_routes::list),
        )
        .route("/api/models/available", get(model_routes::available))
        .route("/api/models/loaded", get(model_routes::loaded))
        .route("/api/models/:id", delete(model_routes::remove))
        .route("/api/models/:id/load", post(model_routes::load))
        .route("/api/models/:id/unload", post(model_routes::unload))
        .route("/api/models/:id/health", get(model_routes::health))
        .with_state(state.clone());

    let suite_router = Router::new()
        .route("/api/suites", get(suite_routes::list))
        .with_state(state.clone());

    let run_router = Router::new()
        .route("/api/runs", post(run_routes::start).get(run_routes::list))
        .route("/api/runs/:id", get(run_routes::get))
        .route("/api/runs/:id/status", get(run_routes::status))
        .route("/api/runs/:id/export", get(run_routes::export))
        .route(
            "/api/logs/:entity_type/:entity_id",
            get(run_routes::logs),
        )
        .with_state(state.clone());

    Router::new()
        .merge(model_router)
        .merge(suite_router)
        .merge(run_router)
        .layer(
            CorsLayer::new()
                .allow_methods([Method::GET, Method::POST, Method::DELETE])
                .allow_origin(Any),
        )
}

/// Serve the HTTP surface until ctrl-c, then unload whatever the
/// orchestrator still holds.
pub async fn serve(state: AppState, port: u16) -> anyhow::Result<()> {
    let orchestrator = state.orchestrator.clone();
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    info!("llmeter server listening on port {}", port);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c()
                .await
                .expect("Failed to listen for ctrl-c");
        })
        .await?;

    orchestrator.shutdown().await;
    Ok(())
}
