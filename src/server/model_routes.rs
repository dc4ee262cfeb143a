use super::{errors::ServerError, AppState};
use crate::{
    dao,
    entities::model,
    orchestrator::{CatalogEntry, HealthStatus, LoadedModelInfo},
};
use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use tracing::instrument;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct RegisterModel {
    pub alias: Option<String>,
    pub model_id: Option<String>,
}

#[instrument(name = "Register model", skip(state))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterModel>,
) -> Result<Json<model::Model>, ServerError> {
    let alias = payload
        .alias
        .filter(|a| !a.is_empty())
        .ok_or_else(|| ServerError::BadRequest("alias is required".to_string()))?;
    let model_id = payload
        .model_id
        .filter(|m| !m.is_empty())
        .ok_or_else(|| ServerError::BadRequest("model_id is required".to_string()))?;

    let descriptor = dao::model::save(
        model::Model {
            id: Uuid::new_v4().to_string(),
            alias,
            model_id,
            status: dao::model::STATUS_STOPPED.to_string(),
            endpoint: None,
            last_error: None,
            last_heartbeat: None,
        },
        &state.db,
    )
    .await?;

    tracing::info!("registered model {} ({})", descriptor.alias, descriptor.id);
    Ok(Json(descriptor))
}

#[instrument(name = "List models", skip(state))]
pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<model::Model>>, ServerError> {
    let descriptors = dao::model::fetch_all(&state.db).await?;
    Ok(Json(descriptors))
}

#[instrument(name = "Delete model", skip(state))]
pub async fn remove(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let descriptor = dao::model::fetch(&id, &state.db)
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("model {}", id)))?;

    // A resident model must be evicted first, which needs the backend.
    if let Some(loaded) = state.orchestrator.get_loaded(&id).await {
        state
            .orchestrator
            .initialize()
            .await
            .map_err(ServerError::from)?;
        state.orchestrator.unload(&id, &loaded.id).await?;
    }

    dao::model::delete(&descriptor.id, &state.db).await?;
    Ok(Json(serde_json::json!({ "deleted": descriptor.id })))
}

#[instrument(name = "Load model", skip(state))]
pub async fn load(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<LoadedModelInfo>, ServerError> {
    let descriptor = dao::model::fetch(&id, &state.db)
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("model {}", id)))?;

    let model_ref = if descriptor.model_id.is_empty() {
        descriptor.alias
    } else {
        descriptor.model_id
    };
    let loaded = state.orchestrator.load(&id, &model_ref).await?;
    Ok(Json(loaded))
}

#[instrument(name = "Unload model", skip(state))]
pub async fn unload(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let descriptor = dao::model::fetch(&id, &state.db)
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("model {}", id)))?;

    let model_ref = match state.orchestrator.get_loaded(&id).await {
        Some(loaded) => loaded.id,
        None => descriptor.model_id,
    };
    state.orchestrator.unload(&id, &model_ref).await?;
    Ok(Json(serde_json::json!({ "unloaded": id })))
}

#[instrument(name = "Model health", skip(state))]
pub async fn health(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<HealthStatus>, ServerError> {
    let descriptor = dao::model::fetch(&id, &state.db)
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("model {}", id)))?;

    // Probe by the canonical id when the model is resident, the alias
    // otherwise.
    let probe_ref = match state.orchestrator.get_loaded(&id).await {
        Some(loaded) => loaded.id,
        None => descriptor.alias,
    };
    let status = state.orchestrator.check_health(&id, &probe_ref).await;
    Ok(Json(status))
}

#[instrument(name = "List available models", skip(state))]
pub async fn available(
    State(state): State<AppState>,
) -> Result<Json<Vec<CatalogEntry>>, ServerError> {
    let entries = state.orchestrator.list_available().await?;
    Ok(Json(entries))
}

#[instrument(name = "List loaded models", skip(state))]
pub async fn loaded(State(state): State<AppState>) -> Json<Vec<LoadedModelInfo>> {
    Json(state.orchestrator.list_loaded().await)
}
