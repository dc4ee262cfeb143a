use crate::{dao, error::BenchError, inference::InferenceClient};
use anyhow::Context;
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

/// Returned by `list_available` when the backend's catalog endpoint cannot
/// be enumerated: the models most local backends ship with.
pub const FALLBACK_CATALOG: [&str; 4] = [
    "llama3.2:1b",
    "llama3.2:3b",
    "qwen2.5:0.5b",
    "phi3:mini",
];

/// Backend-canonical descriptor of a model resident in memory. `id` is the
/// identifier the backend assigned at load time and is the only identifier
/// valid on inference calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadedModelInfo {
    pub id: String,
    pub descriptor_id: String,
    pub endpoint: String,
    pub loaded_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub status: String,
    pub error: Option<String>,
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: String,
}

/// Owns the process-wide connection to the inference backend and the cache
/// of models it has loaded. Only the run coordinator mutates the cache; the
/// scenario runner reads it.
pub struct Orchestrator {
    base_url: String,
    http: reqwest::Client,
    cache: RwLock<HashMap<String, LoadedModelInfo>>,
    db: DatabaseConnection,
}

impl Orchestrator {
    pub fn new(base_url: &str, db: DatabaseConnection) -> Self {
        Orchestrator {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
            cache: RwLock::new(HashMap::new()),
            db,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.base_url
    }

    /// Verify the backend is reachable and return its endpoint.
    pub async fn initialize(&self) -> anyhow::Result<String> {
        if let Err(err) = self.fetch_catalog().await {
            let message = format!("{:#}", err);
            if let Err(log_err) = dao::log::append(
                "orchestrator",
                "backend",
                "error",
                &format!("backend unreachable at {}: {}", self.base_url, message),
                None,
                &self.db,
            )
            .await
            {
                warn!("could not audit backend failure: {:#}", log_err);
            }
            return Err(BenchError::BackendUnavailable(message).into());
        }
        info!("connected to inference backend at {}", self.base_url);
        Ok(self.base_url.clone())
    }

    /// Enumerate the backend's model catalog. An unreachable backend is an
    /// error; a reachable backend with a broken catalog degrades to the
    /// static fallback list.
    pub async fn list_available(&self) -> anyhow::Result<Vec<CatalogEntry>> {
        let response = self
            .http
            .get(format!("{}/v1/models", self.base_url))
            .send()
            .await
            .map_err(|e| BenchError::BackendUnavailable(format!("{:#}", e)))?;

        match parse_catalog(response).await {
            Ok(entries) => Ok(entries),
            Err(err) => {
                warn!("catalog enumeration failed ({:#}), using fallback list", err);
                Ok(FALLBACK_CATALOG
                    .iter()
                    .map(|id| CatalogEntry { id: id.to_string() })
                    .collect())
            }
        }
    }

    pub async fn list_loaded(&self) -> Vec<LoadedModelInfo> {
        self.cache.read().await.values().cloned().collect()
    }

    pub async fn get_loaded(&self, descriptor_id: &str) -> Option<LoadedModelInfo> {
        self.cache.read().await.get(descriptor_id).cloned()
    }

    /// Ask the backend to load a model. Idempotent: a cached entry for the
    /// descriptor is returned as-is. On success the descriptor is marked
    /// `running`; on failure it is marked `error` and `LoadFailed` is raised.
    pub async fn load(
        &self,
        descriptor_id: &str,
        model_ref: &str,
    ) -> anyhow::Result<LoadedModelInfo> {
        if let Some(loaded) = self.get_loaded(descriptor_id).await {
            return Ok(loaded);
        }

        let outcome = self.request_load(model_ref).await;
        let canonical_id = match outcome {
            Ok(id) => id,
            Err(err) => {
                let message = format!("{:#}", err);
                error!("load of {} failed: {}", model_ref, message);
                dao::model::update_status(
                    descriptor_id,
                    dao::model::STATUS_ERROR,
                    None,
                    Some(message.clone()),
                    &self.db,
                )
                .await?;
                dao::log::append(
                    "model",
                    descriptor_id,
                    "error",
                    &format!("load of {} failed: {}", model_ref, message),
                    None,
                    &self.db,
                )
                .await?;
                return Err(BenchError::LoadFailed(message).into());
            }
        };

        let loaded = LoadedModelInfo {
            id: canonical_id,
            descriptor_id: descriptor_id.to_string(),
            endpoint: self.base_url.clone(),
            loaded_at: Utc::now().timestamp_millis(),
        };

        self.cache
            .write()
            .await
            .insert(descriptor_id.to_string(), loaded.clone());
        dao::model::update_status(
            descriptor_id,
            dao::model::STATUS_RUNNING,
            Some(self.base_url.clone()),
            None,
            &self.db,
        )
        .await?;

        info!("loaded {} as {}", model_ref, loaded.id);
        Ok(loaded)
    }

    /// Drop the cache entry and ask the backend to unload. Idempotent: a
    /// backend refusal for an already-unloaded model is not an error.
    pub async fn unload(&self, descriptor_id: &str, model_ref: &str) -> anyhow::Result<()> {
        self.cache.write().await.remove(descriptor_id);

        let response = self
            .http
            .post(format!("{}/v1/models/unload", self.base_url))
            .json(&json!({ "model": model_ref }))
            .send()
            .await;
        if let Err(err) = response {
            warn!("unload request for {} failed: {:#}", model_ref, err);
        }

        dao::model::update_status(descriptor_id, dao::model::STATUS_STOPPED, None, None, &self.db)
            .await?;
        Ok(())
    }

    /// Lightweight probe: the model is healthy when the backend is reachable
    /// and reports it in its catalog. Probing by alias is allowed; inference
    /// never is.
    pub async fn check_health(&self, descriptor_id: &str, alias_or_id: &str) -> HealthStatus {
        let probe = async {
            let entries = self.fetch_catalog().await?;
            Ok::<bool, anyhow::Error>(entries.iter().any(|entry| entry.id == alias_or_id))
        }
        .await;

        let status = match probe {
            Ok(true) => HealthStatus {
                healthy: true,
                status: dao::model::STATUS_RUNNING.to_string(),
                error: None,
                endpoint: Some(self.base_url.clone()),
            },
            Ok(false) => HealthStatus {
                healthy: false,
                status: dao::model::STATUS_STOPPED.to_string(),
                error: Some(format!("{} not reported by backend", alias_or_id)),
                endpoint: Some(self.base_url.clone()),
            },
            Err(err) => HealthStatus {
                healthy: false,
                status: dao::model::STATUS_ERROR.to_string(),
                error: Some(format!("{:#}", err)),
                endpoint: None,
            },
        };

        // Heartbeat stamp; probe failures must not fail the caller.
        if let Err(err) = dao::model::update_status(
            descriptor_id,
            &status.status,
            status.endpoint.clone(),
            status.error.clone(),
            &self.db,
        )
        .await
        {
            warn!("could not stamp heartbeat for {}: {:#}", descriptor_id, err);
        }

        status
    }

    /// Client bound to the current backend endpoint.
    pub fn get_client(&self) -> InferenceClient {
        InferenceClient::new(&self.base_url)
    }

    /// Unload every cached model and drop the connection.
    pub async fn shutdown(&self) {
        let loaded: Vec<LoadedModelInfo> = self.cache.read().await.values().cloned().collect();
        for model in loaded {
            if let Err(err) = self.unload(&model.descriptor_id, &model.id).await {
                warn!("shutdown unload of {} failed: {:#}", model.id, err);
            }
        }
        info!("orchestrator shut down");
    }

    async fn fetch_catalog(&self) -> anyhow::Result<Vec<CatalogEntry>> {
        let response = self
            .http
            .get(format!("{}/v1/models", self.base_url))
            .send()
            .await
            .context("Error reaching backend catalog")?;
        parse_catalog(response).await
    }

    async fn request_load(&self, model_ref: &str) -> anyhow::Result<String> {
        let response = self
            .http
            .post(format!("{}/v1/models/load", self.base_url))
            .json(&json!({ "model": model_ref }))
            .send()
            .await
            .context("Error sending load request")?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            anyhow::bail!("backend returned {}: {}", status, detail);
        }

        let loaded = response
            .json::<LoadResponse>()
            .await
            .context("Error parsing load response")?;

        // The backend may canonicalize the identifier; fall back to the
        // submitted reference when it echoes nothing.
        Ok(loaded.id.unwrap_or_else(|| model_ref.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct LoadResponse {
    #[serde(default)]
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CatalogResponse {
    #[serde(default)]
    data: Vec<CatalogEntry>,
}

async fn parse_catalog(response: reqwest::Response) -> anyhow::Result<Vec<CatalogEntry>> {
    let status = response.status();
    if !status.is_success() {
        anyhow::bail!("catalog endpoint returned {}", status);
    }
    let catalog = response
        .json::<CatalogResponse>()
        .await
        .context("Error parsing catalog response")?;
    Ok(catalog.data)
}
