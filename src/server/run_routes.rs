use super::{errors::ServerError, AppState};
use crate::{
    coordinator::RunRequest,
    dao,
    suite::{self, RunConfig},
};
use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

#[derive(Debug, Deserialize)]
pub struct StartRun {
    #[serde(default)]
    pub model_ids: Vec<String>,
    pub suite_name: String,
    #[serde(default)]
    pub selected_scenarios: Vec<String>,
    #[serde(default)]
    pub config: RunConfig,
}

#[instrument(name = "Start run", skip(state, payload))]
pub async fn start(
    State(state): State<AppState>,
    Json(payload): Json<StartRun>,
) -> Result<Json<serde_json::Value>, ServerError> {
    if payload.model_ids.is_empty() {
        return Err(ServerError::BadRequest(
            "model_ids must not be empty".to_string(),
        ));
    }
    payload.config.validate().map_err(ServerError::from)?;

    let suite = suite::find_suite(&state.settings.suites_dir(), &payload.suite_name)?
        .ok_or_else(|| ServerError::NotFound(format!("suite {}", payload.suite_name)))?
        .select(&payload.selected_scenarios);
    if suite.scenarios.is_empty() {
        return Err(ServerError::BadRequest(
            "selection matches no scenarios".to_string(),
        ));
    }

    for id in &payload.model_ids {
        dao::model::fetch(id, &state.db)
            .await?
            .ok_or_else(|| ServerError::NotFound(format!("model {}", id)))?;
    }

    let run_id = state
        .coordinator
        .start_run(
            RunRequest {
                model_ids: payload.model_ids,
                suite_name: payload.suite_name,
                suite,
                config: payload.config,
            },
            None,
            true,
        )
        .await?;

    Ok(Json(json!({ "run_id": run_id })))
}

#[instrument(name = "Run status", skip(state))]
pub async fn status(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let record = dao::run::fetch(&id, &state.db).await?;

    // The registry holds the freshest view of active runs; the repository is
    // the durable fallback once the entry ages out.
    if let Some(live) = state.registry.get(&id) {
        return Ok(Json(json!({
            "status": live.status,
            "progress": live.progress,
            "error": live.error,
            "run": record,
        })));
    }

    let record = record.ok_or_else(|| ServerError::NotFound(format!("run {}", id)))?;
    let progress = if record.status == dao::run::STATUS_COMPLETED {
        Some(100)
    } else {
        None
    };
    Ok(Json(json!({
        "status": record.status,
        "progress": progress,
        "run": record,
    })))
}

#[instrument(name = "Get run", skip(state))]
pub async fn get(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let record = dao::run::fetch(&id, &state.db)
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("run {}", id)))?;
    let results = dao::result::fetch_by_run(&id, &state.db).await?;

    Ok(Json(json!({ "run": record, "results": results })))
}

#[instrument(name = "List runs", skip(state))]
pub async fn list(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ServerError> {
    let runs = dao::run::fetch_all(&state.db).await?;

    let mut enriched = Vec::with_capacity(runs.len());
    for record in runs {
        let ids: Vec<String> =
            serde_json::from_value(record.model_ids.clone()).unwrap_or_default();
        let mut aliases = Vec::with_capacity(ids.len());
        for model_id in &ids {
            let display = match dao::model::fetch(model_id, &state.db).await? {
                Some(descriptor) => descriptor.alias,
                // The descriptor may have been deleted since the run.
                None => model_id.clone(),
            };
            aliases.push(display);
        }

        let mut value = serde_json::to_value(&record)
            .map_err(|e| ServerError::AnyhowError(e.into()))?;
        value["model_aliases"] = json!(aliases);
        enriched.push(value);
    }

    Ok(Json(json!(enriched)))
}

#[derive(Debug, Deserialize)]
pub struct ExportParams {
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_format() -> String {
    "json".to_string()
}

#[instrument(name = "Export run", skip(state))]
pub async fn export(
    Path(id): Path<String>,
    Query(params): Query<ExportParams>,
    State(state): State<AppState>,
) -> Result<Response, ServerError> {
    match params.format.as_str() {
        "csv" => {
            let csv = dao::export::export_run_csv(&id, &state.db).await?;
            Ok((
                [
                    (header::CONTENT_TYPE, "text/csv".to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"run-{}.csv\"", id),
                    ),
                ],
                csv,
            )
                .into_response())
        }
        "json" => {
            let export = dao::export::export_run_json(&id, &state.db).await?;
            Ok(Json(export).into_response())
        }
        other => Err(ServerError::BadRequest(format!(
            "unknown export format {}",
            other
        ))),
    }
}

#[derive(Debug, Deserialize)]
pub struct LogParams {
    #[serde(default = "default_log_limit")]
    pub limit: u64,
}

fn default_log_limit() -> u64 {
    100
}

#[instrument(name = "Fetch logs", skip(state))]
pub async fn logs(
    Path((entity_type, entity_id)): Path<(String, String)>,
    Query(params): Query<LogParams>,
    State(state): State<AppState>,
) -> Result<Json<Vec<crate::entities::log::Model>>, ServerError> {
    let entries = dao::log::fetch(&entity_type, &entity_id, params.limit, &state.db).await?;
    Ok(Json(entries))
}
