use super::{errors::ServerError, AppState};
use crate::suite::{self, Suite};
use axum::{extract::State, Json};
use tracing::instrument;

#[instrument(name = "List suites", skip(state))]
pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<Suite>>, ServerError> {
    let suites = suite::list_suites(&state.settings.suites_dir())?;
    Ok(Json(suites))
}
