use crate::error::BenchError;
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum ServerError {
    BadRequest(String),
    NotFound(String),
    BackendUnavailable(String),
    LoadFailed(String),
    DatabaseError(sea_orm::DbErr),
    AnyhowError(anyhow::Error),
}

impl ServerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::BackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::LoadFailed(_) => StatusCode::BAD_GATEWAY,
            ServerError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::AnyhowError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_message(&self) -> String {
        match self {
            ServerError::BadRequest(e) => e.clone(),
            ServerError::NotFound(e) => format!("{} not found", e),
            ServerError::BackendUnavailable(e) => format!("inference backend unavailable: {}", e),
            ServerError::LoadFailed(e) => format!("model load failed: {}", e),
            ServerError::DatabaseError(e) => format!("Database error: {}", e),
            ServerError::AnyhowError(e) => format!("{:#}", e),
        }
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error_message())
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> axum::response::Response {
        (
            self.status_code(),
            Json(json!({"error": self.error_message()})),
        )
            .into_response()
    }
}

impl From<anyhow::Error> for ServerError {
    fn from(error: anyhow::Error) -> Self {
        match error.downcast_ref::<BenchError>() {
            Some(BenchError::BadInput(msg)) => ServerError::BadRequest(msg.clone()),
            Some(BenchError::NotFound(what)) => ServerError::NotFound(what.clone()),
            Some(BenchError::BackendUnavailable(msg)) => {
                ServerError::BackendUnavailable(msg.clone())
            }
            Some(BenchError::LoadFailed(msg)) => ServerError::LoadFailed(msg.clone()),
            Some(BenchError::ModelUnhealthy(msg)) => ServerError::BackendUnavailable(msg.clone()),
            Some(BenchError::ModelNotReady(id)) => {
                ServerError::BackendUnavailable(format!("model {} is not loaded", id))
            }
            None => ServerError::AnyhowError(error),
        }
    }
}

impl From<BenchError> for ServerError {
    fn from(error: BenchError) -> Self {
        ServerError::from(anyhow::Error::new(error))
    }
}

impl From<sea_orm::DbErr> for ServerError {
    fn from(error: sea_orm::DbErr) -> Self {
        ServerError::DatabaseError(error)
    }
}
