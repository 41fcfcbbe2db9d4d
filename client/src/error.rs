//! Unified error handling for the control API.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use quotesync_engine::Error as EngineError;
use serde::Serialize;

use crate::sync::SyncError;

/// Application error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Error response body.
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message, details) = match &self {
            AppError::Engine(e @ (EngineError::EmptyField(_) | EngineError::MalformedImport(_))) => {
                tracing::warn!("Rejected input: {}", e);
                (StatusCode::BAD_REQUEST, e.to_string(), None)
            }
            AppError::Engine(e) => {
                tracing::error!("Engine error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    Some(e.to_string()),
                )
            }
            AppError::Sync(e) => {
                tracing::error!("Sync error: {}", e);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Sync unavailable".to_string(),
                    Some(e.to_string()),
                )
            }
            AppError::Task(e) => {
                tracing::error!("Store task failed: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    None,
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone(), None),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone(), None),
        };

        let body = Json(ErrorResponse {
            error: error_message,
            details,
        });

        (status, body).into_response()
    }
}

/// Result type alias for handlers.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_are_bad_requests() {
        let response = AppError::from(EngineError::EmptyField("text")).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response =
            AppError::from(EngineError::MalformedImport("element 0".into())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn storage_errors_are_internal() {
        let response =
            AppError::from(EngineError::Encoding("bad float".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn stopped_worker_is_unavailable() {
        let response = AppError::from(SyncError::WorkerStopped).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn not_found() {
        let response = AppError::NotFound("no quotes".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
