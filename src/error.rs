//! Error handling module
//!
//! Provides unified error types and handling for the entire pipeline.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Reserved for record-store backends with real failure modes
    #[allow(dead_code)]
    #[error("Record store error: {0}")]
    Store(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Object store error: {0}")]
    ObjectStore(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Scorer error: {0}")]
    Scorer(String),

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("Feature disabled: {0}")]
    Disabled(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[allow(dead_code)]
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, message, details) = match &self {
            AppError::Store(msg) => {
                error!("Record store error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORE_ERROR",
                    "A record store error occurred".to_string(),
                    Some(msg.clone()),
                )
            }
            AppError::Queue(msg) => {
                error!("Queue error: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "QUEUE_ERROR",
                    "A queue error occurred".to_string(),
                    Some(msg.clone()),
                )
            }
            AppError::ObjectStore(msg) => {
                error!("Object store error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "OBJECT_STORE_ERROR",
                    "An object store error occurred".to_string(),
                    Some(msg.clone()),
                )
            }
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                msg.clone(),
                None,
            ),
            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                msg.clone(),
                None,
            ),
            AppError::Scorer(msg) => (
                StatusCode::BAD_GATEWAY,
                "SCORER_ERROR",
                msg.clone(),
                None,
            ),
            AppError::Notification(msg) => (
                StatusCode::BAD_GATEWAY,
                "NOTIFICATION_ERROR",
                msg.clone(),
                None,
            ),
            AppError::Disabled(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "FEATURE_DISABLED",
                msg.clone(),
                None,
            ),
            AppError::Internal(msg) => {
                error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                    Some(msg.clone()),
                )
            }
            AppError::Config(msg) => {
                error!("Configuration error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "CONFIG_ERROR",
                    "A configuration error occurred".to_string(),
                    Some(msg.clone()),
                )
            }
        };

        let body = Json(ErrorResponse {
            success: false,
            message,
            error: details,
            code: Some(error_code.to_string()),
        });

        (status, body).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, AppError>;

/// Helper function to create a validation error
pub fn validation_error(msg: impl Into<String>) -> AppError {
    AppError::Validation(msg.into())
}

/// Helper function to create a not found error
pub fn not_found_error(msg: impl Into<String>) -> AppError {
    AppError::NotFound(msg.into())
}
