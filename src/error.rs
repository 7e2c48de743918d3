//! Error handling module
//!
//! Provides unified error types and handling for the entire application.

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
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("Schema source not configured: {0}")]
    NotConnected(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

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

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Database(_) | AppError::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::Pool(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::NotConnected(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let (error_code, message, details) = match &self {
            AppError::Database(e) => {
                error!("Database error: {:?}", e);
                (
                    "DATABASE_ERROR",
                    "A database error occurred while loading the schema".to_string(),
                    Some(e.to_string()),
                )
            }
            AppError::Pool(e) => {
                error!("Pool error: {:?}", e);
                (
                    "POOL_EXHAUSTED",
                    "Database connection pool exhausted".to_string(),
                    Some(e.to_string()),
                )
            }
            AppError::NotConnected(msg) => ("NOT_CONNECTED", msg.clone(), None),
            AppError::NotFound(msg) => ("NOT_FOUND", msg.clone(), None),
            AppError::Conflict(msg) => ("CONFLICT", msg.clone(), None),
            AppError::BadRequest(msg) => ("BAD_REQUEST", msg.clone(), None),
            AppError::Config(msg) => {
                error!("Configuration error: {}", msg);
                (
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
