use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::marketplace::domain::WorkflowError;
use crate::marketplace::repository::RepositoryError;
use crate::marketplace::service::MarketError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("{0}")]
    InsufficientBalance(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<MarketError> for AppError {
    fn from(err: MarketError) -> Self {
        match err {
            MarketError::Forbidden(msg) => AppError::Forbidden(msg),
            MarketError::NotFound(what) => AppError::NotFound(what),
            MarketError::Validation(msg) => AppError::BadRequest(msg),
            MarketError::Workflow(e) => match e {
                WorkflowError::InsufficientBalance { .. } => {
                    AppError::InsufficientBalance(e.to_string())
                }
                WorkflowError::InvalidTransition { .. } => AppError::Conflict(e.to_string()),
                WorkflowError::InvalidRating(_)
                | WorkflowError::InvalidAmount(_)
                | WorkflowError::UnknownValue(_) => AppError::BadRequest(e.to_string()),
            },
            MarketError::Repository(e) => match e {
                RepositoryError::Conflict(msg) => AppError::Conflict(msg),
                RepositoryError::NotFound(what) => AppError::NotFound(what),
                RepositoryError::Sql(e) => AppError::Database(e),
                RepositoryError::Database(e) => AppError::Pool(e),
                RepositoryError::Workflow(e) => MarketError::Workflow(e).into(),
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound(what) => (StatusCode::NOT_FOUND, format!("Not found: {}", what)),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::InsufficientBalance(msg) => (StatusCode::PAYMENT_REQUIRED, msg.clone()),
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Pool(e) => {
                tracing::error!("Pool error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
