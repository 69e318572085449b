use std::fmt;
use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::json;
use thiserror::Error;

use crate::error::retry::Retryable;

/// Run-level error. Anything surfacing as `AppError` aborts the current
/// operation; per-pool problems are reported through `FailureReason` instead.
#[derive(Debug, Clone)]
pub enum AppError {
    DatabaseError(String),
    ConfigError(String),
    ValidationError(String),
    NotFound(String),
    UpstreamUnavailable(String),
    BadPayload(String),
    CheckpointWriteFailure(String),
    InternalError(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::DatabaseError(msg) => write!(f, "Database error: {}", msg),
            AppError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::UpstreamUnavailable(msg) => write!(f, "Upstream unavailable: {}", msg),
            AppError::BadPayload(msg) => write!(f, "Bad upstream payload: {}", msg),
            AppError::CheckpointWriteFailure(msg) => write!(f, "Checkpoint write failed: {}", msg),
            AppError::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::DatabaseError(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        AppError::DatabaseError(format!("Migration failed: {}", err))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InternalError(format!("JSON serialization error: {}", err))
    }
}

/// Outcome of a single upstream HTTP request.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("rate limited by upstream")]
    RateLimited,

    #[error("transient upstream failure: {0}")]
    Transient(String),

    #[error("upstream rejected request with status {status}")]
    Rejected { status: u16 },

    #[error("malformed upstream payload: {0}")]
    Malformed(String),
}

impl Retryable for FetchError {
    fn is_retryable(&self) -> bool {
        matches!(self, FetchError::RateLimited | FetchError::Transient(_))
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            FetchError::Malformed(err.to_string())
        } else {
            FetchError::Transient(format!("HTTP request error: {}", err))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_retryability() {
        assert!(FetchError::RateLimited.is_retryable());
        assert!(FetchError::Transient("connection reset".to_string()).is_retryable());
        assert!(!FetchError::Rejected { status: 404 }.is_retryable());
        assert!(!FetchError::Malformed("expected array".to_string()).is_retryable());
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::CheckpointWriteFailure("disk full".to_string());
        assert_eq!(err.to_string(), "Checkpoint write failed: disk full");
    }
}
