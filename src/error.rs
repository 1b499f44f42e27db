use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures of the location table and the lookup service
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("invalid IP address: {0}")]
    InvalidIp(String),

    #[error("location not found for IP: {0}")]
    NotFound(String),

    #[error("invalid location data: {0}")]
    InvalidLocation(String),

    #[error("repository not initialized")]
    NotInitialized,

    #[error("unsupported database type: {0}")]
    UnsupportedDatabase(String),

    #[error("data file does not exist: {0}")]
    MissingDataFile(String),

    #[error("data file is empty: {0}")]
    EmptyDataFile(String),

    #[error("failed to open data file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read data file: {0}")]
    Csv(#[from] csv::Error),
}

/// Errors surfaced to HTTP clients as `{"error": message}`
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("{0}")]
    RateLimitExceeded(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::RateLimitExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<LookupError> for ApiError {
    fn from(err: LookupError) -> Self {
        match err {
            LookupError::InvalidIp(_) => {
                ApiError::InvalidRequest("Invalid IP address format".to_string())
            }
            LookupError::NotFound(_) => ApiError::NotFound(
                "Location not found for the provided IP address".to_string(),
            ),
            LookupError::InvalidLocation(_) => {
                ApiError::Internal("Invalid location data".to_string())
            }
            _ => ApiError::Internal("Internal server error".to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse::new(self.to_string());
        (self.status_code(), Json(body)).into_response()
    }
}

/// JSON error envelope
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

pub type Result<T, E = ApiError> = std::result::Result<T, E>;
