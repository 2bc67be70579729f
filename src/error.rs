/// Unified error types for VodSync
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Status code for "the call succeeded but produced no usable data"
pub const STATUS_EMPTY_RESULT: u16 = 800;

/// Status code for a successful remote call
pub const STATUS_SUCCESS: u16 = 200;

/// Outcome of a failed call against a remote provider (FFLogs, Twitch, YouTube)
///
/// Replaces the bare numeric status taxonomy: 800 is `EmptyResult`,
/// 401 is `AuthExpired`, anything else is passed through as `Transport`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchError {
    /// Call succeeded but yielded no usable payload (e.g. unknown report code)
    #[error("remote call returned no usable data")]
    EmptyResult,

    /// The caller's access token is no longer accepted
    #[error("remote authorization expired")]
    AuthExpired,

    /// Non-success status reported by the transport layer
    #[error("remote call failed with status {0}")]
    Transport(u16),
}

impl FetchError {
    /// Classify a non-success transport status
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => FetchError::AuthExpired,
            STATUS_EMPTY_RESULT => FetchError::EmptyResult,
            other => FetchError::Transport(other),
        }
    }

    /// Numeric status, as reported to callers of the report API
    pub fn status_code(&self) -> u16 {
        match self {
            FetchError::EmptyResult => STATUS_EMPTY_RESULT,
            FetchError::AuthExpired => 401,
            FetchError::Transport(code) => *code,
        }
    }
}

/// Result type for remote calls
pub type FetchResult<T> = Result<T, FetchError>;

/// Main error type for the service
#[derive(Error, Debug)]
pub enum VodSyncError {
    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Document (de)serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Remote provider errors
    #[error("Remote error: {0}")]
    Remote(#[from] FetchError),

    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limiting errors
    #[error("Rate limit exceeded")]
    RateLimitExceeded { retry_after: std::time::Duration },

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// JSON error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Convert VodSyncError to HTTP response
impl IntoResponse for VodSyncError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            VodSyncError::Authentication(_) => (
                StatusCode::UNAUTHORIZED,
                "AuthenticationRequired",
                self.to_string(),
            ),
            VodSyncError::Validation(_) => (
                StatusCode::BAD_REQUEST,
                "InvalidRequest",
                self.to_string(),
            ),
            VodSyncError::NotFound(_) => (StatusCode::NOT_FOUND, "NotFound", self.to_string()),
            VodSyncError::RateLimitExceeded { .. } => (
                StatusCode::TOO_MANY_REQUESTS,
                "RateLimitExceeded",
                "Rate limit exceeded".to_string(),
            ),
            VodSyncError::Remote(FetchError::AuthExpired) => (
                StatusCode::UNAUTHORIZED,
                "AuthorizationIssue",
                self.to_string(),
            ),
            VodSyncError::Remote(FetchError::EmptyResult) => (
                StatusCode::BAD_REQUEST,
                "EmptyResult",
                self.to_string(),
            ),
            VodSyncError::Remote(FetchError::Transport(code)) => (
                StatusCode::BAD_REQUEST,
                "UpstreamError",
                format!("Upstream API returned {}.", code),
            ),
            VodSyncError::Database(_)
            | VodSyncError::Serialization(_)
            | VodSyncError::Internal(_)
            | VodSyncError::Io(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalServerError",
                "Internal server error".to_string(), // Don't leak details
            ),
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for service operations
pub type VodSyncResult<T> = Result<T, VodSyncError>;
