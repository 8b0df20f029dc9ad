// crates/auth-lib/src/error.rs

//! Central error type + Axum integration.
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::cache::CacheError;

/// Authentication error taxonomy.
///
/// `StoreUnavailable` and `UpstreamError` are fail-closed: callers must treat
/// them as "not authorized".
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Session not found")]
    NotFound,

    #[error("Session expired")]
    Expired,

    #[error("Session store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Malformed password hash: {0}")]
    MalformedHash(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Upstream error: {0}")]
    UpstreamError(String),

    #[error("Hashing error: {0}")]
    HashingError(String),

    #[error("Authentication rate limit exceeded")]
    RateLimited,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Subject already registered")]
    SubjectTaken,
}

impl AuthError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::NotFound
            | AuthError::Expired
            | AuthError::InvalidCredentials
            | AuthError::MalformedHash(_) => StatusCode::UNAUTHORIZED,
            AuthError::StoreUnavailable(_) | AuthError::UpstreamError(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            },
            AuthError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AuthError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AuthError::SubjectTaken => StatusCode::CONFLICT,
            AuthError::HashingError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::NotFound => "SESS_001",
            AuthError::Expired => "SESS_002",
            AuthError::StoreUnavailable(_) => "SESS_003",
            AuthError::MalformedHash(_) => "HASH_001",
            AuthError::HashingError(_) => "HASH_002",
            AuthError::InvalidCredentials => "AUTH_001",
            AuthError::UpstreamError(_) => "AUTH_002",
            AuthError::RateLimited => "AUTH_003",
            AuthError::InvalidInput(_) => "VAL_001",
            AuthError::SubjectTaken => "VAL_002",
        }
    }

    /// Get a sanitized message suitable for end users.
    ///
    /// Every authentication failure collapses to the same text.
    pub fn sanitized_message(&self) -> String {
        match self {
            AuthError::NotFound
            | AuthError::Expired
            | AuthError::InvalidCredentials
            | AuthError::MalformedHash(_) => "Unauthorized".to_string(),
            AuthError::StoreUnavailable(_) | AuthError::UpstreamError(_) => {
                "Service temporarily unavailable".to_string()
            },
            AuthError::RateLimited => {
                "Too many authentication attempts, please try again later".to_string()
            },
            AuthError::InvalidInput(_) => "Invalid input provided".to_string(),
            AuthError::SubjectTaken => "Username is not available".to_string(),
            AuthError::HashingError(_) => "An internal server error occurred".to_string(),
        }
    }

    /// Whether the error means "the backing stores could not answer"
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            AuthError::StoreUnavailable(_) | AuthError::UpstreamError(_)
        )
    }

    /// Re-label a session store outage as an upstream failure, leaving
    /// every other variant untouched.
    pub(crate) fn into_upstream(self) -> Self {
        match self {
            AuthError::StoreUnavailable(reason) => AuthError::UpstreamError(reason),
            other => other,
        }
    }
}

impl From<CacheError> for AuthError {
    fn from(err: CacheError) -> Self {
        AuthError::StoreUnavailable(err.to_string())
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();
        let message = self.sanitized_message();

        let body = serde_json::json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        });

        (status, axum::Json(body)).into_response()
    }
}
