//! Error types for fedpress
//!
//! All errors in the federation core are converted to `FederationError`,
//! which implements `IntoResponse` for proper HTTP error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Federation-wide error type
///
/// Each variant maps to a fixed HTTP status code. Internal detail is
/// logged but never echoed back for 5xx kinds.
#[derive(Debug, Error)]
pub enum FederationError {
    /// Unknown handle, missing object, unknown activity id (404)
    #[error("Resource not found")]
    NotFound,

    /// Missing credentials (401)
    #[error("Authentication required")]
    Unauthorized,

    /// Malformed envelope, bad resource string, unknown content type (400)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Invalid or absent signature, digest mismatch, unknown key (403)
    #[error("Signature verification failed: {0}")]
    SignatureVerification(String),

    /// Remote inbox rejected the POST, network failure (502)
    #[error("Delivery error: {0}")]
    Delivery(String),

    /// Any other federation error (500)
    #[error("Federation error: {0}")]
    Federation(String),

    /// Internal error (500)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl FederationError {
    /// The HTTP status code this error kind maps to
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::SignatureVerification(_) => StatusCode::FORBIDDEN,
            Self::Delivery(_) => StatusCode::BAD_GATEWAY,
            Self::Federation(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<reqwest::Error> for FederationError {
    fn from(err: reqwest::Error) -> Self {
        FederationError::Delivery(err.to_string())
    }
}

impl From<config::ConfigError> for FederationError {
    fn from(err: config::ConfigError) -> Self {
        FederationError::Federation(format!("configuration: {}", err))
    }
}

impl IntoResponse for FederationError {
    /// Convert error to HTTP response
    ///
    /// 4xx kinds keep their message; 5xx kinds are sanitized and the
    /// detail goes to the log instead.
    fn into_response(self) -> Response {
        use axum::Json;

        let status = self.status_code();
        let (error_message, error_type) = match &self {
            FederationError::NotFound => (self.to_string(), "not_found"),
            FederationError::Unauthorized => (self.to_string(), "unauthorized"),
            FederationError::BadRequest(msg) => (msg.clone(), "bad_request"),
            FederationError::SignatureVerification(msg) => (msg.clone(), "signature"),
            FederationError::Delivery(_) => ("Delivery error".to_string(), "delivery"),
            FederationError::Federation(_) => ("Federation error".to_string(), "federation"),
            FederationError::Internal(_) => ("Internal server error".to_string(), "internal"),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, %error_type, "Request failed with internal details");
        }

        let body = Json(serde_json::json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Result type alias using FederationError
pub type Result<T> = std::result::Result<T, FederationError>;
