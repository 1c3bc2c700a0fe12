//! Error handling for the WildGuard alert server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Validation error (malformed inbound detection)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Dispatch queue saturated
    #[error("Dispatch queue full: {0}")]
    QueueFull(String),

    /// Dispatcher closed
    #[error("Shutting down: {0}")]
    ShuttingDown(String),

    /// Sink delivery failure
    #[error("Sink {sink} failed: {message}")]
    Sink { sink: String, message: String },

    /// Sink attempt exceeded its timeout
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Config error
    #[error("Config error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Build a sink failure
    pub fn sink(sink: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Sink {
            sink: sink.into(),
            message: message.into(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            Error::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            Error::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            Error::QueueFull(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "QUEUE_FULL",
                msg.clone(),
            ),
            Error::ShuttingDown(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "SHUTTING_DOWN",
                msg.clone(),
            ),
            Error::Sink { sink, message } => (
                StatusCode::BAD_GATEWAY,
                "SINK_ERROR",
                format!("{}: {}", sink, message),
            ),
            Error::Timeout(msg) => (StatusCode::GATEWAY_TIMEOUT, "TIMEOUT", msg.clone()),
            Error::Serialization(e) => (
                StatusCode::BAD_REQUEST,
                "SERIALIZATION_ERROR",
                e.to_string(),
            ),
            Error::Http(e) => (StatusCode::BAD_GATEWAY, "HTTP_ERROR", e.to_string()),
            Error::Io(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "IO_ERROR",
                e.to_string(),
            ),
            Error::Config(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CONFIG_ERROR",
                msg.clone(),
            ),
            Error::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg.clone(),
            ),
        };

        tracing::error!(
            status = %status,
            error_code = %error_code,
            message = %message,
            "Request error"
        );

        let body = Json(json!({
            "error_code": error_code,
            "message": message
        }));

        (status, body).into_response()
    }
}
