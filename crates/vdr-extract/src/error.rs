//! Error types for the chunking and extraction service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Result type alias for service operations
pub type Result<T> = std::result::Result<T, Error>;

/// Service errors
#[derive(Debug, Error)]
pub enum Error {
    /// Rejected input (content type, page range, Range header, storage key)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Upload could not be opened as a PDF
    #[error("Invalid PDF: {0}")]
    InvalidPdf(String),

    /// Upload exceeds the configured size cap
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// Manifest or object absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Conditional write lost against a concurrent writer
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Object store failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Job queue failure
    #[error("Queue error: {0}")]
    Queue(String),

    /// PDF engine failure inside a worker
    #[error("PDF processing error: {0}")]
    Pdf(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a not-found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Create a queue error
    pub fn queue(message: impl Into<String>) -> Self {
        Self::Queue(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// HTTP status this error maps to
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Validation(_) | Error::InvalidPdf(_) => StatusCode::BAD_REQUEST,
            Error::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::Storage(_)
            | Error::Queue(_)
            | Error::Pdf(_)
            | Error::Config(_)
            | Error::Io(_)
            | Error::Json(_)
            | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation_error",
            Error::InvalidPdf(_) => "invalid_pdf",
            Error::PayloadTooLarge(_) => "payload_too_large",
            Error::NotFound(_) => "not_found",
            Error::Conflict(_) => "conflict",
            Error::Storage(_) => "storage_error",
            Error::Queue(_) => "queue_error",
            Error::Pdf(_) => "pdf_error",
            Error::Config(_) => "config_error",
            Error::Io(_) => "io_error",
            Error::Json(_) => "json_error",
            Error::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }

        let body = Json(json!({
            "error": {
                "type": self.error_type(),
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}
