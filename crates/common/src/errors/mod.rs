//! Error types for Shmulik services
//!
//! Provides a single error taxonomy shared by ingestion, retrieval and
//! the chat workflow:
//! - Distinct variants for each pipeline failure mode
//! - HTTP status code mapping
//! - Structured error responses
//! - Error codes for client handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,
    PayloadTooLarge,

    // Resource errors (4xxx)
    SessionNotFound,
    IndexNotFound,

    // Document errors (5xxx)
    DocumentUnreadable,
    IndexIncompatible,

    // Retrieval / generation (6xxx)
    NoRelevantContext,
    GenerationFailed,

    // External service errors (8xxx)
    EmbeddingUnavailable,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,

    // Service unavailable
    ServiceUnavailable,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::ValidationError => 1001,
            ErrorCode::PayloadTooLarge => 1004,

            ErrorCode::SessionNotFound => 4005,
            ErrorCode::IndexNotFound => 4006,

            ErrorCode::DocumentUnreadable => 5001,
            ErrorCode::IndexIncompatible => 5002,

            ErrorCode::NoRelevantContext => 6001,
            ErrorCode::GenerationFailed => 6002,

            ErrorCode::EmbeddingUnavailable => 8002,

            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,

            ErrorCode::ServiceUnavailable => 9999,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Payload too large: {size} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },

    // Resource errors
    #[error("Session not found: {id}")]
    SessionNotFound { id: String },

    #[error("Index not found at {path}")]
    IndexNotFound { path: String },

    // Ingestion / index errors
    #[error("Document unreadable: {path}: {message}")]
    DocumentUnreadable { path: String, message: String },

    #[error("Index incompatible: {message}")]
    IndexIncompatible { message: String },

    // Query-time errors
    #[error("No relevant context found")]
    NoRelevantContext,

    #[error("Generation failed: {message}")]
    GenerationFailed { message: String },

    #[error("Embedding provider unavailable: {message}")]
    EmbeddingProviderUnavailable { message: String },

    // Internal errors
    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Service unavailable: {message}")]
    ServiceUnavailable { message: String },

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::PayloadTooLarge { .. } => ErrorCode::PayloadTooLarge,
            AppError::SessionNotFound { .. } => ErrorCode::SessionNotFound,
            AppError::IndexNotFound { .. } => ErrorCode::IndexNotFound,
            AppError::DocumentUnreadable { .. } => ErrorCode::DocumentUnreadable,
            AppError::IndexIncompatible { .. } => ErrorCode::IndexIncompatible,
            AppError::NoRelevantContext => ErrorCode::NoRelevantContext,
            AppError::GenerationFailed { .. } => ErrorCode::GenerationFailed,
            AppError::EmbeddingProviderUnavailable { .. } => ErrorCode::EmbeddingUnavailable,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::ServiceUnavailable { .. } => ErrorCode::ServiceUnavailable,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,

            // 404 Not Found
            AppError::SessionNotFound { .. } => StatusCode::NOT_FOUND,

            // 413 Payload Too Large
            AppError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,

            // 422 Unprocessable Entity
            AppError::DocumentUnreadable { .. } => StatusCode::UNPROCESSABLE_ENTITY,

            // 500 Internal Server Error
            AppError::Internal { .. }
            | AppError::Configuration { .. }
            | AppError::Serialization(_)
            | AppError::IndexIncompatible { .. }
            | AppError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,

            // 502 Bad Gateway
            AppError::GenerationFailed { .. }
            | AppError::EmbeddingProviderUnavailable { .. } => StatusCode::BAD_GATEWAY,

            // 503 Service Unavailable
            AppError::IndexNotFound { .. }
            | AppError::NoRelevantContext
            | AppError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Check if this error is a client error
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

/// Structured error response for API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        if self.is_server_error() {
            tracing::error!(
                error = %self,
                code = ?code,
                status = status.as_u16(),
                "Server error"
            );
        } else if self.is_client_error() {
            tracing::warn!(
                error = %self,
                code = ?code,
                status = status.as_u16(),
                "Client error"
            );
        }

        // Server-side causes stay in the logs.
        let message = if self.is_server_error() {
            "Sorry, I encountered an error.".to_string()
        } else {
            self.to_string()
        };

        let field = match &self {
            AppError::Validation { field, .. } => field.clone(),
            _ => None,
        };

        let body = ErrorResponse {
            error: ErrorDetails {
                code,
                message,
                field,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let field = errors.field_errors().keys().min().map(|k| k.to_string());
        AppError::Validation {
            message: errors.to_string(),
            field,
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        let err = AppError::SessionNotFound { id: "abc".into() };
        assert_eq!(err.code(), ErrorCode::SessionNotFound);
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_validation_error() {
        let err = AppError::Validation {
            message: "message must not be empty".into(),
            field: Some("message".into()),
        };
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(!err.is_server_error());
        assert!(err.is_client_error());
    }

    #[test]
    fn test_pipeline_errors_are_server_errors() {
        let generation = AppError::GenerationFailed {
            message: "timeout".into(),
        };
        assert_eq!(generation.code(), ErrorCode::GenerationFailed);
        assert!(generation.is_server_error());

        let incompatible = AppError::IndexIncompatible {
            message: "dimension 384 != 768".into(),
        };
        assert_eq!(incompatible.code().as_code(), 5002);
        assert!(incompatible.is_server_error());
    }

    #[tokio::test]
    async fn test_server_error_body_hides_cause() {
        let err = AppError::GenerationFailed {
            message: "upstream said 500 with secret details".into(),
        };
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: ErrorResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.error.code, ErrorCode::GenerationFailed);
        assert!(!body.error.message.contains("secret"));
    }
}
