//! Ingestion error types

use shmulik_common::errors::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("Document unreadable: {path}: {message}")]
    DocumentUnreadable { path: String, message: String },

    #[error("Chunking error: {0}")]
    ChunkingError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("No PDF documents found in {0}")]
    NoDocuments(String),

    #[error("None of the {attempted} documents could be ingested")]
    NothingIngested { attempted: usize },

    #[error("Ingestion task failed: {0}")]
    TaskFailed(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    App(#[from] AppError),
}

impl From<IngestionError> for AppError {
    fn from(e: IngestionError) -> Self {
        match e {
            IngestionError::App(inner) => inner,
            IngestionError::DocumentUnreadable { path, message } => {
                AppError::DocumentUnreadable { path, message }
            }
            IngestionError::ConfigError(message) => AppError::Configuration { message },
            other => AppError::Internal {
                message: other.to_string(),
            },
        }
    }
}
