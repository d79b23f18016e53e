//! Shmulik Common Library
//!
//! Shared code for the Shmulik gateway and ingestion tool including:
//! - Configuration management
//! - Error types and handling
//! - Domain models (documents, chunks, turns, answers)
//! - Embedding and language model clients
//! - The vector index and retriever
//! - The chat workflow and conversation sessions
//! - Metrics and tracing setup

pub mod config;
pub mod context;
pub mod embeddings;
pub mod errors;
pub mod index;
pub mod llm;
pub mod metrics;
pub mod models;
pub mod observability;
pub mod retrieval;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use config::AppConfig;
pub use embeddings::Embedder;
pub use errors::{AppError, Result};
pub use index::VectorIndex;
pub use llm::LanguageModel;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding model
pub const DEFAULT_EMBEDDING_MODEL: &str = "intfloat/multilingual-e5-base";

/// Default embedding dimension
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 768;
