//! Shmulik ingestion
//!
//! PDF extraction, text cleanup, chunking and index building, used by the
//! `ingest` binary and by the gateway when it builds a missing index at
//! startup.

pub mod builder;
pub mod chunker;
pub mod cleaner;
pub mod errors;
pub mod pdf;
pub mod processor;

pub use builder::{build_index, BuildMode, BuildReport, IndexBuilder};
pub use chunker::{chunk_document, DocumentText};
pub use errors::IngestionError;
pub use processor::{discover_pdfs, DocumentProcessor, ProcessedDocument};
