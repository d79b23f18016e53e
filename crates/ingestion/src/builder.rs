//! Index builder
//!
//! Processes PDFs, embeds their chunks as passages and writes them into the
//! vector index. A document that fails is reported and skipped; the build
//! fails only when no document could be ingested.

use crate::errors::IngestionError;
use crate::processor::{discover_pdfs, DocumentProcessor, ProcessedDocument};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use shmulik_common::config::AppConfig;
use shmulik_common::embeddings::Embedder;
use shmulik_common::errors::AppError;
use shmulik_common::index::{IndexSpec, VectorIndex};
use shmulik_common::metrics;
use shmulik_common::models::IndexEntry;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Documents processed at the same time
const CONCURRENT_DOCUMENTS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildMode {
    /// Replace the whole index with the given documents
    Recreate,
    /// Replace only the given documents, keep everything else
    Incremental,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentReport {
    pub document_id: String,
    pub source_file: String,
    pub pages: u32,
    pub pages_skipped: Vec<u32>,
    pub chunks: usize,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedDocument {
    pub path: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildReport {
    pub documents: Vec<DocumentReport>,
    pub failures: Vec<FailedDocument>,
    /// Entries written by this build
    pub entries_written: usize,
    /// Entries in the index afterwards
    pub index_entries: usize,
}

pub struct IndexBuilder {
    processor: DocumentProcessor,
    embedder: Arc<dyn Embedder>,
}

impl IndexBuilder {
    pub fn new(processor: DocumentProcessor, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            processor,
            embedder,
        }
    }

    /// What an index built by this builder must declare
    pub fn index_spec(&self) -> IndexSpec {
        IndexSpec {
            embedding_model: self.embedder.model_name().to_string(),
            dimension: self.embedder.dimension(),
            chunking: self.processor.chunking().clone(),
        }
    }

    /// Process and embed one document
    #[instrument(skip(self), fields(path = %path.display()))]
    pub async fn ingest_document(
        &self,
        path: &Path,
    ) -> Result<(ProcessedDocument, Vec<IndexEntry>), IngestionError> {
        let processed = self.processor.process(path).await?;

        let texts: Vec<String> = processed.chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed_passages(&texts).await?;
        if vectors.len() != texts.len() {
            return Err(AppError::EmbeddingProviderUnavailable {
                message: format!(
                    "Expected {} embeddings, received {}",
                    texts.len(),
                    vectors.len()
                ),
            }
            .into());
        }

        let entries = processed
            .chunks
            .iter()
            .cloned()
            .zip(vectors)
            .map(|(chunk, vector)| IndexEntry::new(chunk, vector))
            .collect();

        Ok((processed, entries))
    }

    /// Ingest `pdfs` into `index` (in memory; call `persist` afterwards)
    pub async fn build(
        &self,
        index: &VectorIndex,
        pdfs: &[PathBuf],
        mode: BuildMode,
    ) -> Result<BuildReport, IngestionError> {
        let chunk_size = self.processor.chunking().chunk_size;
        let mut report = BuildReport::default();
        let mut entries = Vec::new();
        let mut seen = HashSet::new();

        let results: Vec<_> = stream::iter(pdfs)
            .map(|path| async move { (path, self.ingest_document(path).await) })
            .buffered(CONCURRENT_DOCUMENTS)
            .collect()
            .await;

        for (path, result) in results {
            match result {
                Ok((processed, document_entries)) => {
                    let document = &processed.document;
                    if !seen.insert(document.id.clone()) {
                        warn!(path = %path.display(), document_id = %document.id, "Duplicate document id, skipping");
                        report.failures.push(FailedDocument {
                            path: path.display().to_string(),
                            error: format!("Duplicate document id '{}'", document.id),
                        });
                        continue;
                    }

                    let warnings = processed.stats.warnings(chunk_size);
                    for warning in &warnings {
                        warn!(document_id = %document.id, "{}", warning);
                    }
                    metrics::record_ingestion(document_entries.len());
                    info!(document_id = %document.id, chunks = document_entries.len(), "Document ingested");

                    report.documents.push(DocumentReport {
                        document_id: document.id.clone(),
                        source_file: document.source_file.clone(),
                        pages: document.page_count,
                        pages_skipped: processed.stats.pages_skipped.clone(),
                        chunks: document_entries.len(),
                        warnings,
                    });
                    entries.extend(document_entries);
                }
                Err(e) => {
                    error!(path = %path.display(), error = %e, "Failed to ingest document");
                    report.failures.push(FailedDocument {
                        path: path.display().to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        if report.documents.is_empty() {
            return Err(IngestionError::NothingIngested {
                attempted: pdfs.len(),
            });
        }

        report.entries_written = entries.len();
        match mode {
            BuildMode::Recreate => index.recreate(entries).await?,
            BuildMode::Incremental => {
                let removed = index.replace_documents(entries).await?;
                info!(removed, "Stale entries replaced");
            }
        }
        report.index_entries = index.len().await;
        metrics::set_index_entries(report.index_entries);

        info!(
            documents = report.documents.len(),
            failed = report.failures.len(),
            entries_written = report.entries_written,
            index_entries = report.index_entries,
            "Index build complete"
        );
        Ok(report)
    }
}

/// Ingest `paths` into the index configured in `config` and persist it.
///
/// Without `recreate` an existing index is updated in place. An index
/// built with other chunking parameters is rebuilt from `paths` alone; an
/// index built with another embedding model is rejected.
pub async fn build_index(
    config: &AppConfig,
    embedder: Arc<dyn Embedder>,
    paths: &[PathBuf],
    recreate: bool,
) -> Result<(VectorIndex, BuildReport), IngestionError> {
    let builder = IndexBuilder::new(DocumentProcessor::from_config(config)?, embedder);
    let spec = builder.index_spec();
    let dir = config.index.path.clone();

    let pdfs = discover_pdfs(paths)?;
    if pdfs.is_empty() {
        let listed: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
        return Err(IngestionError::NoDocuments(listed.join(", ")));
    }

    let (index, mode) = if recreate {
        (VectorIndex::new(&dir, spec), BuildMode::Recreate)
    } else {
        match VectorIndex::read_manifest(&dir).await {
            Ok(manifest) if manifest.chunking() != spec.chunking => {
                warn!(
                    stored_size = manifest.chunk_size,
                    stored_overlap = manifest.chunk_overlap,
                    configured_size = spec.chunking.chunk_size,
                    configured_overlap = spec.chunking.chunk_overlap,
                    "Chunking parameters changed, rebuilding the index from scratch"
                );
                (VectorIndex::new(&dir, spec), BuildMode::Recreate)
            }
            Ok(_) => (VectorIndex::open(&dir, spec).await?, BuildMode::Incremental),
            Err(AppError::IndexNotFound { .. }) => (VectorIndex::new(&dir, spec), BuildMode::Recreate),
            Err(e) => return Err(e.into()),
        }
    };

    info!(
        dir = %dir.display(),
        documents = pdfs.len(),
        mode = ?mode,
        "Building index"
    );
    let report = builder.build(&index, &pdfs, mode).await?;
    index.persist().await?;

    Ok((index, report))
}
