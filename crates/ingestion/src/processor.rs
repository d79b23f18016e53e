//! Document processor
//!
//! Turns one PDF into a [`Document`] record and its chunks: extraction,
//! cleanup, page filtering and chunking. Embedding happens in the
//! builder.

use crate::chunker::{chunk_document, DocumentText};
use crate::cleaner::TextCleaner;
use crate::errors::IngestionError;
use crate::pdf::{extract_pdf_bytes, ExtractionStats};
use sha2::{Digest, Sha256};
use shmulik_common::config::{AppConfig, ChunkingConfig};
use shmulik_common::models::{document_id_for, Chunk, Document};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// A processed PDF, ready for embedding
#[derive(Debug, Clone)]
pub struct ProcessedDocument {
    pub document: Document,
    pub chunks: Vec<Chunk>,
    pub stats: ExtractionStats,
}

#[derive(Debug, Clone)]
pub struct DocumentProcessor {
    cleaner: Arc<TextCleaner>,
    chunking: ChunkingConfig,
    min_page_chars: usize,
}

impl DocumentProcessor {
    pub fn new(chunking: ChunkingConfig, min_page_chars: usize) -> Result<Self, IngestionError> {
        if chunking.chunk_size == 0 || chunking.chunk_overlap >= chunking.chunk_size {
            return Err(IngestionError::ConfigError(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunking.chunk_overlap, chunking.chunk_size
            )));
        }
        Ok(Self {
            cleaner: Arc::new(TextCleaner::new()?),
            chunking,
            min_page_chars,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, IngestionError> {
        Self::new(config.chunking.clone(), config.documents.min_page_chars)
    }

    pub fn chunking(&self) -> &ChunkingConfig {
        &self.chunking
    }

    /// Read and process a PDF from disk
    #[instrument(skip(self), fields(path = %path.display()))]
    pub async fn process(&self, path: &Path) -> Result<ProcessedDocument, IngestionError> {
        let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => IngestionError::FileNotFound(path.display().to_string()),
            _ => IngestionError::DocumentUnreadable {
                path: path.display().to_string(),
                message: format!("Failed to read file: {e}"),
            },
        })?;

        // PDF parsing is CPU bound
        let processor = self.clone();
        let owned_path = path.to_path_buf();
        tokio::task::spawn_blocking(move || processor.process_bytes(&owned_path, &bytes))
            .await
            .map_err(|e| IngestionError::TaskFailed(e.to_string()))?
    }

    /// Process PDF bytes; `path` names the document
    pub fn process_bytes(&self, path: &Path, bytes: &[u8]) -> Result<ProcessedDocument, IngestionError> {
        let extracted = extract_pdf_bytes(path, bytes, &self.cleaner, self.min_page_chars)?;

        let document = Document {
            id: document_id_for(path),
            path: path.to_path_buf(),
            source_file: path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| path.display().to_string()),
            page_count: extracted.page_count,
            content_hash: hex::encode(Sha256::digest(bytes)),
        };

        let text = DocumentText::from_pages(&extracted.pages);
        let chunks = chunk_document(&document.id, &document.source_file, &text, &self.chunking)?;

        let chunk_chars: Vec<usize> = chunks.iter().map(|c| c.char_count).collect();
        let stats = ExtractionStats::from_extraction(&extracted).with_chunks(&chunk_chars);

        info!(
            document_id = %document.id,
            pages = document.page_count,
            pages_kept = stats.pages_kept,
            chunks = chunks.len(),
            "Document processed"
        );

        Ok(ProcessedDocument {
            document,
            chunks,
            stats,
        })
    }
}

/// Expand files and directories into a sorted, de-duplicated list of PDFs.
/// Directories are scanned one level deep; missing paths are skipped with
/// a warning.
pub fn discover_pdfs(paths: &[PathBuf]) -> Result<Vec<PathBuf>, IngestionError> {
    let mut found = BTreeSet::new();

    for path in paths {
        if path.is_dir() {
            for entry in std::fs::read_dir(path)? {
                let candidate = entry?.path();
                if candidate.is_file() && is_pdf(&candidate) {
                    found.insert(candidate);
                }
            }
        } else if path.is_file() {
            if is_pdf(path) {
                found.insert(path.clone());
            } else {
                warn!(path = %path.display(), "Not a PDF, skipping");
            }
        } else {
            warn!(path = %path.display(), "Path does not exist, skipping");
        }
    }

    debug!(count = found.len(), "PDF documents discovered");
    Ok(found.into_iter().collect())
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::build_test_pdf;
    use shmulik_common::models::PageSpan;

    fn processor() -> DocumentProcessor {
        DocumentProcessor::new(ChunkingConfig::default(), 20).unwrap()
    }

    #[test]
    fn test_process_bytes_builds_document_and_chunks() {
        let bytes = build_test_pdf(&[
            "Digital health literacy improves patient outcomes.",
            "Appendix",
            "The annual budget of the institute grew this year.",
        ]);
        let processed = processor()
            .process_bytes(Path::new("docs/Health Report 2023.pdf"), &bytes)
            .unwrap();

        assert_eq!(processed.document.id, "health-report-2023");
        assert_eq!(processed.document.source_file, "Health Report 2023.pdf");
        assert_eq!(processed.document.page_count, 3);
        assert_eq!(processed.document.content_hash.len(), 64);
        assert_eq!(processed.stats.pages_skipped, vec![2]);

        assert_eq!(processed.chunks.len(), 1);
        let chunk = &processed.chunks[0];
        assert_eq!(chunk.pages, PageSpan { first: 1, last: 3 });
        assert!(chunk.text.starts_with("Digital health literacy"));
    }

    #[tokio::test]
    async fn test_process_missing_file() {
        let err = processor().process(Path::new("/nonexistent/x.pdf")).await.unwrap_err();
        assert!(matches!(err, IngestionError::FileNotFound(_)));
    }

    #[tokio::test]
    async fn test_process_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.pdf");
        std::fs::write(&path, build_test_pdf(&["Digital health literacy improves patient outcomes."])).unwrap();

        let processed = processor().process(&path).await.unwrap();
        assert_eq!(processed.document.id, "report");
        assert_eq!(processed.chunks[0].pages, PageSpan::single(1));
    }

    #[test]
    fn test_invalid_chunking_rejected() {
        let config = ChunkingConfig {
            chunk_size: 100,
            chunk_overlap: 100,
        };
        assert!(matches!(
            DocumentProcessor::new(config, 20),
            Err(IngestionError::ConfigError(_))
        ));
    }

    #[test]
    fn test_discover_pdfs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.pdf"), b"").unwrap();
        std::fs::write(dir.path().join("a.PDF"), b"").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"").unwrap();

        let found = discover_pdfs(&[
            dir.path().to_path_buf(),
            dir.path().join("b.pdf"),
            dir.path().join("missing.pdf"),
        ])
        .unwrap();

        let names: Vec<String> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.PDF", "b.pdf"]);
    }
}
