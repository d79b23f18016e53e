//! In-memory vector index with on-disk persistence
//!
//! Entries are kept in insertion order inside an immutable snapshot.
//! Readers clone the snapshot `Arc` under a short read lock; writers build
//! a new snapshot off to the side and swap it in, so a search never sees a
//! half-applied `add` or `recreate`.
//!
//! Vectors are L2-normalised on insert and the query is normalised before
//! scoring, so cosine similarity reduces to a dot product.
//!
//! On disk an index is a directory with two files:
//! - `entries.json`: every entry (chunk, vector, metadata) in insertion order
//! - `manifest.json`: format version, embedding model, dimension, chunking
//!   parameters and entry count
//!
//! Both are written to a temporary name first and renamed into place.

use crate::config::ChunkingConfig;
use crate::embeddings::l2_normalize;
use crate::errors::{AppError, Result};
use crate::models::{EntryMetadata, IndexEntry, RetrievalResult, ScoredChunk};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

/// Bumped whenever the on-disk layout changes
pub const INDEX_FORMAT_VERSION: u32 = 1;

const MANIFEST_FILE: &str = "manifest.json";
const ENTRIES_FILE: &str = "entries.json";

/// What an index was built with. Two indexes are compatible only when
/// model and dimension agree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub embedding_model: String,
    pub dimension: usize,
    pub chunking: ChunkingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub format_version: u32,
    pub embedding_model: String,
    pub dimension: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub entry_count: usize,
    pub updated_at: DateTime<Utc>,
}

impl IndexManifest {
    pub fn chunking(&self) -> ChunkingConfig {
        ChunkingConfig {
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
        }
    }
}

/// Metadata filter applied before ranking
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilter {
    /// Keep only chunks from these documents
    pub document_ids: Option<Vec<String>>,
    /// Keep only chunks whose page span contains this page
    pub page: Option<u32>,
}

impl SearchFilter {
    pub fn document(id: impl Into<String>) -> Self {
        Self {
            document_ids: Some(vec![id.into()]),
            page: None,
        }
    }

    pub fn matches(&self, metadata: &EntryMetadata) -> bool {
        if let Some(ids) = &self.document_ids {
            if !ids.iter().any(|id| id == &metadata.document_id) {
                return false;
            }
        }
        if let Some(page) = self.page {
            if page < metadata.page || page > metadata.last_page {
                return false;
            }
        }
        true
    }
}

/// Readiness summary for health checks
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    pub entry_count: usize,
    pub document_count: usize,
    pub embedding_model: String,
    pub dimension: usize,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct IndexSnapshot {
    entries: Vec<IndexEntry>,
    positions: HashMap<String, usize>,
    updated_at: Option<DateTime<Utc>>,
}

impl IndexSnapshot {
    fn from_entries(entries: Vec<IndexEntry>, updated_at: Option<DateTime<Utc>>) -> Self {
        let mut snapshot = IndexSnapshot {
            entries: Vec::with_capacity(entries.len()),
            positions: HashMap::with_capacity(entries.len()),
            updated_at,
        };
        for entry in entries {
            snapshot.upsert(entry);
        }
        snapshot
    }

    fn upsert(&mut self, entry: IndexEntry) {
        match self.positions.get(entry.id()) {
            Some(&position) => self.entries[position] = entry,
            None => {
                self.positions.insert(entry.id().to_string(), self.entries.len());
                self.entries.push(entry);
            }
        }
    }
}

/// Vector index over chunk embeddings
#[derive(Debug)]
pub struct VectorIndex {
    dir: PathBuf,
    spec: IndexSpec,
    snapshot: RwLock<Arc<IndexSnapshot>>,
    writer: Mutex<()>,
}

impl VectorIndex {
    /// Create an empty index that persists to `dir`
    pub fn new(dir: impl Into<PathBuf>, spec: IndexSpec) -> Self {
        Self {
            dir: dir.into(),
            spec,
            snapshot: RwLock::new(Arc::new(IndexSnapshot::default())),
            writer: Mutex::new(()),
        }
    }

    /// Open a persisted index, failing fast when it was built with a
    /// different embedding model or dimension
    pub async fn open(dir: impl Into<PathBuf>, spec: IndexSpec) -> Result<Self> {
        let index = Self::new(dir, spec);
        index.load().await?;
        Ok(index)
    }

    /// Whether a persisted index exists at `dir`
    pub async fn exists(dir: &Path) -> bool {
        tokio::fs::try_exists(dir.join(MANIFEST_FILE))
            .await
            .unwrap_or(false)
    }

    /// Read only the manifest of a persisted index
    pub async fn read_manifest(dir: &Path) -> Result<IndexManifest> {
        let path = dir.join(MANIFEST_FILE);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AppError::IndexNotFound {
                    path: dir.display().to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&bytes).map_err(|e| AppError::IndexIncompatible {
            message: format!("Unreadable manifest {}: {}", path.display(), e),
        })
    }

    pub fn spec(&self) -> &IndexSpec {
        &self.spec
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Replace the in-memory contents with what is on disk
    #[instrument(skip(self), fields(dir = %self.dir.display()))]
    pub async fn load(&self) -> Result<usize> {
        let manifest = Self::read_manifest(&self.dir).await?;
        self.check_manifest(&manifest)?;

        let entries_path = self.dir.join(ENTRIES_FILE);
        let bytes = tokio::fs::read(&entries_path).await.map_err(|e| {
            AppError::IndexIncompatible {
                message: format!("Missing entries file {}: {}", entries_path.display(), e),
            }
        })?;
        let entries: Vec<IndexEntry> =
            serde_json::from_slice(&bytes).map_err(|e| AppError::IndexIncompatible {
                message: format!("Unreadable entries file {}: {}", entries_path.display(), e),
            })?;

        if entries.len() != manifest.entry_count {
            return Err(AppError::IndexIncompatible {
                message: format!(
                    "Manifest lists {} entries but {} were found",
                    manifest.entry_count,
                    entries.len()
                ),
            });
        }
        if let Some(bad) = entries.iter().find(|e| e.embedding.len() != self.spec.dimension) {
            return Err(AppError::IndexIncompatible {
                message: format!(
                    "Entry {} has dimension {}, expected {}",
                    bad.id(),
                    bad.embedding.len(),
                    self.spec.dimension
                ),
            });
        }

        let count = entries.len();
        let _guard = self.writer.lock().await;
        let snapshot = IndexSnapshot::from_entries(entries, Some(manifest.updated_at));
        *self.snapshot.write().await = Arc::new(snapshot);

        info!(entries = count, model = %manifest.embedding_model, "Vector index loaded");
        Ok(count)
    }

    fn check_manifest(&self, manifest: &IndexManifest) -> Result<()> {
        if manifest.format_version != INDEX_FORMAT_VERSION {
            return Err(AppError::IndexIncompatible {
                message: format!(
                    "Index format version {} is not supported (expected {})",
                    manifest.format_version, INDEX_FORMAT_VERSION
                ),
            });
        }
        if manifest.embedding_model != self.spec.embedding_model {
            return Err(AppError::IndexIncompatible {
                message: format!(
                    "Index was built with embedding model '{}', configured model is '{}'",
                    manifest.embedding_model, self.spec.embedding_model
                ),
            });
        }
        if manifest.dimension != self.spec.dimension {
            return Err(AppError::IndexIncompatible {
                message: format!(
                    "Index dimension {} does not match configured dimension {}",
                    manifest.dimension, self.spec.dimension
                ),
            });
        }
        if manifest.chunking() != self.spec.chunking {
            warn!(
                stored_size = manifest.chunk_size,
                stored_overlap = manifest.chunk_overlap,
                configured_size = self.spec.chunking.chunk_size,
                configured_overlap = self.spec.chunking.chunk_overlap,
                "Index was built with different chunking parameters; rebuild with --recreate to apply them"
            );
        }
        Ok(())
    }

    fn prepare(&self, mut entries: Vec<IndexEntry>) -> Result<Vec<IndexEntry>> {
        for entry in entries.iter_mut() {
            if entry.embedding.len() != self.spec.dimension {
                return Err(AppError::IndexIncompatible {
                    message: format!(
                        "Entry {} has dimension {}, index expects {}",
                        entry.id(),
                        entry.embedding.len(),
                        self.spec.dimension
                    ),
                });
            }
            if entry.embedding.iter().any(|x| !x.is_finite()) {
                return Err(AppError::Validation {
                    message: format!("Entry {} has a non-finite embedding", entry.id()),
                    field: Some("embedding".to_string()),
                });
            }
            l2_normalize(&mut entry.embedding);
        }
        Ok(entries)
    }

    /// Insert entries; an entry whose id already exists replaces the old
    /// one in place
    pub async fn add(&self, entries: Vec<IndexEntry>) -> Result<()> {
        let entries = self.prepare(entries)?;
        let _guard = self.writer.lock().await;

        let current = self.snapshot.read().await.clone();
        let mut next = IndexSnapshot {
            entries: current.entries.clone(),
            positions: current.positions.clone(),
            updated_at: Some(Utc::now()),
        };
        let added = entries.len();
        for entry in entries {
            next.upsert(entry);
        }

        let total = next.entries.len();
        *self.snapshot.write().await = Arc::new(next);
        debug!(added, total, "Entries added to index");
        Ok(())
    }

    /// Swap in `entries` for every document they belong to: existing
    /// entries of those documents are dropped, all others are kept in
    /// place. Returns how many stale entries were removed.
    pub async fn replace_documents(&self, entries: Vec<IndexEntry>) -> Result<usize> {
        let entries = self.prepare(entries)?;
        let documents: HashSet<String> = entries
            .iter()
            .map(|e| e.metadata.document_id.clone())
            .collect();
        let _guard = self.writer.lock().await;

        let current = self.snapshot.read().await.clone();
        let kept: Vec<IndexEntry> = current
            .entries
            .iter()
            .filter(|e| !documents.contains(&e.metadata.document_id))
            .cloned()
            .collect();
        let removed = current.entries.len() - kept.len();

        let mut next = IndexSnapshot::from_entries(kept, Some(Utc::now()));
        for entry in entries {
            next.upsert(entry);
        }

        let total = next.entries.len();
        *self.snapshot.write().await = Arc::new(next);
        debug!(documents = documents.len(), removed, total, "Documents replaced in index");
        Ok(removed)
    }

    /// Replace every entry atomically
    pub async fn recreate(&self, entries: Vec<IndexEntry>) -> Result<()> {
        let entries = self.prepare(entries)?;
        let _guard = self.writer.lock().await;

        let next = IndexSnapshot::from_entries(entries, Some(Utc::now()));
        let total = next.entries.len();
        *self.snapshot.write().await = Arc::new(next);
        info!(total, "Index recreated");
        Ok(())
    }

    /// Top-k entries by cosine similarity. Ties keep insertion order.
    pub async fn search(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<RetrievalResult> {
        if query.len() != self.spec.dimension {
            return Err(AppError::IndexIncompatible {
                message: format!(
                    "Query dimension {} does not match index dimension {}",
                    query.len(),
                    self.spec.dimension
                ),
            });
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut query = query.to_vec();
        l2_normalize(&mut query);

        let snapshot = self.snapshot.read().await.clone();

        let mut scored: Vec<(usize, f32)> = snapshot
            .entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| filter.map_or(true, |f| f.matches(&entry.metadata)))
            .map(|(position, entry)| (position, dot(&query, &entry.embedding)))
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(position, score)| ScoredChunk {
                chunk: snapshot.entries[position].chunk.clone(),
                score,
            })
            .collect())
    }

    /// Write the current snapshot to disk
    #[instrument(skip(self), fields(dir = %self.dir.display()))]
    pub async fn persist(&self) -> Result<()> {
        let _guard = self.writer.lock().await;
        let snapshot = self.snapshot.read().await.clone();

        tokio::fs::create_dir_all(&self.dir).await?;

        let manifest = IndexManifest {
            format_version: INDEX_FORMAT_VERSION,
            embedding_model: self.spec.embedding_model.clone(),
            dimension: self.spec.dimension,
            chunk_size: self.spec.chunking.chunk_size,
            chunk_overlap: self.spec.chunking.chunk_overlap,
            entry_count: snapshot.entries.len(),
            updated_at: snapshot.updated_at.unwrap_or_else(Utc::now),
        };

        write_atomic(&self.dir.join(ENTRIES_FILE), &serde_json::to_vec(&snapshot.entries)?).await?;
        write_atomic(
            &self.dir.join(MANIFEST_FILE),
            &serde_json::to_vec_pretty(&manifest)?,
        )
        .await?;

        info!(entries = manifest.entry_count, "Vector index persisted");
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.snapshot.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Ids of all entries in insertion order
    pub async fn entry_ids(&self) -> Vec<String> {
        self.snapshot
            .read()
            .await
            .entries
            .iter()
            .map(|e| e.id().to_string())
            .collect()
    }

    pub async fn stats(&self) -> IndexStats {
        let snapshot = self.snapshot.read().await.clone();
        let documents: HashSet<&str> = snapshot
            .entries
            .iter()
            .map(|e| e.metadata.document_id.as_str())
            .collect();

        IndexStats {
            entry_count: snapshot.entries.len(),
            document_count: documents.len(),
            embedding_model: self.spec.embedding_model.clone(),
            dimension: self.spec.dimension,
            updated_at: snapshot.updated_at,
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
