//! Source document record

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A PDF in the corpus. Immutable once ingested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Stable identifier derived from the file stem
    pub id: String,

    pub path: PathBuf,

    /// File name shown in citations
    pub source_file: String,

    /// Pages in the PDF, including skipped ones
    pub page_count: u32,

    /// SHA-256 of the PDF bytes, hex encoded
    pub content_hash: String,
}

/// Derive a document id from a path: lowercase file stem with runs of
/// non-alphanumeric characters folded into a single `-`.
pub fn document_id_for(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    let mut slug = String::with_capacity(stem.len());
    let mut pending_dash = false;
    for ch in stem.chars() {
        if ch.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(ch.to_lowercase());
        } else {
            pending_dash = true;
        }
    }

    if slug.is_empty() {
        "document".to_string()
    } else {
        slug
    }
}
