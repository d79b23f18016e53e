//! Chunk and index entry types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Inclusive range of 1-based page numbers covered by a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageSpan {
    pub first: u32,
    pub last: u32,
}

impl PageSpan {
    pub fn single(page: u32) -> Self {
        Self { first: page, last: page }
    }

    pub fn contains(&self, page: u32) -> bool {
        (self.first..=self.last).contains(&page)
    }
}

impl fmt::Display for PageSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.first == self.last {
            write!(f, "Page {}", self.first)
        } else {
            write!(f, "Pages {}-{}", self.first, self.last)
        }
    }
}

/// A contiguous slice of a document's extracted text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Stable across re-ingestion with identical chunking parameters
    pub id: String,
    pub document_id: String,
    pub source_file: String,
    /// Position of this chunk within its document
    pub index: usize,
    pub pages: PageSpan,
    /// Character offsets into the document's extracted text
    pub start_offset: usize,
    pub end_offset: usize,
    pub text: String,
    pub char_count: usize,
    /// Rough token count (~4 characters per token)
    pub token_estimate: usize,
}

/// Filterable metadata stored alongside each vector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    pub document_id: String,
    pub source_file: String,
    pub page: u32,
    pub last_page: u32,
}

impl EntryMetadata {
    pub fn for_chunk(chunk: &Chunk) -> Self {
        Self {
            document_id: chunk.document_id.clone(),
            source_file: chunk.source_file.clone(),
            page: chunk.pages.first,
            last_page: chunk.pages.last,
        }
    }
}

/// A chunk with its embedding, as stored in the vector index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
    pub metadata: EntryMetadata,
}

impl IndexEntry {
    pub fn new(chunk: Chunk, embedding: Vec<f32>) -> Self {
        let metadata = EntryMetadata::for_chunk(&chunk);
        Self { chunk, embedding, metadata }
    }

    pub fn id(&self) -> &str {
        &self.chunk.id
    }
}

/// A retrieved chunk and its cosine similarity to the query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Retrieved chunks in descending score order
pub type RetrievalResult = Vec<ScoredChunk>;
