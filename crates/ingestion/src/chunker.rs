//! Text chunking module
//!
//! Splits a document's text into overlapping chunks for embedding.
//!
//! text-splitter cuts the text into segments on the best available
//! semantic boundary (paragraph, line, sentence, word). Each chunk is one
//! segment extended backwards into the previous chunk by up to
//! `chunk_overlap` characters, starting on a word boundary, so adjacent
//! chunks always share a non-empty region and no chunk exceeds
//! `chunk_size` characters. Offsets are character offsets into
//! [`DocumentText::text`].

use crate::errors::IngestionError;
use crate::pdf::PageText;
use sha2::{Digest, Sha256};
use shmulik_common::config::ChunkingConfig;
use shmulik_common::models::{Chunk, PageSpan};
use text_splitter::{ChunkConfig, TextSplitter};
use tracing::debug;

/// Room left in each chunk for the whitespace between two segments
const SEPARATOR_ALLOWANCE: usize = 2;

const PAGE_SEPARATOR: &str = "\n\n";

#[derive(Debug, Clone, Copy)]
struct PageRange {
    number: u32,
    start: usize,
}

/// The pages of a document joined into one text, remembering where each
/// page starts
#[derive(Debug, Clone)]
pub struct DocumentText {
    pub text: String,
    pages: Vec<PageRange>,
}

impl DocumentText {
    pub fn from_pages(pages: &[PageText]) -> Self {
        let mut text = String::new();
        let mut ranges = Vec::with_capacity(pages.len());
        let mut offset = 0;

        for (i, page) in pages.iter().enumerate() {
            if i > 0 {
                text.push_str(PAGE_SEPARATOR);
                offset += PAGE_SEPARATOR.chars().count();
            }
            ranges.push(PageRange {
                number: page.number,
                start: offset,
            });
            text.push_str(&page.text);
            offset += page.text.chars().count();
        }

        Self {
            text,
            pages: ranges,
        }
    }

    /// Page containing the character at `offset`. Separator characters
    /// belong to the page before them.
    pub fn page_at(&self, offset: usize) -> u32 {
        let idx = self.pages.partition_point(|p| p.start <= offset);
        self.pages
            .get(idx.saturating_sub(1))
            .map(|p| p.number)
            .unwrap_or(1)
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

/// Split `document` into chunks
pub fn chunk_document(
    document_id: &str,
    source_file: &str,
    document: &DocumentText,
    config: &ChunkingConfig,
) -> Result<Vec<Chunk>, IngestionError> {
    if config.chunk_size == 0 || config.chunk_overlap >= config.chunk_size {
        return Err(IngestionError::ChunkingError(format!(
            "chunk_overlap ({}) must be smaller than chunk_size ({})",
            config.chunk_overlap, config.chunk_size
        )));
    }

    let text = &document.text;
    let chars: Vec<char> = text.chars().collect();
    let byte_starts: Vec<usize> = text.char_indices().map(|(b, _)| b).collect();
    let char_at = |byte: usize| byte_starts.partition_point(|&b| b < byte);

    let capacity = config
        .chunk_size
        .saturating_sub(config.chunk_overlap + SEPARATOR_ALLOWANCE)
        .max(1);
    let splitter = TextSplitter::new(ChunkConfig::new(capacity));

    let segments: Vec<(usize, usize)> = splitter
        .chunk_indices(text)
        .map(|(byte, segment)| (char_at(byte), char_at(byte + segment.len())))
        .collect();

    let mut chunks: Vec<Chunk> = Vec::with_capacity(segments.len());
    for (index, &(segment_start, end)) in segments.iter().enumerate() {
        let start = match chunks.last() {
            Some(prev) => overlap_start(&chars, prev.start_offset, prev.end_offset, segment_start, end, config),
            None => segment_start,
        };

        let chunk_text: String = chars[start..end].iter().collect();
        let char_count = end - start;
        let pages = PageSpan {
            first: document.page_at(start),
            last: document.page_at(end.saturating_sub(1).max(start)),
        };

        chunks.push(Chunk {
            id: chunk_id(document_id, index, start, end, &chunk_text, config),
            document_id: document_id.to_string(),
            source_file: source_file.to_string(),
            index,
            pages,
            start_offset: start,
            end_offset: end,
            token_estimate: (char_count / 4).max(1),
            char_count,
            text: chunk_text,
        });
    }

    debug!(
        document_id,
        input_chars = chars.len(),
        chunk_count = chunks.len(),
        chunk_size = config.chunk_size,
        chunk_overlap = config.chunk_overlap,
        "Text chunked"
    );

    Ok(chunks)
}

/// Where the chunk ending at `end` starts, given the previous chunk spans
/// `prev_start..prev_end`
fn overlap_start(
    chars: &[char],
    prev_start: usize,
    prev_end: usize,
    segment_start: usize,
    end: usize,
    config: &ChunkingConfig,
) -> usize {
    let budget = config
        .chunk_overlap
        .min(config.chunk_size.saturating_sub(end - prev_end));
    if budget == 0 {
        return segment_start;
    }

    let candidate = prev_end.saturating_sub(budget).max(prev_start);

    // Move forward to the start of the next word
    let mut pos = candidate;
    if pos > prev_start && !chars[pos - 1].is_whitespace() {
        while pos < prev_end && !chars[pos].is_whitespace() {
            pos += 1;
        }
    }
    while pos < prev_end && chars[pos].is_whitespace() {
        pos += 1;
    }
    if pos < prev_end {
        return pos;
    }

    // One long word: cut inside it
    let mut pos = candidate;
    while pos < prev_end - 1 && chars[pos].is_whitespace() {
        pos += 1;
    }
    pos
}

/// Stable across runs: depends only on the document, the chunking
/// parameters and the chunk's own position and text
fn chunk_id(
    document_id: &str,
    index: usize,
    start: usize,
    end: usize,
    text: &str,
    config: &ChunkingConfig,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document_id.as_bytes());
    hasher.update(
        format!(
            "\u{1f}{}\u{1f}{}\u{1f}{start}\u{1f}{end}\u{1f}",
            config.chunk_size, config.chunk_overlap
        )
        .as_bytes(),
    );
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    format!("{document_id}:{index:04}:{}", hex::encode(&digest[..4]))
}
