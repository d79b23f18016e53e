//! PDF text extraction module
//!
//! Extracts text page by page using lopdf, cleans each page and drops pages
//! with too little text to be useful.

use crate::cleaner::{alphanumeric_count, TextCleaner};
use crate::errors::IngestionError;
use serde::Serialize;
use std::path::Path;
use tracing::{debug, warn};

/// Cleaned text of one PDF page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    /// 1-based page number in the source PDF
    pub number: u32,
    pub text: String,
}

/// Result of extracting one PDF
#[derive(Debug, Clone)]
pub struct ExtractedPdf {
    pub page_count: u32,
    pub pages: Vec<PageText>,
    /// Pages dropped for being empty, unreadable or below the minimum
    pub skipped_pages: Vec<u32>,
}

/// Extraction quality figures reported after each document
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionStats {
    pub pages_total: u32,
    pub pages_kept: usize,
    pub pages_skipped: Vec<u32>,
    pub chars: usize,
    pub words: usize,
    pub chunks: usize,
    pub avg_chunk_chars: usize,
}

impl ExtractionStats {
    pub fn from_extraction(pdf: &ExtractedPdf) -> Self {
        Self {
            pages_total: pdf.page_count,
            pages_kept: pdf.pages.len(),
            pages_skipped: pdf.skipped_pages.clone(),
            chars: pdf.pages.iter().map(|p| p.text.chars().count()).sum(),
            words: pdf.pages.iter().map(|p| p.text.split_whitespace().count()).sum(),
            ..Default::default()
        }
    }

    pub fn with_chunks(mut self, chunk_chars: &[usize]) -> Self {
        self.chunks = chunk_chars.len();
        self.avg_chunk_chars = if chunk_chars.is_empty() {
            0
        } else {
            chunk_chars.iter().sum::<usize>() / chunk_chars.len()
        };
        self
    }

    /// Signs that extraction went wrong (scanned pages, broken encodings)
    pub fn warnings(&self, chunk_size: usize) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.words < 100 {
            warnings.push(format!("Very little text extracted ({} words)", self.words));
        }
        if !self.pages_skipped.is_empty() {
            warnings.push(format!(
                "{} of {} pages skipped",
                self.pages_skipped.len(),
                self.pages_total
            ));
        }
        if self.chunks > 1 && self.avg_chunk_chars < chunk_size * 3 / 10 {
            warnings.push(format!(
                "Chunks are unusually small (average {} characters)",
                self.avg_chunk_chars
            ));
        }
        warnings
    }
}

/// Extract text from PDF bytes; `path` is used for error messages only
pub fn extract_pdf_bytes(
    path: &Path,
    bytes: &[u8],
    cleaner: &TextCleaner,
    min_page_chars: usize,
) -> Result<ExtractedPdf, IngestionError> {
    let doc = lopdf::Document::load_mem(bytes)
        .map_err(|e| unreadable(path, format!("Failed to load PDF: {e}")))?;

    let page_numbers: Vec<u32> = doc.get_pages().keys().copied().collect();
    debug!(page_count = page_numbers.len(), "Extracting text from PDF");

    let mut pages = Vec::with_capacity(page_numbers.len());
    let mut skipped_pages = Vec::new();

    for number in &page_numbers {
        let raw = match doc.extract_text(&[*number]) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(page = number, error = %e, "Failed to extract text from page, skipping");
                skipped_pages.push(*number);
                continue;
            }
        };

        let text = cleaner.clean(&raw);
        let meaningful = alphanumeric_count(&text);
        if meaningful < min_page_chars {
            debug!(page = number, chars = meaningful, "Page below minimum text, skipping");
            skipped_pages.push(*number);
            continue;
        }

        pages.push(PageText {
            number: *number,
            text,
        });
    }

    if pages.is_empty() {
        return Err(unreadable(
            path,
            format!("No usable text on any of {} pages", page_numbers.len()),
        ));
    }

    if !skipped_pages.is_empty() {
        warn!(
            path = %path.display(),
            skipped = ?skipped_pages,
            "Some pages had no usable text"
        );
    }

    Ok(ExtractedPdf {
        page_count: page_numbers.len() as u32,
        pages,
        skipped_pages,
    })
}

fn unreadable(path: &Path, message: String) -> IngestionError {
    IngestionError::DocumentUnreadable {
        path: path.display().to_string(),
        message,
    }
}

/// Build a simple PDF with one text page per entry. Used by tests across
/// the crate.
#[cfg(test)]
pub(crate) fn build_test_pdf(pages: &[&str]) -> Vec<u8> {
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Object, Stream};

    let mut doc = lopdf::Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids = Vec::new();
    for text in pages {
        // One text object per line so extraction yields one line each
        let mut operations = Vec::new();
        for (i, line) in text.lines().enumerate() {
            let y = 720 - 14 * i as i64;
            operations.extend([
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), y.into()]),
                Operation::new("Tj", vec![Object::string_literal(line)]),
                Operation::new("ET", vec![]),
            ]);
        }

        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().unwrap(),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cleaner() -> TextCleaner {
        TextCleaner::new().unwrap()
    }

    #[test]
    fn test_extracts_pages_in_order() {
        let bytes = build_test_pdf(&[
            "Digital health literacy improves patient outcomes.",
            "The annual budget of the institute grew this year.",
        ]);
        let pdf = extract_pdf_bytes(Path::new("report.pdf"), &bytes, &cleaner(), 20).unwrap();

        assert_eq!(pdf.page_count, 2);
        assert_eq!(pdf.pages.len(), 2);
        assert_eq!(pdf.pages[0].number, 1);
        assert!(pdf.pages[0].text.contains("health literacy"));
        assert_eq!(pdf.pages[1].number, 2);
        assert!(pdf.pages[1].text.contains("budget"));
    }

    #[test]
    fn test_short_pages_are_skipped() {
        let bytes = build_test_pdf(&[
            "Digital health literacy improves patient outcomes.",
            "Fig. 2",
        ]);
        let pdf = extract_pdf_bytes(Path::new("report.pdf"), &bytes, &cleaner(), 20).unwrap();

        assert_eq!(pdf.pages.len(), 1);
        assert_eq!(pdf.skipped_pages, vec![2]);
    }

    #[test]
    fn test_no_usable_text_is_unreadable() {
        let bytes = build_test_pdf(&["12"]);
        let err = extract_pdf_bytes(Path::new("scan.pdf"), &bytes, &cleaner(), 20).unwrap_err();
        assert!(matches!(err, IngestionError::DocumentUnreadable { .. }));
    }

    #[test]
    fn test_garbage_bytes_are_unreadable() {
        let err = extract_pdf_bytes(Path::new("bad.pdf"), b"not a pdf", &cleaner(), 20).unwrap_err();
        assert!(matches!(err, IngestionError::DocumentUnreadable { .. }));
    }

    #[test]
    fn test_stats_warnings() {
        let stats = ExtractionStats {
            pages_total: 3,
            pages_kept: 2,
            pages_skipped: vec![3],
            words: 40,
            ..Default::default()
        }
        .with_chunks(&[100, 120]);

        let warnings = stats.warnings(1000);
        assert_eq!(warnings.len(), 3);
        assert!(warnings[0].contains("40 words"));
        assert_eq!(stats.avg_chunk_chars, 110);
    }
}
