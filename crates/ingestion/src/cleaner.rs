//! Text cleanup for extracted PDF pages
//!
//! Removes extraction artifacts (control characters, zero-width marks,
//! broken ligatures, soft hyphens), drops running headers/footers and
//! normalises whitespace. Line structure is kept so the chunker can split
//! on paragraph and line boundaries.

use crate::errors::IngestionError;
use regex_lite::Regex;

/// Whole-line patterns treated as page furniture
const NOISE_PATTERNS: &[&str] = &[
    // Bare page numbers
    r"^\d{1,4}$",
    // "Page 3", "page 3 of 12", "עמוד 3", "עמוד 3 מתוך 12"
    r"(?i)^(page|עמוד)\s*\d{1,4}(\s*(of|מתוך)\s*\d{1,4})?$",
    // "3 / 12"
    r"^\d{1,4}\s*/\s*\d{1,4}$",
    // Copyright notices
    r"(?i)^(©|\(c\)|copyright).{0,120}$",
    // Confidentiality markings
    r"(?i)^(confidential|סודי)(\s.{0,60})?$",
];

fn replace_char(c: char) -> Option<&'static str> {
    Some(match c {
        '\u{FB00}' => "ff",
        '\u{FB01}' => "fi",
        '\u{FB02}' => "fl",
        '\u{FB03}' => "ffi",
        '\u{FB04}' => "ffl",
        '\u{FB05}' | '\u{FB06}' => "st",
        '\u{201C}' | '\u{201D}' | '\u{201E}' => "\"",
        '\u{2018}' | '\u{2019}' => "'",
        '\u{00A0}' | '\u{2007}' | '\u{202F}' | '\t' => " ",
        '\r' => "\n",
        // BOM, zero-width and directional marks, soft hyphen
        '\u{FEFF}' | '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}' | '\u{200E}'
        | '\u{200F}' | '\u{00AD}' => "",
        _ => return None,
    })
}

#[derive(Debug, Clone)]
pub struct TextCleaner {
    noise: Vec<Regex>,
}

impl TextCleaner {
    pub fn new() -> Result<Self, IngestionError> {
        let noise = NOISE_PATTERNS
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| {
                    IngestionError::ConfigError(format!("Invalid noise pattern {p}: {e}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { noise })
    }

    /// Clean one page of extracted text
    pub fn clean(&self, raw: &str) -> String {
        let mut normalized = String::with_capacity(raw.len());
        for c in raw.chars() {
            match replace_char(c) {
                Some(replacement) => normalized.push_str(replacement),
                None if c.is_control() && c != '\n' => normalized.push(' '),
                None => normalized.push(c),
            }
        }

        let mut out = String::with_capacity(normalized.len());
        let mut blank_run = 0;
        for line in normalized.lines() {
            let line = line.split_whitespace().collect::<Vec<_>>().join(" ");
            if line.is_empty() {
                blank_run += 1;
                continue;
            }
            if self.is_noise(&line) {
                continue;
            }
            if !out.is_empty() {
                // Any run of blank lines becomes one paragraph break
                out.push_str(if blank_run > 0 { "\n\n" } else { "\n" });
            }
            blank_run = 0;
            out.push_str(&line);
        }
        out
    }

    fn is_noise(&self, line: &str) -> bool {
        self.noise.iter().any(|re| re.is_match(line))
    }
}

/// Alphanumeric characters, used to spot degenerate pages
pub fn alphanumeric_count(text: &str) -> usize {
    text.chars().filter(|c| c.is_alphanumeric()).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cleaner() -> TextCleaner {
        TextCleaner::new().unwrap()
    }

    #[test]
    fn test_collapses_whitespace_and_blank_lines() {
        let input = "Hello   World\t again\n\n\n\nNext  paragraph\nsame paragraph";
        assert_eq!(
            cleaner().clean(input),
            "Hello World again\n\nNext paragraph\nsame paragraph"
        );
    }

    #[test]
    fn test_fixes_ligatures_and_invisible_characters() {
        let input = "\u{FEFF}The e\u{FB03}cient \u{FB01}eld\u{200B} of lit\u{00AD}eracy";
        assert_eq!(cleaner().clean(input), "The efficient field of literacy");
    }

    #[test]
    fn test_strips_control_characters() {
        assert_eq!(cleaner().clean("a\u{0007}b\u{0000}c"), "a b c");
    }

    #[test]
    fn test_drops_headers_and_footers() {
        let input = "Digital Health Literacy\n12\nBody text.\nPage 3 of 10\n3 / 10\n© 2023 Samuel Neaman Institute\nעמוד 4\nCONFIDENTIAL";
        assert_eq!(cleaner().clean(input), "Digital Health Literacy\nBody text.");
    }

    #[test]
    fn test_keeps_sentences_that_mention_pages() {
        let input = "See page 3 for the full survey results.";
        assert_eq!(cleaner().clean(input), input);
    }

    #[test]
    fn test_alphanumeric_count() {
        assert_eq!(alphanumeric_count("ab 12 -- אב"), 6);
    }
}
