//! Answer returned by the chat workflow

use super::chunk::{Chunk, PageSpan};
use serde::{Deserialize, Serialize};

/// How a turn ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerOutcome {
    /// Generated from retrieved context
    Grounded,
    /// Nothing relevant was retrieved; no generation took place
    NoContext,
    /// Retrieval or generation failed
    Failed,
}

/// A chunk cited as evidence for an answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evidence {
    pub chunk_id: String,
    pub source_file: String,
    pub pages: PageSpan,
}

impl From<&Chunk> for Evidence {
    fn from(chunk: &Chunk) -> Self {
        Self {
            chunk_id: chunk.id.clone(),
            source_file: chunk.source_file.clone(),
            pages: chunk.pages,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    /// Ordered by first citation in `text`
    pub evidence: Vec<Evidence>,
    pub success: bool,
    pub outcome: AnswerOutcome,
}

impl Answer {
    pub fn grounded(text: String, evidence: Vec<Evidence>) -> Self {
        Self {
            text,
            evidence,
            success: true,
            outcome: AnswerOutcome::Grounded,
        }
    }

    pub fn no_context(text: String) -> Self {
        Self {
            text,
            evidence: Vec::new(),
            success: true,
            outcome: AnswerOutcome::NoContext,
        }
    }

    pub fn failed(text: String) -> Self {
        Self {
            text,
            evidence: Vec::new(),
            success: false,
            outcome: AnswerOutcome::Failed,
        }
    }

    pub fn evidence_ids(&self) -> Vec<&str> {
        self.evidence.iter().map(|e| e.chunk_id.as_str()).collect()
    }
}
