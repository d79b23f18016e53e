//! Test doubles for the embedding provider and the language model

use crate::config::{ChunkingConfig, RetrievalConfig};
use crate::embeddings::{l2_normalize, Embedder};
use crate::errors::{AppError, Result};
use crate::index::{IndexSpec, VectorIndex};
use crate::llm::{CompletionRequest, LanguageModel};
use crate::models::{Chunk, IndexEntry, PageSpan};
use crate::retrieval::Retriever;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Maps English and Hebrew words for the same idea onto the same axis,
/// standing in for a multilingual embedding space.
pub struct ConceptEmbedder;

const CONCEPTS: &[&[&str]] = &[
    &["health", "בריאות"],
    &["literacy", "אוריינות"],
    &["digital", "דיגיטלית", "דיגיטלי"],
    &["budget", "תקציב"],
    &["outcomes", "תוצאות"],
    &["patient", "patients", "מטופלים"],
];

impl ConceptEmbedder {
    fn vector(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; CONCEPTS.len()];
        let lowered = text.to_lowercase();
        for word in lowered.split(|c: char| !c.is_alphanumeric()) {
            if let Some(axis) = CONCEPTS.iter().position(|words| words.contains(&word)) {
                vector[axis] += 1.0;
            }
        }
        l2_normalize(&mut vector);
        vector
    }
}

#[async_trait]
impl Embedder for ConceptEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(Self::vector(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }

    fn model_name(&self) -> &str {
        "concept-test"
    }

    fn dimension(&self) -> usize {
        CONCEPTS.len()
    }
}

/// Always fails, as an unreachable embedding service would
pub struct UnavailableEmbedder;

#[async_trait]
impl Embedder for UnavailableEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(AppError::EmbeddingProviderUnavailable {
            message: "connection refused".into(),
        })
    }

    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.embed("").await.map(|v| vec![v])
    }

    fn model_name(&self) -> &str {
        "concept-test"
    }

    fn dimension(&self) -> usize {
        CONCEPTS.len()
    }
}

enum Reply {
    Text(String),
    Fail(String),
    Hang,
}

/// Language model returning a fixed reply and recording every request
pub struct ScriptedModel {
    reply: Reply,
    calls: AtomicUsize,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedModel {
    fn with(reply: Reply) -> Self {
        Self {
            reply,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(text: &str) -> Self {
        Self::with(Reply::Text(text.to_string()))
    }

    pub fn failing(message: &str) -> Self {
        Self::with(Reply::Fail(message.to_string()))
    }

    /// Never completes; for cancellation tests
    pub fn hanging() -> Self {
        Self::with(Reply::Hang)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);
        match &self.reply {
            Reply::Text(text) => Ok(text.clone()),
            Reply::Fail(message) => Err(AppError::GenerationFailed {
                message: message.clone(),
            }),
            Reply::Hang => std::future::pending().await,
        }
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Index `texts` (one chunk per text, page = position + 1) and wrap it in a retriever
pub async fn retriever_over(
    embedder: Arc<dyn Embedder>,
    texts: &[&str],
    top_k: usize,
    min_score: Option<f32>,
) -> Retriever {
    let index = Arc::new(VectorIndex::new(
        "unused",
        IndexSpec {
            embedding_model: embedder.model_name().to_string(),
            dimension: embedder.dimension(),
            chunking: ChunkingConfig::default(),
        },
    ));

    let mut entries = Vec::with_capacity(texts.len());
    for (i, text) in texts.iter().enumerate() {
        let vector = embedder.embed(text).await.unwrap_or_default();
        let chunk = Chunk {
            id: format!("corpus:{i:04}"),
            document_id: "corpus".into(),
            source_file: "corpus.pdf".into(),
            index: i,
            pages: PageSpan::single(i as u32 + 1),
            start_offset: 0,
            end_offset: text.chars().count(),
            text: text.to_string(),
            char_count: text.chars().count(),
            token_estimate: text.len() / 4,
        };
        entries.push(IndexEntry::new(chunk, vector));
    }
    index.add(entries).await.unwrap();

    Retriever::new(embedder, index, &RetrievalConfig { top_k, min_score })
}
