//! Router fixtures for handler tests

use crate::{create_router, AppState};
use async_trait::async_trait;
use axum::{body::Body, http::Request, response::Response, Router};
use shmulik_common::{
    config::{AppConfig, ChunkingConfig, RetrievalConfig},
    context::{ConversationManager, GenerationSettings, GenerationWorkflow, HistoryPolicy},
    embeddings::{Embedder, HashEmbedder},
    errors::{AppError, Result},
    index::{IndexSpec, VectorIndex},
    llm::{CompletionRequest, LanguageModel},
    models::{Chunk, IndexEntry, PageSpan},
    retrieval::Retriever,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const DIMENSION: usize = 64;

const CORPUS: &[&str] = &[
    "Digital health literacy improves patient outcomes.",
    "The annual budget of the institute grew.",
];

/// Language model with a fixed reply
pub struct FixedModel {
    reply: Option<String>,
    calls: AtomicUsize,
    last_prompt: Mutex<String>,
}

impl FixedModel {
    pub fn replying(text: &str) -> Self {
        Self {
            reply: Some(text.to_string()),
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(String::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(String::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> String {
        self.last_prompt.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for FixedModel {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock().unwrap() = request.prompt;
        self.reply.clone().ok_or_else(|| AppError::GenerationFailed {
            message: "request timed out".into(),
        })
    }

    fn model_name(&self) -> &str {
        "fixed"
    }
}

/// State over an in-memory index of `texts`; text `i` sits on page `i + 1`
/// of `literacy.pdf`
pub async fn test_state(model: Arc<FixedModel>, texts: &[&str], loaded: bool) -> AppState {
    let config = Arc::new(AppConfig::default());
    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(DIMENSION));

    let index = Arc::new(VectorIndex::new(
        "unused",
        IndexSpec {
            embedding_model: embedder.model_name().to_string(),
            dimension: DIMENSION,
            chunking: ChunkingConfig::default(),
        },
    ));

    let mut entries = Vec::new();
    for (i, text) in texts.iter().enumerate() {
        let chunk = Chunk {
            id: format!("literacy:{i:04}"),
            document_id: "literacy".into(),
            source_file: "literacy.pdf".into(),
            index: i,
            pages: PageSpan::single(i as u32 + 1),
            start_offset: 0,
            end_offset: text.chars().count(),
            text: text.to_string(),
            char_count: text.chars().count(),
            token_estimate: text.len() / 4,
        };
        let vector = embedder.embed(text).await.unwrap();
        entries.push(IndexEntry::new(chunk, vector));
    }
    index.add(entries).await.unwrap();

    let retriever = Arc::new(Retriever::new(
        embedder,
        index.clone(),
        &RetrievalConfig {
            top_k: 2,
            min_score: None,
        },
    ));
    let workflow = Arc::new(GenerationWorkflow::new(retriever, model, GenerationSettings::default()));
    let conversations = Arc::new(ConversationManager::new(
        workflow,
        HistoryPolicy::from(&config.conversation),
    ));

    AppState {
        config,
        conversations,
        index,
        index_loaded: loaded,
    }
}

pub async fn test_app(model: Arc<FixedModel>) -> (Router, AppState) {
    let state = test_state(model, CORPUS, true).await;
    (create_router(state.clone()), state)
}

pub fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
