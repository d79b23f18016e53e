//! Embedding service abstraction
//!
//! Provides a unified interface for embedding providers:
//! - Any OpenAI-compatible `/embeddings` endpoint (OpenAI, LiteLLM,
//!   text-embeddings-inference serving multilingual E5)
//! - A deterministic feature-hashing embedder for offline builds and tests
//!
//! E5-family models expect `query: ` / `passage: ` prefixes; the
//! `embed_query` / `embed_passages` entry points apply them.

use crate::config::EmbeddingConfig;
use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Trait for embedding generation
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts (batch)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Get the model name
    fn model_name(&self) -> &str;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;

    fn query_prefix(&self) -> &str {
        ""
    }

    fn passage_prefix(&self) -> &str {
        ""
    }

    /// Embed a search query
    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let text = format!("{}{}", self.query_prefix(), query);
        self.embed(&text).await
    }

    /// Embed document passages for indexing
    async fn embed_passages(&self, passages: &[String]) -> Result<Vec<Vec<f32>>> {
        let prefix = self.passage_prefix();
        if prefix.is_empty() {
            return self.embed_batch(passages).await;
        }
        let prefixed: Vec<String> = passages.iter().map(|p| format!("{prefix}{p}")).collect();
        self.embed_batch(&prefixed).await
    }
}

/// Scale a vector to unit length in place. Zero vectors are left untouched.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|x| *x /= norm);
    }
}

/// OpenAI-compatible embedding client
pub struct OpenAIEmbedder {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
    dimension: usize,
    base_url: String,
    query_prefix: String,
    passage_prefix: String,
    max_retries: u32,
    batch_size: usize,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a [String],
    model: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

/// A failed embedding request and whether another attempt could succeed
struct RequestFailure {
    error: AppError,
    retryable: bool,
}

impl RequestFailure {
    fn transient(message: String) -> Self {
        Self {
            error: AppError::EmbeddingProviderUnavailable { message },
            retryable: true,
        }
    }

    fn permanent(message: String) -> Self {
        Self {
            error: AppError::EmbeddingProviderUnavailable { message },
            retryable: false,
        }
    }
}

fn is_retryable_status(status: reqwest::StatusCode) -> bool {
    status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS
}

impl OpenAIEmbedder {
    /// Create a new embedder from configuration
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            dimension: config.dimension,
            base_url: config.api_base.trim_end_matches('/').to_string(),
            query_prefix: config.query_prefix.clone(),
            passage_prefix: config.passage_prefix.clone(),
            max_retries: config.max_retries.max(1),
            batch_size: config.batch_size.max(1),
        })
    }

    /// Make request with retry. Only transport failures, timeouts, 429 and
    /// 5xx responses are attempted again.
    async fn request_with_retry(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut last_error = None;

        for attempt in 0..self.max_retries {
            if attempt > 0 {
                // Exponential backoff
                let delay = Duration::from_millis(100 * 2_u64.pow(attempt));
                tokio::time::sleep(delay).await;
            }

            let start = Instant::now();
            match self.make_request(texts).await {
                Ok(embeddings) => {
                    metrics::record_embedding(
                        start.elapsed().as_secs_f64(),
                        &self.model,
                        texts.len(),
                        true,
                    );
                    return Ok(embeddings);
                }
                Err(failure) => {
                    metrics::record_embedding(
                        start.elapsed().as_secs_f64(),
                        &self.model,
                        texts.len(),
                        false,
                    );
                    if !failure.retryable {
                        tracing::warn!(error = %failure.error, "Embedding request failed permanently");
                        return Err(failure.error);
                    }
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        error = %failure.error,
                        "Embedding request failed, retrying"
                    );
                    last_error = Some(failure.error);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| AppError::EmbeddingProviderUnavailable {
            message: "Unknown error after retries".to_string(),
        }))
    }

    async fn make_request(
        &self,
        texts: &[String],
    ) -> std::result::Result<Vec<Vec<f32>>, RequestFailure> {
        let url = format!("{}/embeddings", self.base_url);

        let request = EmbeddingRequest {
            input: texts,
            model: &self.model,
        };

        let mut builder = self.client.post(&url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| RequestFailure::transient(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = format!("API error {}: {}", status, body);
            return Err(if is_retryable_status(status) {
                RequestFailure::transient(message)
            } else {
                RequestFailure::permanent(message)
            });
        }

        let mut result: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| RequestFailure::permanent(format!("Failed to parse response: {}", e)))?;

        if result.data.len() != texts.len() {
            return Err(RequestFailure::permanent(format!(
                "Expected {} embeddings, received {}",
                texts.len(),
                result.data.len()
            )));
        }

        result.data.sort_by_key(|d| d.index);
        result
            .data
            .into_iter()
            .map(|d| self.check_dimension(d.embedding))
            .collect::<Result<Vec<_>>>()
            .map_err(|error| RequestFailure {
                error,
                retryable: false,
            })
    }

    fn check_dimension(&self, mut embedding: Vec<f32>) -> Result<Vec<f32>> {
        if embedding.len() != self.dimension {
            return Err(AppError::EmbeddingProviderUnavailable {
                message: format!(
                    "Model {} returned dimension {}, expected {}",
                    self.model,
                    embedding.len(),
                    self.dimension
                ),
            });
        }
        l2_normalize(&mut embedding);
        Ok(embedding)
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embeddings = self.request_with_retry(&[text.to_string()]).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| AppError::EmbeddingProviderUnavailable {
                message: "Empty response".to_string(),
            })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut all_embeddings = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(self.batch_size) {
            let embeddings = self.request_with_retry(chunk).await?;
            all_embeddings.extend(embeddings);
        }

        Ok(all_embeddings)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn query_prefix(&self) -> &str {
        &self.query_prefix
    }

    fn passage_prefix(&self) -> &str {
        &self.passage_prefix
    }
}

/// Deterministic feature-hashing embedder.
///
/// Each lowercase word and each character trigram inside a word is hashed
/// into one of `dimension` buckets with a signed weight. Texts sharing
/// vocabulary land close together; there is no cross-lingual semantics.
pub struct HashEmbedder {
    dimension: usize,
}

pub const HASH_EMBEDDING_MODEL: &str = "feature-hash-v1";

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimension];
        let lowered = text.to_lowercase();

        for word in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            self.accumulate(&mut vector, word.as_bytes(), 1.0);

            let chars: Vec<char> = word.chars().collect();
            if chars.len() > 3 {
                for window in chars.windows(3) {
                    let trigram: String = window.iter().collect();
                    self.accumulate(&mut vector, trigram.as_bytes(), 0.25);
                }
            }
        }

        l2_normalize(&mut vector);
        vector
    }

    fn accumulate(&self, vector: &mut [f32], feature: &[u8], weight: f32) {
        let digest = Sha256::digest(feature);
        let mut bucket_bytes = [0u8; 8];
        bucket_bytes.copy_from_slice(&digest[..8]);
        let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimension as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_text(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }

    fn model_name(&self) -> &str {
        HASH_EMBEDDING_MODEL
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Create an embedder based on configuration
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAIEmbedder::new(config)?)),
        "hash" => Ok(Arc::new(HashEmbedder::new(config.dimension))),
        other => Err(AppError::Configuration {
            message: format!("Unknown embedding provider '{}'", other),
        }),
    }
}
