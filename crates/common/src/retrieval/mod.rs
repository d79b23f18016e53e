//! Query-time retrieval
//!
//! Embeds the query with the same provider that built the index and ranks
//! index entries by cosine similarity. An empty result, whether the index
//! had nothing to offer or everything fell below the similarity floor, is
//! reported as `NoRelevantContext`.

use crate::config::RetrievalConfig;
use crate::embeddings::Embedder;
use crate::errors::{AppError, Result};
use crate::index::{SearchFilter, VectorIndex};
use crate::metrics;
use crate::models::RetrievalResult;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument};

pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<VectorIndex>,
    top_k: usize,
    min_score: Option<f32>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<VectorIndex>, config: &RetrievalConfig) -> Self {
        Self {
            embedder,
            index,
            top_k: config.top_k,
            min_score: config.min_score,
        }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    /// Retrieve the configured number of chunks
    pub async fn retrieve(&self, query: &str) -> Result<RetrievalResult> {
        self.retrieve_filtered(query, self.top_k, None).await
    }

    /// Retrieve up to `k` chunks matching `filter`
    #[instrument(skip(self, query, filter), fields(query_chars = query.chars().count()))]
    pub async fn retrieve_filtered(
        &self,
        query: &str,
        k: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<RetrievalResult> {
        let start = Instant::now();

        let vector = self.embedder.embed_query(query).await.map_err(|e| match e {
            AppError::EmbeddingProviderUnavailable { .. } => e,
            other => AppError::EmbeddingProviderUnavailable {
                message: other.to_string(),
            },
        })?;

        let mut results = self.index.search(&vector, k, filter).await?;

        if let Some(floor) = self.min_score {
            results.retain(|r| r.score >= floor);
        }

        metrics::record_retrieval(start.elapsed().as_secs_f64(), results.len());
        debug!(
            results = results.len(),
            top_score = results.first().map(|r| r.score),
            "Retrieval complete"
        );

        if results.is_empty() {
            return Err(AppError::NoRelevantContext);
        }
        Ok(results)
    }
}
