//! Vector retrieval - passages semantically close to a question

use crate::config::RetrievalConfig;
use crate::ports::{EmbeddingService, VectorIndex};
use crate::retry::call_with_retry;
use crate::Result;
use graphrag_core::{Outcome, RetrievalWarning, ScoredChunk};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Embeds the question and looks up its nearest chunks
pub struct VectorRetriever {
    embedder: Arc<dyn EmbeddingService>,
    index: Arc<dyn VectorIndex>,
    config: RetrievalConfig,
}

impl VectorRetriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingService>,
        index: Arc<dyn VectorIndex>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            index,
            config,
        }
    }

    /// Up to `k` chunks, most similar first
    #[instrument(skip(self, question))]
    pub async fn retrieve_vector(&self, question: &str, k: usize) -> Outcome<Vec<ScoredChunk>> {
        let question = question.trim();
        if k == 0 || question.is_empty() {
            return Outcome::ok(Vec::new());
        }

        match self.search(question, k).await {
            Ok(chunks) => {
                info!("Found {} similar chunks", chunks.len());
                Outcome::ok(chunks)
            }
            Err(e) => {
                warn!("Vector retrieval failed: {}", e);
                Outcome::degraded(
                    Vec::new(),
                    RetrievalWarning::VectorUnavailable {
                        reason: e.to_string(),
                    },
                )
            }
        }
    }

    async fn search(&self, question: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        let policy = &self.config.retry;
        let limit = self.config.call_timeout;

        debug!("Generating query embedding...");
        let embedding = call_with_retry(policy, limit, "query embedding", || {
            self.embedder.embed(question)
        })
        .await?;

        let hits = call_with_retry(policy, limit, "vector search", || {
            self.index.search(&embedding, k)
        })
        .await?;

        let mut chunks = Vec::with_capacity(hits.len());
        for (chunk_id, similarity) in hits.into_iter().take(k) {
            let fetched = call_with_retry(policy, limit, "chunk fetch", || {
                self.index.fetch_chunk(&chunk_id)
            })
            .await?;

            match fetched {
                Some(chunk) => chunks.push(ScoredChunk::new(chunk, similarity)),
                None => debug!("Chunk '{}' no longer exists, skipping", chunk_id),
            }
        }

        chunks.sort_by(|a, b| rank(b.similarity).total_cmp(&rank(a.similarity)));
        Ok(chunks)
    }
}

/// NaN similarities rank below every real score
fn rank(similarity: f32) -> f32 {
    if similarity.is_nan() {
        f32::NEG_INFINITY
    } else {
        similarity
    }
}
