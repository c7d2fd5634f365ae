//! Collaborator interfaces the retrieval engine depends on.
//!
//! The engine only reads through these traits. `Repository` implements the
//! graph and vector sides; `TeiClient` and `LlmClient` implement the model
//! sides; tests substitute in-memory fakes.

use crate::Result;
use async_trait::async_trait;
use graphrag_core::{Chunk, GraphFact, ModelOutput};
use graphrag_db::Repository;
use serde_json::Value;

/// Read access to the knowledge graph
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Facts reachable within `max_depth` hops of the nodes matching `seed`,
    /// each tagged with the hop at which it was reached
    async fn traverse(&self, seed: &str, max_depth: usize) -> Result<Vec<GraphFact>>;

    /// Whether any node matches the entity name
    async fn node_exists(&self, entity_name: &str) -> Result<bool>;
}

/// Read access to the chunk index
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Top-`k` `(chunk_id, score)` pairs, most similar first
    async fn search(&self, query_embedding: &[f32], k: usize) -> Result<Vec<(String, f32)>>;

    /// Chunk by id, `None` if it no longer exists
    async fn fetch_chunk(&self, chunk_id: &str) -> Result<Option<Chunk>>;
}

/// Text embedding model
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Sampling options for a free-text completion
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionOptions {
    pub temperature: f32,
    pub max_tokens: usize,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_tokens: 512,
        }
    }
}

/// Language model
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Free-text completion
    async fn complete(&self, prompt: &str, options: CompletionOptions) -> Result<String>;

    /// Completion constrained to a JSON schema.
    ///
    /// Transport failures are errors; output that is not valid JSON comes
    /// back as [`ModelOutput::Malformed`].
    async fn complete_structured(&self, prompt: &str, schema: &Value) -> Result<ModelOutput<Value>>;
}

#[async_trait]
impl GraphStore for Repository {
    async fn traverse(&self, seed: &str, max_depth: usize) -> Result<Vec<GraphFact>> {
        Ok(Repository::traverse(self, seed, max_depth).await?)
    }

    async fn node_exists(&self, entity_name: &str) -> Result<bool> {
        Ok(Repository::node_exists(self, entity_name).await?)
    }
}

#[async_trait]
impl VectorIndex for Repository {
    async fn search(&self, query_embedding: &[f32], k: usize) -> Result<Vec<(String, f32)>> {
        let hits = self.search_chunks(query_embedding.to_vec(), k).await?;
        Ok(hits
            .into_iter()
            .map(|hit| (hit.chunk_id, hit.similarity))
            .collect())
    }

    async fn fetch_chunk(&self, chunk_id: &str) -> Result<Option<Chunk>> {
        Ok(Repository::fetch_chunk(self, chunk_id).await?)
    }
}
