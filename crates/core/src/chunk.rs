//! Chunk types - the unstructured retrieval units

use serde::{Deserialize, Serialize};

/// A pre-existing retrieval unit owned by the ingestion pipeline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Stable identifier
    pub id: String,

    /// The chunk text
    pub text: String,

    /// Vector embedding of the text
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedding: Vec<f32>,

    /// Document this chunk was cut from
    #[serde(default)]
    pub source_doc_id: String,
}

impl Chunk {
    /// Create a new chunk
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            embedding: Vec::new(),
            source_doc_id: String::new(),
        }
    }

    /// Builder pattern: set embedding
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = embedding;
        self
    }

    /// Builder pattern: set source document
    pub fn with_source(mut self, source_doc_id: impl Into<String>) -> Self {
        self.source_doc_id = source_doc_id.into();
        self
    }

    /// Check if chunk has an embedding
    pub fn has_embedding(&self) -> bool {
        !self.embedding.is_empty()
    }
}

/// A chunk returned by similarity search
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Cosine similarity (or an equivalent, higher = closer)
    pub similarity: f32,
}

impl ScoredChunk {
    pub fn new(chunk: Chunk, similarity: f32) -> Self {
        Self { chunk, similarity }
    }
}
