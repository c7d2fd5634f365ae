//! Graph facts - traversed edges of the knowledge graph rendered as statements

use serde::{Deserialize, Serialize};

/// Identity of a fact for deduplication: (subject, relation, object)
pub type FactKey = (String, String, String);

/// One traversed edge of the knowledge graph
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphFact {
    /// Name of the "from" node
    pub subject: String,

    /// Relationship label (e.g. `DISCOVERED`, `works_at`)
    pub relation: String,

    /// Name of the "to" node
    pub object: String,

    /// Document the relationship was extracted from
    #[serde(default)]
    pub source_doc_id: String,

    /// Hops from the seed node; 1 means the edge touches a seed
    #[serde(default = "default_depth")]
    pub depth: usize,

    /// Graph-native relevance score, when the store provides one
    #[serde(default)]
    pub score: Option<f32>,
}

fn default_depth() -> usize {
    1
}

impl GraphFact {
    /// Create a new fact at depth 1
    pub fn new(
        subject: impl Into<String>,
        relation: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            relation: relation.into(),
            object: object.into(),
            source_doc_id: String::new(),
            depth: 1,
            score: None,
        }
    }

    /// Builder: set source document
    pub fn with_source(mut self, source_doc_id: impl Into<String>) -> Self {
        self.source_doc_id = source_doc_id.into();
        self
    }

    /// Builder: set traversal depth
    pub fn at_depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    /// Builder: set relevance score
    pub fn with_score(mut self, score: f32) -> Self {
        self.score = Some(score);
        self
    }

    /// Deduplication key
    pub fn key(&self) -> FactKey {
        (
            self.subject.clone(),
            self.relation.clone(),
            self.object.clone(),
        )
    }

    /// Render as an `"X relation Y"` statement
    pub fn statement(&self) -> String {
        let relation = self.relation.trim().replace('_', " ").to_lowercase();
        format!("{} {} {}", self.subject.trim(), relation, self.object.trim())
    }
}
