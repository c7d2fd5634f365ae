//! Merged context - the evidence block handed to the language model

use crate::{GraphFact, RetrievalWarning, ScoredChunk};
use serde::{Deserialize, Serialize};

/// Approximate characters per token for English prose
const CHARS_PER_TOKEN: usize = 4;

/// Estimate the token count of a piece of text.
///
/// Uses a ceiling of `chars / 4`, so any non-empty text costs at least one
/// token and the estimate of a concatenation never exceeds the sum of the
/// estimates of its parts.
pub fn estimate_tokens(text: &str) -> usize {
    let chars = text.chars().count();
    chars.div_ceil(CHARS_PER_TOKEN)
}

/// Graph facts and vector chunks combined into one bounded context
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MergedContext {
    /// Retained facts, shallowest first
    pub facts: Vec<GraphFact>,

    /// Retained chunks, most similar first
    pub chunks: Vec<ScoredChunk>,

    /// The text passed to the model
    pub rendered_text: String,

    /// Accounted token cost of `rendered_text` (an upper bound of its estimate)
    pub token_estimate: usize,

    /// Facts dropped because the budget ran out
    #[serde(default)]
    pub dropped_facts: usize,

    /// Chunks dropped because the budget ran out
    #[serde(default)]
    pub dropped_chunks: usize,

    /// Chunks dropped as duplicates of a fact or of another chunk
    #[serde(default)]
    pub deduplicated_chunks: usize,
}

impl MergedContext {
    /// An empty context: no evidence found
    pub fn empty() -> Self {
        Self::default()
    }

    /// True when neither facts nor chunks were retained
    pub fn is_empty(&self) -> bool {
        self.facts.is_empty() && self.chunks.is_empty()
    }

    /// True when the budget forced items out
    pub fn was_truncated(&self) -> bool {
        self.dropped_facts > 0 || self.dropped_chunks > 0
    }

    /// Soft warnings describing how the context was built
    pub fn warnings(&self) -> Vec<RetrievalWarning> {
        let mut warnings = Vec::new();
        if self.was_truncated() {
            warnings.push(RetrievalWarning::BudgetExceeded {
                dropped_facts: self.dropped_facts,
                dropped_chunks: self.dropped_chunks,
            });
        }
        if self.is_empty() {
            warnings.push(RetrievalWarning::ContextEmpty);
        }
        warnings
    }
}
