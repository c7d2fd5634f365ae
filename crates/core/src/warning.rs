//! Soft failure taxonomy for the retrieval pipeline
//!
//! None of these abort a question. They travel next to the (possibly
//! partial) result so callers can tell a thin answer from a confident one.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A degraded-but-continuing condition raised during retrieval
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RetrievalWarning {
    #[error("Entity extraction degraded: {reason}")]
    ExtractionDegraded { reason: String },

    #[error("Graph unavailable: all {failed} entity queries failed")]
    GraphUnavailable { failed: usize },

    #[error("Vector search unavailable: {reason}")]
    VectorUnavailable { reason: String },

    #[error("No evidence found in the graph or the vector index")]
    ContextEmpty,

    #[error("Context budget exceeded: dropped {dropped_facts} facts and {dropped_chunks} chunks")]
    BudgetExceeded {
        dropped_facts: usize,
        dropped_chunks: usize,
    },
}

/// A best-effort result together with the warnings raised producing it
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome<T> {
    pub value: T,
    pub warnings: Vec<RetrievalWarning>,
}

impl<T> Outcome<T> {
    /// A clean result
    pub fn ok(value: T) -> Self {
        Self {
            value,
            warnings: Vec::new(),
        }
    }

    /// A degraded result
    pub fn degraded(value: T, warning: RetrievalWarning) -> Self {
        Self {
            value,
            warnings: vec![warning],
        }
    }

    pub fn is_degraded(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Split into value and warnings
    pub fn into_parts(self) -> (T, Vec<RetrievalWarning>) {
        (self.value, self.warnings)
    }
}
