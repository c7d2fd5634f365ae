//! Core domain types for GraphRAG QA
//!
//! This crate defines the data structures shared by the retrieval engine:
//! query entities, graph facts, scored chunks, the merged context handed to
//! the language model, and the per-session conversation state.

pub mod chunk;
pub mod context;
pub mod conversation;
pub mod entity;
pub mod error;
pub mod fact;
pub mod model;
pub mod warning;

pub use chunk::{Chunk, ScoredChunk};
pub use context::{estimate_tokens, MergedContext};
pub use conversation::{ConversationState, Turn};
pub use entity::{Entity, EntityType};
pub use error::{CoreError, Result};
pub use fact::{FactKey, GraphFact};
pub use model::ModelOutput;
pub use warning::{Outcome, RetrievalWarning};
