//! Hybrid retrieval and conversational QA for GraphRAG
//!
//! This crate contains the question-answering pipeline:
//! - Extractor: names the entities a question is about
//! - Graph retriever: facts around those entities
//! - Vector retriever: passages similar to the question
//! - Merger: one bounded, deduplicated context
//! - Conversation manager: history, prompt, answer

pub mod config;
pub mod conversation;
pub mod error;
pub mod extractor;
pub mod graph_retriever;
pub mod inference;
pub mod merger;
pub mod ports;
pub mod retry;
pub mod vector_retriever;

pub use config::RetrievalConfig;
pub use conversation::{Answer, ConversationManager, SessionPhase};
pub use error::{AgentError, Result};
pub use extractor::EntityExtractor;
pub use graph_retriever::GraphRetriever;
pub use inference::{LlmClient, TeiClient};
pub use merger::ContextMerger;
pub use ports::{CompletionOptions, EmbeddingService, GraphStore, LanguageModel, VectorIndex};
pub use retry::RetryPolicy;
pub use vector_retriever::VectorRetriever;
