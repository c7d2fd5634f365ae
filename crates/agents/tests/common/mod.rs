//! Common test utilities: in-memory collaborators with scripted behavior

#![allow(dead_code)]

use async_trait::async_trait;
use graphrag_agents::{
    AgentError, CompletionOptions, ConversationManager, EmbeddingService, GraphStore,
    LanguageModel, Result, RetrievalConfig, RetryPolicy, VectorIndex,
};
use graphrag_core::{Chunk, Entity, GraphFact, ModelOutput};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Config with fast failure: one attempt, short timeout
pub fn test_config() -> RetrievalConfig {
    RetrievalConfig::default()
        .with_retry(RetryPolicy::none())
        .with_call_timeout(Duration::from_millis(500))
}

/// Graph keyed by canonical seed name
#[derive(Default)]
pub struct FakeGraphStore {
    facts: HashMap<String, Vec<GraphFact>>,
    failing_seeds: HashSet<String>,
    pub failing: AtomicBool,
    pub calls: AtomicUsize,
}

impl FakeGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_facts(mut self, seed: &str, facts: Vec<GraphFact>) -> Self {
        self.facts.insert(Entity::canonicalize(seed), facts);
        self
    }

    /// Lookups for this seed fail while every other seed answers
    pub fn with_failing_seed(mut self, seed: &str) -> Self {
        self.failing_seeds.insert(Entity::canonicalize(seed));
        self
    }

    pub fn failing() -> Self {
        let store = Self::default();
        store.failing.store(true, Ordering::SeqCst);
        store
    }

    fn check(&self, seed: &str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(AgentError::Processing("graph store is down".into()));
        }
        if self.failing_seeds.contains(&Entity::canonicalize(seed)) {
            return Err(AgentError::Processing(format!("lookup for '{seed}' failed")));
        }
        Ok(())
    }
}

#[async_trait]
impl GraphStore for FakeGraphStore {
    async fn traverse(&self, seed: &str, max_depth: usize) -> Result<Vec<GraphFact>> {
        self.check(seed)?;
        Ok(self
            .facts
            .get(&Entity::canonicalize(seed))
            .map(|facts| {
                facts
                    .iter()
                    .filter(|fact| fact.depth <= max_depth)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn node_exists(&self, entity_name: &str) -> Result<bool> {
        self.check(entity_name)?;
        Ok(self.facts.contains_key(&Entity::canonicalize(entity_name)))
    }
}

/// Chunk index returning a fixed ranking regardless of the query
#[derive(Default)]
pub struct FakeVectorIndex {
    ranked: Vec<(String, f32)>,
    chunks: HashMap<String, Chunk>,
    pub failing: AtomicBool,
}

impl FakeVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chunk(mut self, id: &str, text: &str, similarity: f32) -> Self {
        self.ranked.push((id.to_string(), similarity));
        self.chunks.insert(id.to_string(), Chunk::new(id, text));
        self
    }

    /// A hit that `fetch_chunk` no longer finds
    pub fn with_dangling_hit(mut self, id: &str, similarity: f32) -> Self {
        self.ranked.push((id.to_string(), similarity));
        self
    }

    pub fn failing() -> Self {
        let index = Self::default();
        index.failing.store(true, Ordering::SeqCst);
        index
    }
}

#[async_trait]
impl VectorIndex for FakeVectorIndex {
    async fn search(&self, _query_embedding: &[f32], k: usize) -> Result<Vec<(String, f32)>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AgentError::Processing("vector index is down".into()));
        }
        Ok(self.ranked.iter().take(k).cloned().collect())
    }

    async fn fetch_chunk(&self, chunk_id: &str) -> Result<Option<Chunk>> {
        Ok(self.chunks.get(chunk_id).cloned())
    }
}

#[derive(Default)]
pub struct FakeEmbedder {
    pub calls: AtomicUsize,
}

#[async_trait]
impl EmbeddingService for FakeEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![text.len() as f32, 1.0, 0.0])
    }
}

/// Embeds by counting a few marker words, so similar texts get similar vectors
pub struct KeywordEmbedder;

pub const KEYWORDS: [&str; 3] = ["curie", "nobel", "radium"];

pub fn keyword_vector(text: &str) -> Vec<f32> {
    let lower = text.to_lowercase();
    KEYWORDS
        .iter()
        .map(|word| lower.matches(word).count() as f32 + 0.01)
        .collect()
}

#[async_trait]
impl EmbeddingService for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(keyword_vector(text))
    }
}

/// Language model with a fixed entity answer and numbered replies
pub struct FakeLlm {
    entities: Value,
    condensed: Option<String>,
    answer_delay: Duration,
    pub fail_answers: AtomicBool,
    pub empty_answers: AtomicBool,
    pub prompts: Mutex<Vec<String>>,
    pub answers: AtomicUsize,
}

impl FakeLlm {
    pub fn new() -> Self {
        Self {
            entities: json!({ "entities": [] }),
            condensed: None,
            answer_delay: Duration::ZERO,
            fail_answers: AtomicBool::new(false),
            empty_answers: AtomicBool::new(false),
            prompts: Mutex::new(Vec::new()),
            answers: AtomicUsize::new(0),
        }
    }

    pub fn with_entities(mut self, entities: Value) -> Self {
        self.entities = entities;
        self
    }

    pub fn with_condensed(mut self, question: &str) -> Self {
        self.condensed = Some(question.to_string());
        self
    }

    pub fn with_answer_delay(mut self, delay: Duration) -> Self {
        self.answer_delay = delay;
        self
    }

    /// Prompts of answer calls, in call order
    pub fn answer_prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| !is_condense_prompt(p))
            .cloned()
            .collect()
    }
}

fn is_condense_prompt(prompt: &str) -> bool {
    prompt.starts_with("Given the following conversation")
}

#[async_trait]
impl LanguageModel for FakeLlm {
    async fn complete(&self, prompt: &str, _options: CompletionOptions) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());

        if is_condense_prompt(prompt) {
            return Ok(self.condensed.clone().unwrap_or_default());
        }

        if !self.answer_delay.is_zero() {
            tokio::time::sleep(self.answer_delay).await;
        }
        if self.fail_answers.load(Ordering::SeqCst) {
            return Err(AgentError::Processing("rate limited".into()));
        }
        if self.empty_answers.load(Ordering::SeqCst) {
            return Ok("   ".into());
        }

        let n = self.answers.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("answer {n}"))
    }

    async fn complete_structured(&self, _prompt: &str, _schema: &Value) -> Result<ModelOutput<Value>> {
        Ok(ModelOutput::Parsed(self.entities.clone()))
    }
}

pub fn marie_curie_entities() -> Value {
    json!({ "entities": [{ "name": "Marie Curie", "type": "person" }] })
}

pub fn manager(
    store: FakeGraphStore,
    index: FakeVectorIndex,
    llm: Arc<FakeLlm>,
    config: RetrievalConfig,
) -> ConversationManager {
    ConversationManager::new(
        Arc::new(store),
        Arc::new(index),
        Arc::new(FakeEmbedder::default()),
        llm,
        config,
    )
}
