//! Retrieval and conversation settings, overridable from the environment

use crate::retry::RetryPolicy;
use std::time::Duration;

const DEFAULT_GRAPH_MAX_DEPTH: usize = 2;
const DEFAULT_GRAPH_MAX_FACTS: usize = 50;
const DEFAULT_VECTOR_TOP_K: usize = 5;
const DEFAULT_MAX_ENTITIES: usize = 10;
const DEFAULT_CONTEXT_WINDOW_TOKENS: usize = 4096;
const DEFAULT_ANSWER_MAX_TOKENS: usize = 512;
const DEFAULT_TEMPERATURE: f32 = 0.3;
const DEFAULT_HISTORY_MAX_TURNS: usize = 5;
const DEFAULT_DEDUP_THRESHOLD: f32 = 0.85;
const DEFAULT_CALL_TIMEOUT_SECS: u64 = 60;
const DEFAULT_MAX_CONCURRENT_QUERIES: usize = 4;
const DEFAULT_CONDENSE_FOLLOW_UPS: bool = true;

pub(crate) fn env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

pub(crate) fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|value| {
            let value = value.trim().to_ascii_lowercase();
            matches!(value.as_str(), "1" | "true" | "yes" | "on")
        })
        .unwrap_or(default)
}

pub(crate) fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<T>().ok())
        .unwrap_or(default)
}

/// Settings for one retrieval/conversation pipeline
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// Traversal depth from each seed entity
    pub graph_max_depth: usize,
    /// Facts kept after ordering
    pub graph_max_facts: usize,
    /// Chunks returned by similarity search
    pub vector_top_k: usize,
    /// Entities kept from one extraction
    pub max_entities: usize,
    /// Model context window shared by history, evidence, question and answer
    pub context_window_tokens: usize,
    /// Tokens reserved for the answer
    pub answer_max_tokens: usize,
    /// Sampling temperature for answers
    pub temperature: f32,
    /// Turns kept in the session history
    pub history_max_turns: usize,
    /// Jaccard similarity at which a chunk duplicates a fact
    pub dedup_threshold: f32,
    /// Per-call timeout for every outbound call
    pub call_timeout: Duration,
    /// Concurrent graph queries per retrieval
    pub max_concurrent_queries: usize,
    /// Rewrite follow-ups into standalone questions before retrieval
    pub condense_follow_ups: bool,
    pub retry: RetryPolicy,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            graph_max_depth: DEFAULT_GRAPH_MAX_DEPTH,
            graph_max_facts: DEFAULT_GRAPH_MAX_FACTS,
            vector_top_k: DEFAULT_VECTOR_TOP_K,
            max_entities: DEFAULT_MAX_ENTITIES,
            context_window_tokens: DEFAULT_CONTEXT_WINDOW_TOKENS,
            answer_max_tokens: DEFAULT_ANSWER_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            history_max_turns: DEFAULT_HISTORY_MAX_TURNS,
            dedup_threshold: DEFAULT_DEDUP_THRESHOLD,
            call_timeout: Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS),
            max_concurrent_queries: DEFAULT_MAX_CONCURRENT_QUERIES,
            condense_follow_ups: DEFAULT_CONDENSE_FOLLOW_UPS,
            retry: RetryPolicy::default(),
        }
    }
}

impl RetrievalConfig {
    /// Defaults overridden by environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            graph_max_depth: env_parse("GRAPH_MAX_DEPTH", defaults.graph_max_depth),
            graph_max_facts: env_parse("GRAPH_MAX_FACTS", defaults.graph_max_facts),
            vector_top_k: env_parse("VECTOR_TOP_K", defaults.vector_top_k),
            max_entities: env_parse("MAX_ENTITIES", defaults.max_entities).max(1),
            context_window_tokens: env_parse(
                "CONTEXT_WINDOW_TOKENS",
                defaults.context_window_tokens,
            ),
            answer_max_tokens: env_parse("ANSWER_MAX_TOKENS", defaults.answer_max_tokens),
            temperature: env_parse("LLM_TEMPERATURE", defaults.temperature),
            history_max_turns: env_parse("HISTORY_MAX_TURNS", defaults.history_max_turns),
            dedup_threshold: env_parse("DEDUP_THRESHOLD", defaults.dedup_threshold)
                .clamp(0.0, 1.0),
            call_timeout: Duration::from_secs(
                env_parse("CALL_TIMEOUT_SECS", DEFAULT_CALL_TIMEOUT_SECS).max(1),
            ),
            max_concurrent_queries: env_parse(
                "MAX_CONCURRENT_QUERIES",
                defaults.max_concurrent_queries,
            )
            .max(1),
            condense_follow_ups: env_flag("CONDENSE_FOLLOW_UPS", defaults.condense_follow_ups),
            retry: RetryPolicy::from_env(),
        }
    }

    /// Builder: set history window
    pub fn with_history_max_turns(mut self, turns: usize) -> Self {
        self.history_max_turns = turns;
        self
    }

    /// Builder: set per-call timeout
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Builder: set retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Builder: set the model context window and the share reserved for the answer
    pub fn with_token_limits(mut self, context_window: usize, answer_max: usize) -> Self {
        self.context_window_tokens = context_window;
        self.answer_max_tokens = answer_max;
        self
    }

    /// Builder: enable or disable follow-up condensation
    pub fn with_condense_follow_ups(mut self, enabled: bool) -> Self {
        self.condense_follow_ups = enabled;
        self
    }
}
