//! Context merging - facts and chunks into one bounded evidence block
//!
//! Output layout:
//!
//! ```text
//! Structured data:
//! Marie Curie discovered Radium
//!
//! Unstructured data:
//! #Document Marie Curie won two Nobel Prizes
//! ```
//!
//! Facts always precede chunks and each keeps the order it was given in.
//! The budget is spent on facts first, then on chunks; the first item that
//! does not fit closes its section.

use graphrag_core::{estimate_tokens, GraphFact, MergedContext, ScoredChunk};
use std::collections::HashSet;
use tracing::debug;

const STRUCTURED_HEADER: &str = "Structured data:\n";
const UNSTRUCTURED_HEADER: &str = "Unstructured data:\n";
const DOCUMENT_PREFIX: &str = "#Document ";
const DEFAULT_DEDUP_THRESHOLD: f32 = 0.85;

/// Combines graph facts and vector chunks under a token budget
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContextMerger {
    dedup_threshold: f32,
}

impl Default for ContextMerger {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_THRESHOLD)
    }
}

impl ContextMerger {
    /// `dedup_threshold` is the Jaccard similarity at which a chunk counts
    /// as a restatement of a fact
    pub fn new(dedup_threshold: f32) -> Self {
        Self {
            dedup_threshold: dedup_threshold.clamp(0.0, 1.0),
        }
    }

    pub fn dedup_threshold(&self) -> f32 {
        self.dedup_threshold
    }

    /// Merge `facts` (ordered shallowest first) and `chunks` into a context
    /// whose token estimate never exceeds `token_budget`.
    ///
    /// A fact too large for the whole budget is dropped rather than
    /// overflowing it.
    pub fn merge(
        &self,
        facts: &[GraphFact],
        chunks: &[ScoredChunk],
        token_budget: usize,
    ) -> MergedContext {
        let mut ctx = MergedContext::empty();
        let mut rendered = String::new();
        let mut used = 0usize;

        // Facts
        let mut seen_facts = HashSet::new();
        let unique_facts: Vec<&GraphFact> = facts
            .iter()
            .filter(|fact| seen_facts.insert(fact.key()))
            .collect();

        for (position, fact) in unique_facts.iter().enumerate() {
            let line = format!("{}\n", fact.statement());
            let header = if ctx.facts.is_empty() { STRUCTURED_HEADER } else { "" };
            let cost = estimate_tokens(header) + estimate_tokens(&line);

            if used + cost > token_budget {
                ctx.dropped_facts = unique_facts.len() - position;
                break;
            }

            used += cost;
            rendered.push_str(header);
            rendered.push_str(&line);
            ctx.facts.push((*fact).clone());
        }

        // Chunks
        let fact_words: Vec<HashSet<String>> = ctx
            .facts
            .iter()
            .map(|fact| word_set(&fact.statement()))
            .collect();

        let mut candidates: Vec<&ScoredChunk> = Vec::new();
        let mut seen_ids = HashSet::new();
        let mut seen_texts = HashSet::new();
        for scored in chunks {
            let normalized = normalize_text(&scored.chunk.text);
            let duplicate = normalized.is_empty()
                || !seen_ids.insert(scored.chunk.id.as_str())
                || !seen_texts.insert(normalized.clone())
                || self.restates_fact(&normalized, &fact_words);
            if duplicate {
                ctx.deduplicated_chunks += 1;
            } else {
                candidates.push(scored);
            }
        }

        for (position, scored) in candidates.iter().enumerate() {
            let line = format!("{}{}\n", DOCUMENT_PREFIX, scored.chunk.text.trim());
            let header = match (ctx.chunks.is_empty(), ctx.facts.is_empty()) {
                (true, true) => UNSTRUCTURED_HEADER.to_string(),
                (true, false) => format!("\n{UNSTRUCTURED_HEADER}"),
                (false, _) => String::new(),
            };
            let cost = estimate_tokens(&header) + estimate_tokens(&line);

            if used + cost > token_budget {
                ctx.dropped_chunks = candidates.len() - position;
                break;
            }

            used += cost;
            rendered.push_str(&header);
            rendered.push_str(&line);
            ctx.chunks.push((*scored).clone());
        }

        ctx.rendered_text = rendered.trim_end().to_string();
        ctx.token_estimate = used;

        debug!(
            "Merged {} facts and {} chunks into {} tokens (budget {}, dropped {}/{}, dedup {})",
            ctx.facts.len(),
            ctx.chunks.len(),
            used,
            token_budget,
            ctx.dropped_facts,
            ctx.dropped_chunks,
            ctx.deduplicated_chunks
        );
        ctx
    }

    fn restates_fact(&self, normalized_chunk: &str, fact_words: &[HashSet<String>]) -> bool {
        let chunk_words = word_set(normalized_chunk);
        fact_words
            .iter()
            .any(|words| jaccard(&chunk_words, words) >= self.dedup_threshold)
    }
}

/// Lowercase, keep alphanumerics, collapse everything else to single spaces
pub fn normalize_text(text: &str) -> String {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn word_set(text: &str) -> HashSet<String> {
    normalize_text(text)
        .split(' ')
        .filter(|word| !word.is_empty())
        .map(str::to_string)
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f32 / union as f32
}
