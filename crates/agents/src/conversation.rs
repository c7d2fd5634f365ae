//! Conversation Manager - the question/answer loop over hybrid retrieval
//!
//! A session moves `Idle -> AwaitingAnswer -> Idle` for every question.
//! Questions on one session are answered one at a time; a second `ask`
//! waits for the first to finish. A turn is recorded only when the model
//! produced an answer, so a failed or cancelled `ask` leaves the history
//! exactly as it was.

use crate::config::RetrievalConfig;
use crate::extractor::EntityExtractor;
use crate::graph_retriever::GraphRetriever;
use crate::merger::ContextMerger;
use crate::ports::{CompletionOptions, EmbeddingService, GraphStore, LanguageModel, VectorIndex};
use crate::retry::call_with_retry;
use crate::vector_retriever::VectorRetriever;
use crate::{AgentError, Result};
use graphrag_core::{
    estimate_tokens, ConversationState, MergedContext, Outcome, RetrievalWarning, Turn,
};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, instrument, warn};

const QA_INSTRUCTIONS: &str = "Answer the question based only on the following context:";
const NO_CONTEXT_INSTRUCTIONS: &str = "No supporting context was found for this question. \
Answer from the conversation so far only, and state clearly that your confidence is reduced. \
If the conversation does not contain the answer, say that you do not know.";
const TRUNCATED_CONTEXT_INSTRUCTIONS: &str = "Relevant context was found but did not fit. \
Answer from the conversation so far and state that your confidence is reduced.";
const ANSWER_STYLE: &str = "Use natural language and be concise.";

const CONDENSE_TEMPLATE: &str = "Given the following conversation and a follow up question, \
rephrase the follow up question to be a standalone question, in its original language.";
const CONDENSE_MAX_TOKENS: usize = 128;

/// Where a session is in its question/answer cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    AwaitingAnswer,
}

/// The result of one `ask`
#[derive(Debug, Clone)]
pub struct Answer {
    /// The model's answer
    pub text: String,
    /// Soft failures hit while gathering evidence
    pub warnings: Vec<RetrievalWarning>,
    /// Evidence the answer was grounded on
    pub context: MergedContext,
    /// Rewritten question used for retrieval, when the follow-up was condensed
    pub standalone_question: Option<String>,
}

impl Answer {
    /// True when retrieval degraded or found nothing
    pub fn is_degraded(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Resets the phase to `Idle` however `ask` exits
struct PhaseGuard<'a> {
    phase: &'a Mutex<SessionPhase>,
}

impl<'a> PhaseGuard<'a> {
    fn enter(phase: &'a Mutex<SessionPhase>) -> Self {
        *lock(phase) = SessionPhase::AwaitingAnswer;
        Self { phase }
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        *lock(self.phase) = SessionPhase::Idle;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One conversational session over a knowledge graph and a chunk index
pub struct ConversationManager {
    extractor: EntityExtractor,
    graph: GraphRetriever,
    vector: VectorRetriever,
    merger: ContextMerger,
    llm: Arc<dyn LanguageModel>,
    config: RetrievalConfig,
    gate: tokio::sync::Mutex<()>,
    state: Mutex<ConversationState>,
    phase: Mutex<SessionPhase>,
}

impl ConversationManager {
    pub fn new(
        store: Arc<dyn GraphStore>,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingService>,
        llm: Arc<dyn LanguageModel>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            extractor: EntityExtractor::new(Arc::clone(&llm), config.clone()),
            graph: GraphRetriever::new(store, config.clone()),
            vector: VectorRetriever::new(embedder, index, config.clone()),
            merger: ContextMerger::new(config.dedup_threshold),
            state: Mutex::new(ConversationState::new(config.history_max_turns)),
            phase: Mutex::new(SessionPhase::Idle),
            gate: tokio::sync::Mutex::new(()),
            llm,
            config,
        }
    }

    pub fn extractor(&self) -> &EntityExtractor {
        &self.extractor
    }

    pub fn graph_retriever(&self) -> &GraphRetriever {
        &self.graph
    }

    pub fn vector_retriever(&self) -> &VectorRetriever {
        &self.vector
    }

    pub fn merger(&self) -> &ContextMerger {
        &self.merger
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    pub fn phase(&self) -> SessionPhase {
        *lock(&self.phase)
    }

    /// Recorded turns, oldest first
    pub fn history(&self) -> Vec<Turn> {
        lock(&self.state).snapshot()
    }

    /// Forget every recorded turn.
    ///
    /// An `ask` already in flight keeps the history it started with.
    pub fn clear_history(&self) {
        lock(&self.state).clear();
        info!("Conversation history cleared");
    }

    /// Answer `question` from retrieved evidence and the session history.
    ///
    /// Retrieval problems only add warnings to the answer; the only error is
    /// [`AgentError::ModelInvocationFailed`], in which case no turn is
    /// recorded.
    #[instrument(skip(self, question))]
    pub async fn ask(&self, question: &str) -> Result<Answer> {
        let _serialized = self.gate.lock().await;
        let _phase = PhaseGuard::enter(&self.phase);

        let history = self.history();
        let (history_text, budget) = self.fit_history(&history, question);

        let standalone_question = if self.config.condense_follow_ups && !history_text.is_empty() {
            self.condense(&history_text, question).await
        } else {
            None
        };
        let retrieval_question = standalone_question.as_deref().unwrap_or(question);

        let (context, warnings) = self.gather(retrieval_question, budget).await.into_parts();

        let prompt = build_prompt(&history_text, &context, question);
        debug!(
            "Prompt assembled: ~{} tokens ({} context)",
            estimate_tokens(&prompt),
            context.token_estimate
        );

        let options = CompletionOptions {
            temperature: self.config.temperature,
            max_tokens: self.config.answer_max_tokens,
        };
        let generated = call_with_retry(
            &self.config.retry,
            self.config.call_timeout,
            "answer generation",
            || self.llm.complete(&prompt, options),
        )
        .await
        .map_err(|e| match e {
            AgentError::ModelInvocationFailed(_) => e,
            other => AgentError::ModelInvocationFailed(other.to_string()),
        })?;

        let text = generated.trim().to_string();
        if text.is_empty() {
            return Err(AgentError::ModelInvocationFailed(
                "model returned an empty answer".into(),
            ));
        }

        lock(&self.state).push(Turn::new(question, text.clone(), context.clone()));
        info!(
            "Answered with {} facts and {} chunks ({} warnings)",
            context.facts.len(),
            context.chunks.len(),
            warnings.len()
        );

        Ok(Answer {
            text,
            warnings,
            context,
            standalone_question,
        })
    }

    /// The context `ask` would hand to the model, without calling it
    #[instrument(skip(self, question))]
    pub async fn context(&self, question: &str) -> Outcome<MergedContext> {
        let (_, budget) = self.fit_history(&self.history(), question);
        self.gather(question, budget).await
    }

    async fn gather(&self, question: &str, budget: usize) -> Outcome<MergedContext> {
        let (entities, mut warnings) = self.extractor.extract(question).await.into_parts();

        let (graph, vector) = tokio::join!(
            self.graph.retrieve_graph(
                &entities,
                self.config.graph_max_depth,
                self.config.graph_max_facts
            ),
            self.vector
                .retrieve_vector(question, self.config.vector_top_k),
        );
        let (facts, graph_warnings) = graph.into_parts();
        let (chunks, vector_warnings) = vector.into_parts();
        warnings.extend(graph_warnings);
        warnings.extend(vector_warnings);

        let context = self.merger.merge(&facts, &chunks, budget);
        warnings.extend(context.warnings());

        Outcome {
            value: context,
            warnings,
        }
    }

    /// Rendered history for the prompt and the token budget left for evidence.
    ///
    /// Oldest turns are left out of the prompt until history, question and
    /// instructions take at most half of the space the answer leaves free.
    /// The recorded history is not touched.
    fn fit_history(&self, history: &[Turn], question: &str) -> (String, usize) {
        let available = self
            .config
            .context_window_tokens
            .saturating_sub(self.config.answer_max_tokens);
        let no_context = MergedContext::empty();

        let mut start = 0;
        loop {
            let history_text = ConversationState::render(&history[start..]);
            let skeleton = estimate_tokens(&build_prompt(&history_text, &no_context, question));
            if skeleton <= available / 2 || start == history.len() {
                if start > 0 {
                    debug!("Left {} oldest turns out of the prompt", start);
                }
                return (history_text, available.saturating_sub(skeleton));
            }
            start += 1;
        }
    }

    async fn condense(&self, history_text: &str, question: &str) -> Option<String> {
        let prompt = format!(
            "{CONDENSE_TEMPLATE}\nChat History:\n{history_text}\nFollow Up Input: {question}\nStandalone question:"
        );
        let options = CompletionOptions {
            temperature: 0.0,
            max_tokens: CONDENSE_MAX_TOKENS,
        };

        match call_with_retry(
            &self.config.retry,
            self.config.call_timeout,
            "question condensation",
            || self.llm.complete(&prompt, options),
        )
        .await
        {
            Ok(rewritten) => {
                let rewritten = rewritten.trim();
                if rewritten.is_empty() {
                    None
                } else {
                    debug!("Condensed follow-up into: {}", rewritten);
                    Some(rewritten.to_string())
                }
            }
            Err(e) => {
                warn!("Could not condense follow-up, using it as asked: {}", e);
                None
            }
        }
    }
}

/// History, then evidence, then the question.
///
/// An empty context takes the longest instructions, so a prompt built
/// with evidence never costs more than the empty one plus the evidence.
pub fn build_prompt(history_text: &str, context: &MergedContext, question: &str) -> String {
    let mut prompt = String::new();
    if !history_text.is_empty() {
        prompt.push_str("Conversation so far:\n");
        prompt.push_str(history_text);
        prompt.push('\n');
    }

    if !context.rendered_text.is_empty() {
        prompt.push_str(QA_INSTRUCTIONS);
        prompt.push('\n');
        prompt.push_str(&context.rendered_text);
    } else if context.was_truncated() {
        prompt.push_str(TRUNCATED_CONTEXT_INSTRUCTIONS);
    } else {
        prompt.push_str(NO_CONTEXT_INSTRUCTIONS);
    }
    prompt.push_str("\n\n");

    prompt.push_str(&format!("Question: {question}\n{ANSWER_STYLE}\nAnswer:"));
    prompt
}
