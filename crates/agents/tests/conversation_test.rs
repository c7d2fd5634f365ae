//! Conversation manager tests: turn recording, failures, concurrency

mod common;

use common::*;
use graphrag_agents::{AgentError, ConversationManager, SessionPhase};
use graphrag_core::{estimate_tokens, GraphFact, RetrievalWarning};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn curie_manager(llm: Arc<FakeLlm>) -> ConversationManager {
    manager(
        FakeGraphStore::new().with_facts(
            "Marie Curie",
            vec![GraphFact::new("Marie Curie", "discovered", "Radium")],
        ),
        FakeVectorIndex::new().with_chunk("c1", "Marie Curie won two Nobel Prizes", 0.9),
        llm,
        test_config().with_condense_follow_ups(false),
    )
}

#[tokio::test]
async fn test_ask_records_turn_with_context() {
    let llm = Arc::new(FakeLlm::new().with_entities(marie_curie_entities()));
    let session = curie_manager(llm.clone());

    let answer = session.ask("What did Marie Curie discover?").await.unwrap();

    assert_eq!(answer.text, "answer 1");
    assert!(answer.warnings.is_empty());
    assert_eq!(answer.context.facts.len(), 1);
    assert_eq!(answer.context.chunks.len(), 1);

    let history = session.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].question, "What did Marie Curie discover?");
    assert_eq!(history[0].context_used, answer.context);
    assert_eq!(session.phase(), SessionPhase::Idle);

    let prompt = &llm.answer_prompts()[0];
    assert!(prompt.contains("Marie Curie discovered Radium"));
    assert!(prompt.contains("#Document Marie Curie won two Nobel Prizes"));
}

#[tokio::test]
async fn test_graph_outage_still_answers_from_chunks() {
    let llm = Arc::new(FakeLlm::new().with_entities(marie_curie_entities()));
    let session = manager(
        FakeGraphStore::failing(),
        FakeVectorIndex::new().with_chunk("c1", "Marie Curie won two Nobel Prizes", 0.9),
        llm,
        test_config(),
    );

    let answer = session.ask("What did Marie Curie win?").await.unwrap();

    assert_eq!(answer.text, "answer 1");
    assert!(answer.context.facts.is_empty());
    assert_eq!(answer.context.chunks.len(), 1);
    assert!(answer
        .warnings
        .contains(&RetrievalWarning::GraphUnavailable { failed: 1 }));
}

#[tokio::test]
async fn test_no_evidence_answers_from_history_with_warning() {
    let llm = Arc::new(FakeLlm::new());
    let session = manager(
        FakeGraphStore::new(),
        FakeVectorIndex::failing(),
        llm.clone(),
        test_config(),
    );

    let answer = session.ask("Anything?").await.unwrap();

    assert!(answer.context.is_empty());
    assert!(answer.warnings.contains(&RetrievalWarning::ContextEmpty));
    assert!(answer
        .warnings
        .iter()
        .any(|w| matches!(w, RetrievalWarning::VectorUnavailable { .. })));
    assert!(llm.answer_prompts()[0].contains("confidence is reduced"));
}

#[tokio::test]
async fn test_model_failure_records_no_turn() {
    let llm = Arc::new(FakeLlm::new().with_entities(marie_curie_entities()));
    let session = curie_manager(llm.clone());
    session.ask("First question").await.unwrap();

    llm.fail_answers.store(true, Ordering::SeqCst);
    let err = session.ask("Second question").await.unwrap_err();

    assert!(matches!(err, AgentError::ModelInvocationFailed(_)));
    assert_eq!(session.history().len(), 1);
    assert_eq!(session.phase(), SessionPhase::Idle);
}

#[tokio::test]
async fn test_empty_model_answer_is_a_failure() {
    let llm = Arc::new(FakeLlm::new());
    llm.empty_answers.store(true, Ordering::SeqCst);
    let session = curie_manager(llm);

    let err = session.ask("Who?").await.unwrap_err();

    assert!(matches!(err, AgentError::ModelInvocationFailed(_)));
    assert!(session.history().is_empty());
}

#[tokio::test]
async fn test_model_timeout_is_a_failure() {
    let llm = Arc::new(FakeLlm::new().with_answer_delay(Duration::from_secs(5)));
    let session = manager(
        FakeGraphStore::new(),
        FakeVectorIndex::new(),
        llm,
        test_config().with_call_timeout(Duration::from_millis(50)),
    );

    let err = session.ask("Slow question").await.unwrap_err();

    assert!(matches!(err, AgentError::ModelInvocationFailed(_)));
    assert!(session.history().is_empty());
    assert_eq!(session.phase(), SessionPhase::Idle);
}

#[tokio::test]
async fn test_history_keeps_most_recent_turns() {
    let llm = Arc::new(FakeLlm::new());
    let session = manager(
        FakeGraphStore::new(),
        FakeVectorIndex::new(),
        llm,
        test_config()
            .with_history_max_turns(3)
            .with_condense_follow_ups(false),
    );

    for i in 1..=5 {
        session.ask(&format!("question {i}")).await.unwrap();
        assert_eq!(session.history().len(), i.min(3));
    }

    let questions: Vec<_> = session
        .history()
        .into_iter()
        .map(|turn| turn.question)
        .collect();
    assert_eq!(questions, vec!["question 3", "question 4", "question 5"]);
}

#[tokio::test]
async fn test_history_appears_in_later_prompts() {
    let llm = Arc::new(FakeLlm::new());
    let session = manager(
        FakeGraphStore::new(),
        FakeVectorIndex::new(),
        llm.clone(),
        test_config().with_condense_follow_ups(false),
    );

    session.ask("Who was Marie Curie?").await.unwrap();
    session.ask("What did she discover?").await.unwrap();

    let prompts = llm.answer_prompts();
    assert!(!prompts[0].contains("Human:"));
    let second = &prompts[1];
    let earlier = second.find("Human: Who was Marie Curie?").unwrap();
    let current = second.find("Question: What did she discover?").unwrap();
    assert!(earlier < current);
}

#[tokio::test]
async fn test_long_history_leaves_room_for_evidence() {
    let llm = Arc::new(FakeLlm::new().with_entities(marie_curie_entities()));
    let session = manager(
        FakeGraphStore::new().with_facts(
            "Marie Curie",
            vec![GraphFact::new("Marie Curie", "discovered", "Radium")],
        ),
        FakeVectorIndex::new().with_chunk("c1", "Marie Curie won two Nobel Prizes", 0.9),
        llm.clone(),
        test_config()
            .with_condense_follow_ups(false)
            .with_token_limits(700, 100),
    );

    let rambling = vec!["word"; 300].join(" ");
    session.ask(&rambling).await.unwrap();
    let answer = session.ask("What did Marie Curie discover?").await.unwrap();

    assert_eq!(answer.context.facts.len(), 1);
    assert_eq!(answer.context.chunks.len(), 1);
    assert!(!answer.warnings.contains(&RetrievalWarning::ContextEmpty));
    assert!(!answer
        .warnings
        .iter()
        .any(|w| matches!(w, RetrievalWarning::BudgetExceeded { .. })));

    let prompt = &llm.answer_prompts()[1];
    assert!(prompt.contains("Marie Curie discovered Radium"));
    assert!(!prompt.contains("No supporting context"));
    assert!(!prompt.contains("Human:"));
    assert!(estimate_tokens(prompt) + 100 <= 700);

    // Only the prompt is trimmed, never the recorded history
    assert_eq!(session.history().len(), 2);
}

#[tokio::test]
async fn test_follow_up_is_condensed_for_retrieval() {
    let llm = Arc::new(
        FakeLlm::new()
            .with_entities(marie_curie_entities())
            .with_condensed("What did Marie Curie discover?"),
    );
    let session = manager(
        FakeGraphStore::new(),
        FakeVectorIndex::new(),
        llm,
        test_config(),
    );

    let first = session.ask("Who was Marie Curie?").await.unwrap();
    assert_eq!(first.standalone_question, None);

    let second = session.ask("What did she discover?").await.unwrap();
    assert_eq!(
        second.standalone_question.as_deref(),
        Some("What did Marie Curie discover?")
    );
    assert_eq!(session.history()[1].question, "What did she discover?");
}

#[tokio::test]
async fn test_clear_history() {
    let session = curie_manager(Arc::new(FakeLlm::new()));
    session.ask("One").await.unwrap();
    session.ask("Two").await.unwrap();

    session.clear_history();

    assert!(session.history().is_empty());
    assert_eq!(session.phase(), SessionPhase::Idle);
}

#[tokio::test]
async fn test_concurrent_asks_are_serialized() {
    let llm = Arc::new(FakeLlm::new().with_answer_delay(Duration::from_millis(30)));
    let session = Arc::new(manager(
        FakeGraphStore::new(),
        FakeVectorIndex::new(),
        llm,
        test_config().with_condense_follow_ups(false),
    ));

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.ask(&format!("question {i}")).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let history = session.history();
    assert_eq!(history.len(), 4);

    // Answers are numbered in model-call order; recorded order must match it
    let answers: Vec<_> = history.iter().map(|t| t.answer.clone()).collect();
    assert_eq!(answers, vec!["answer 1", "answer 2", "answer 3", "answer 4"]);

    let mut ids: Vec<_> = history.iter().map(|t| t.id).collect();
    ids.dedup();
    assert_eq!(ids.len(), 4);
    assert!(history.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
}

#[tokio::test]
async fn test_cancelled_ask_leaves_no_turn() {
    let llm = Arc::new(FakeLlm::new().with_answer_delay(Duration::from_secs(5)));
    let session = manager(
        FakeGraphStore::new(),
        FakeVectorIndex::new(),
        llm,
        test_config().with_call_timeout(Duration::from_secs(10)),
    );

    let cancelled = tokio::time::timeout(Duration::from_millis(50), session.ask("Never answered")).await;

    assert!(cancelled.is_err());
    assert!(session.history().is_empty());
    assert_eq!(session.phase(), SessionPhase::Idle);
}

#[tokio::test]
async fn test_phase_is_awaiting_answer_while_in_flight() {
    let llm = Arc::new(FakeLlm::new().with_answer_delay(Duration::from_millis(200)));
    let session = Arc::new(manager(
        FakeGraphStore::new(),
        FakeVectorIndex::new(),
        llm,
        test_config(),
    ));

    let in_flight = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.ask("Slow").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(session.phase(), SessionPhase::AwaitingAnswer);

    in_flight.await.unwrap().unwrap();
    assert_eq!(session.phase(), SessionPhase::Idle);
}

#[tokio::test]
async fn test_context_inspection_makes_no_answer_call() {
    let llm = Arc::new(FakeLlm::new().with_entities(marie_curie_entities()));
    let session = curie_manager(llm.clone());

    let outcome = session.context("What did Marie Curie discover?").await;

    assert_eq!(outcome.value.facts.len(), 1);
    assert!(llm.answer_prompts().is_empty());
    assert!(session.history().is_empty());
}
