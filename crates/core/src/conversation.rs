//! Conversation types - question/answer turns and the bounded session history

use crate::MergedContext;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

/// One question/answer exchange plus the evidence used to produce it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Turn {
    /// Unique identifier for this turn
    pub id: Uuid,

    /// The question as the user asked it
    pub question: String,

    /// The model's answer
    pub answer: String,

    /// Evidence the answer was grounded on
    pub context_used: MergedContext,

    /// When the answer was recorded
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    /// Create a new turn stamped with the current time
    pub fn new(
        question: impl Into<String>,
        answer: impl Into<String>,
        context_used: MergedContext,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            question: question.into(),
            answer: answer.into(),
            context_used,
            timestamp: Utc::now(),
        }
    }

    /// Render the turn as a `Human:`/`Assistant:` exchange
    pub fn render(&self) -> String {
        format!("Human: {}\nAssistant: {}\n", self.question, self.answer)
    }
}

/// Bounded, append-only turn history of a single session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationState {
    turns: VecDeque<Turn>,
    max_turns: usize,
}

impl ConversationState {
    /// Create an empty history keeping at most `max_turns` turns
    pub fn new(max_turns: usize) -> Self {
        Self {
            turns: VecDeque::with_capacity(max_turns.min(64)),
            max_turns,
        }
    }

    /// Append a turn, evicting the oldest ones once over capacity
    pub fn push(&mut self, turn: Turn) {
        self.turns.push_back(turn);
        while self.turns.len() > self.max_turns {
            self.turns.pop_front();
        }
    }

    /// Drop every turn
    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    /// Turns in chronological order
    pub fn turns(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }

    /// Owned copy of the current history
    pub fn snapshot(&self) -> Vec<Turn> {
        self.turns.iter().cloned().collect()
    }

    /// Render turns in chronological order for a prompt
    pub fn render(turns: &[Turn]) -> String {
        turns.iter().map(Turn::render).collect::<Vec<_>>().join("\n")
    }
}

impl Default for ConversationState {
    fn default() -> Self {
        // Same window the web UI kept: the last 5 exchanges
        Self::new(5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(n: usize) -> Turn {
        Turn::new(format!("q{n}"), format!("a{n}"), MergedContext::empty())
    }

    #[test]
    fn test_fifo_eviction() {
        let mut state = ConversationState::new(3);
        for n in 0..5 {
            state.push(turn(n));
        }

        assert_eq!(state.len(), 3);
        let questions: Vec<_> = state.turns().map(|t| t.question.clone()).collect();
        assert_eq!(questions, vec!["q2", "q3", "q4"]);
    }

    #[test]
    fn test_zero_capacity_keeps_nothing() {
        let mut state = ConversationState::new(0);
        state.push(turn(0));
        assert!(state.is_empty());
    }

    #[test]
    fn test_clear() {
        let mut state = ConversationState::default();
        state.push(turn(0));
        state.clear();
        assert!(state.is_empty());
        assert_eq!(state.max_turns(), 5);
    }

    #[test]
    fn test_render_history() {
        let turns = vec![turn(1), turn(2)];
        let rendered = ConversationState::render(&turns);
        assert_eq!(
            rendered,
            "Human: q1\nAssistant: a1\n\nHuman: q2\nAssistant: a2\n"
        );
    }
}
