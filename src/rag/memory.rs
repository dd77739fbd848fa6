use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationTurn {
    /// 1-based position in the conversation
    pub sequence: u64,
    pub question: String,
    pub answer: String,
    pub timestamp: DateTime<Utc>,
}

/// Append-only turn log of one session.
#[derive(Debug, Clone, Default)]
pub struct ConversationMemory {
    turns: Vec<ConversationTurn>,
    max_turns: Option<usize>,
}

impl ConversationMemory {
    pub fn new(max_turns: Option<usize>) -> Self {
        Self {
            turns: Vec::new(),
            max_turns,
        }
    }

    pub fn append(&mut self, question: impl Into<String>, answer: impl Into<String>) -> &ConversationTurn {
        let sequence = self.turns.len() as u64 + 1;
        self.turns.push(ConversationTurn {
            sequence,
            question: question.into(),
            answer: answer.into(),
            timestamp: Utc::now(),
        });
        &self.turns[self.turns.len() - 1]
    }

    /// The turns fed back into prompts, oldest first.
    pub fn recent(&self) -> &[ConversationTurn] {
        match self.max_turns {
            Some(n) if n < self.turns.len() => &self.turns[self.turns.len() - n..],
            _ => &self.turns,
        }
    }

    pub fn all(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbounded_memory_returns_every_turn_in_order() {
        let mut memory = ConversationMemory::new(None);
        memory.append("q1", "a1");
        memory.append("q2", "a2");
        memory.append("q3", "a3");

        let questions: Vec<&str> = memory.recent().iter().map(|t| t.question.as_str()).collect();
        assert_eq!(questions, vec!["q1", "q2", "q3"]);
        assert_eq!(memory.recent()[2].sequence, 3);
    }

    #[test]
    fn window_keeps_most_recent_turns() {
        let mut memory = ConversationMemory::new(Some(2));
        for i in 1..=4 {
            memory.append(format!("q{}", i), format!("a{}", i));
        }

        let recent: Vec<u64> = memory.recent().iter().map(|t| t.sequence).collect();
        assert_eq!(recent, vec![3, 4]);
        assert_eq!(memory.all().len(), 4);
    }

    #[test]
    fn zero_window_feeds_back_nothing() {
        let mut memory = ConversationMemory::new(Some(0));
        memory.append("q", "a");
        assert!(memory.recent().is_empty());
    }

    #[test]
    fn clear_restarts_numbering() {
        let mut memory = ConversationMemory::new(None);
        memory.append("q", "a");
        memory.clear();
        assert!(memory.is_empty());
        assert_eq!(memory.append("q", "a").sequence, 1);
    }
}
