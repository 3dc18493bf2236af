
use serde::Serialize;
use std::collections::VecDeque;

use crate::embeddings::truncate_text;

const QUESTION_PREVIEW_CHARS: usize = 100;
const SQL_PREVIEW_CHARS: usize = 150;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationTurn {
    pub question: String,
    pub sql: String,
    /// Result text cut to the configured preview length
    pub result: String,
}

/// The most recent successful turns, oldest first
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    turns: VecDeque<ConversationTurn>,
    capacity: usize,
    preview_chars: usize,
}

impl ConversationHistory {
    #[inline]
    pub fn new(capacity: usize, preview_chars: usize) -> Self {
        Self {
            turns: VecDeque::with_capacity(capacity),
            capacity,
            preview_chars,
        }
    }

    #[inline]
    pub fn record(&mut self, question: &str, sql: &str, result: &str) {
        if self.capacity == 0 {
            return;
        }
        while self.turns.len() >= self.capacity {
            self.turns.pop_front();
        }
        self.turns.push_back(ConversationTurn {
            question: question.to_string(),
            sql: sql.to_string(),
            result: truncate_text(result, self.preview_chars).to_string(),
        });
    }

    #[inline]
    pub fn turns(&self) -> impl Iterator<Item = &ConversationTurn> {
        self.turns.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    #[inline]
    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// Compact prompt form; empty when there is no history
    #[inline]
    pub fn render(&self) -> String {
        self.turns
            .iter()
            .map(|turn| {
                format!(
                    "User: {}\nAssistant SQL: {}",
                    truncate_text(&turn.question, QUESTION_PREVIEW_CHARS),
                    truncate_text(&turn.sql, SQL_PREVIEW_CHARS)
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
