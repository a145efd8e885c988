/// Caller-owned conversation history for interactive front ends.
///
/// The pipeline itself is stateless; a chat loop records each exchange here
/// so it can redisplay the transcript with sources.
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::rag::{QueryResponse, Source};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    /// Empty for user turns and for no-context answers.
    pub sources: Vec<Source>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct ChatSession {
    turns: Vec<ConversationTurn>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user(&mut self, question: impl Into<String>) {
        self.turns.push(ConversationTurn {
            role: Role::User,
            content: question.into(),
            sources: Vec::new(),
            timestamp: Utc::now(),
        });
    }

    pub fn push_assistant(&mut self, response: &QueryResponse) {
        self.turns.push(ConversationTurn {
            role: Role::Assistant,
            content: response.answer.clone(),
            sources: response.sources.clone(),
            timestamp: Utc::now(),
        });
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Forget the whole conversation.
    pub fn reset(&mut self) {
        self.turns.clear();
    }
}

/// Render sources the way the chat front ends show them.
#[must_use]
pub fn format_sources(sources: &[Source]) -> String {
    sources
        .iter()
        .map(|s| format!("Page {} (similarity {:.2})", s.page_number, s.similarity_score))
        .collect::<Vec<_>>()
        .join(", ")
}
