use serde::Serialize;

use crate::db::search::SearchResult;

/// Answer returned when retrieval finds nothing relevant.
pub const NO_CONTEXT_ANSWER: &str =
    "Sorry, I couldn't find relevant information to answer your question.";

/// A page the answer drew from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Source {
    pub page_number: u32,
    pub similarity_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResponse {
    pub answer: String,
    /// One entry per context chunk, in retrieval order.
    pub sources: Vec<Source>,
}

impl QueryResponse {
    /// Whether the answer came from the model rather than the no-context fallback.
    #[must_use]
    pub fn has_sources(&self) -> bool {
        !self.sources.is_empty()
    }
}

/// Pair a model answer with the results that were in its context.
pub fn format_response(answer: impl Into<String>, used: &[SearchResult]) -> QueryResponse {
    QueryResponse {
        answer: answer.into().trim().to_string(),
        sources: used
            .iter()
            .map(|r| Source {
                page_number: r.page_number,
                similarity_score: r.similarity_score,
            })
            .collect(),
    }
}

pub fn no_context_response() -> QueryResponse {
    QueryResponse {
        answer: NO_CONTEXT_ANSWER.to_string(),
        sources: Vec::new(),
    }
}
