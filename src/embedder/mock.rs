/// Mock embedder for testing and offline use.
///
/// Hashes each distinct lowercase content word into one of `dimensions`
/// buckets, so texts sharing vocabulary land close together under cosine
/// distance while unrelated texts stay near orthogonal. Function words and
/// tokens shorter than three characters are ignored unless nothing else is
/// left.
use std::collections::HashSet;
use std::hash::{DefaultHasher, Hash, Hasher};

use super::{Embedder, EmbedderError, l2_normalize};

const STOPWORDS: &[&str] = &[
    "about", "all", "and", "any", "are", "been", "but", "can", "could", "did", "does", "for",
    "from", "had", "has", "have", "her", "him", "his", "how", "into", "its", "not", "our",
    "she", "should", "than", "that", "the", "their", "them", "then", "there", "these", "they",
    "this", "those", "was", "were", "what", "when", "where", "which", "who", "why", "will",
    "with", "would", "you", "your",
];

fn is_content_word(word: &str) -> bool {
    word.chars().count() > 2 && !STOPWORDS.contains(&word)
}

/// A deterministic bag-of-words embedder.
pub struct MockEmbedder {
    pub dimensions: usize,
}

impl MockEmbedder {
    /// Create a new `MockEmbedder` with the given dimensionality.
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn bucket(&self, word: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        word.hash(&mut hasher);
        (hasher.finish() % self.dimensions as u64) as usize
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self { dimensions: 384 }
    }
}

impl Embedder for MockEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        let all: HashSet<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .collect();

        let content: HashSet<String> = all
            .iter()
            .filter(|w| is_content_word(w))
            .cloned()
            .collect();
        let words = if content.is_empty() { all } else { content };
        if words.is_empty() {
            return Err(EmbedderError::EmptyInput);
        }

        let mut embedding = vec![0.0f32; self.dimensions];
        for word in &words {
            embedding[self.bucket(word)] += 1.0;
        }

        l2_normalize(&mut embedding);
        Ok(embedding)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        "mock-bag-of-words"
    }
}
