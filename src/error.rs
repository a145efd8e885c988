/// Error taxonomy for the ingestion and query pipeline.
///
/// Every failure a caller may want to render differently gets its own
/// variant; nothing is folded into a catch-all.
use thiserror::Error;

use crate::embedder::EmbedderError;

#[derive(Error, Debug)]
pub enum RagError {
    /// Invalid parameters, missing credentials, or an embedder that does not
    /// match the collection it is pointed at.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A chunk or query could not be turned into a vector.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// The vector store rejected a write or failed a read. `committed` is the
    /// number of chunks that were durably written before the failure.
    #[error("storage error ({committed} chunks committed): {message}")]
    Storage { committed: usize, message: String },

    /// Malformed query input.
    #[error("invalid query: {0}")]
    Validation(String),

    /// The language model call failed for good.
    #[error("generation failed after {attempts} attempt(s): {message}")]
    Generation {
        retryable: bool,
        attempts: u32,
        message: String,
    },

    /// The PDF could not be opened or parsed.
    #[error("pdf extraction failed: {0}")]
    Pdf(String),
}

impl RagError {
    pub(crate) fn storage(committed: usize, err: impl std::fmt::Display) -> Self {
        Self::Storage {
            committed,
            message: err.to_string(),
        }
    }

    /// Whether repeating the same call later may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Generation {
                retryable: true,
                ..
            }
        )
    }
}

impl From<EmbedderError> for RagError {
    fn from(err: EmbedderError) -> Self {
        Self::Embedding(err.to_string())
    }
}

impl From<rusqlite::Error> for RagError {
    fn from(err: rusqlite::Error) -> Self {
        Self::storage(0, err)
    }
}
