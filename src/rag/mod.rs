//! Query side of the pipeline: retrieval, prompt assembly, generation and
//! response formatting, tied together by [`pipeline::RagEngine`].
pub mod llm;
pub mod pipeline;
pub mod prompt;
pub mod response;
pub mod retriever;

pub use self::pipeline::RagEngine;
pub use self::response::{QueryResponse, Source};
