//! PDF text extraction, chunking, and the ingestion path into the vector store.
pub mod chunker;
pub mod core;
pub mod pdf;

pub use self::chunker::{Chunk, ChunkingConfig, create_chunks};
pub use self::core::{IngestResult, Indexer};
pub use self::pdf::{Page, extract_pages};
