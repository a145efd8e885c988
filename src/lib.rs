//! # pdfqa — question answering over PDF documents
//!
//! Extracts the text of a PDF page by page, splits it into overlapping chunks,
//! embeds them into a local SQLite vector store, and answers questions by
//! handing the closest chunks to a hosted language model. Every answer comes
//! back with the page numbers and similarity scores of its sources.
//!
//! ## Architecture
//!
//! - **[`config`]** — Configuration loading, validation and defaults
//! - **[`error`]** — The [`error::RagError`] taxonomy shared by every stage
//! - **[`indexer`]** — PDF text extraction, chunking, and batched ingestion
//! - **[`embedder`]** — Text embedding via ONNX Runtime (all-MiniLM-L6-v2) or a deterministic mock
//! - **[`db`]** — SQLite + sqlite-vec vector store (collections, chunks, cosine search)
//! - **[`rag`]** — Retrieval, prompt assembly, LLM client with retries, response formatting
//! - **[`session`]** — Caller-owned chat history
//! - **[`mcp`]** — MCP server exposing ingest / ask / clear / stats (stdio transport via rmcp)

pub mod config;
pub mod db;
pub mod embedder;
pub mod error;
pub mod indexer;
pub mod mcp;
pub mod rag;
pub mod session;
