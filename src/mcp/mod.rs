//! Model Context Protocol surface over [`crate::rag::RagEngine`].
pub mod server;
pub mod tools;
