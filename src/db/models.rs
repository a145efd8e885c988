use chrono::{DateTime, Utc};
use serde::Serialize;

/// A named set of chunk records sharing one embedding space.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionInfo {
    pub id: i64,
    pub name: String,
    pub model_name: String,
    pub dimensions: usize,
    pub created_at: DateTime<Utc>,
}

/// One chunk and its vector, written atomically as a single record.
#[derive(Debug, Clone)]
pub struct ChunkRecord<'a> {
    pub chunk_key: &'a str,
    pub page_number: u32,
    pub chunk_index: usize,
    pub content: &'a str,
    pub embedding: &'a [f32],
}

/// Summary of a collection's contents.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionStats {
    pub name: String,
    pub model_name: String,
    pub dimensions: usize,
    pub chunk_count: usize,
    pub page_count: usize,
}
