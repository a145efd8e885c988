use crate::db::Db;
use crate::db::models::{ChunkRecord, CollectionInfo};
use crate::embedder::Embedder;
use crate::error::RagError;
use crate::indexer::chunker::{Chunk, ChunkingConfig, create_chunks};
use crate::indexer::pdf::Page;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex as TokioMutex;
use tracing::{debug, info, warn};

pub const DEFAULT_BATCH_SIZE: usize = 25;

/// Outcome of one ingestion call.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct IngestResult {
    /// Chunks newly written to the collection.
    pub count_added: usize,
    /// Chunks that could not be embedded and were left out.
    pub count_skipped: usize,
    /// Chunks already present in the collection (same page, position and text).
    pub count_duplicate: usize,
}

/// Stable identity of a chunk within a collection.
#[must_use]
pub fn chunk_key(chunk: &Chunk) -> String {
    let mut hasher = Sha256::new();
    hasher.update(chunk.page_number.to_le_bytes());
    hasher.update((chunk.chunk_index as u64).to_le_bytes());
    hasher.update(chunk.text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Writes chunks and their embeddings into one collection.
///
/// Embedding runs on the blocking pool; model inference is CPU-bound.
pub struct Indexer<'a, E: Embedder + ?Sized + 'static> {
    pub db: Arc<TokioMutex<Db>>,
    pub embedder: Arc<E>,
    pub collection: &'a CollectionInfo,
    pub batch_size: usize,
}

impl<'a, E: Embedder + ?Sized + 'static> Indexer<'a, E> {
    pub fn new(
        db: Arc<TokioMutex<Db>>,
        embedder: Arc<E>,
        collection: &'a CollectionInfo,
        batch_size: usize,
    ) -> Result<Self, RagError> {
        if batch_size == 0 {
            return Err(RagError::Configuration(
                "batch_size must be positive".to_string(),
            ));
        }
        Ok(Self {
            db,
            embedder,
            collection,
            batch_size,
        })
    }

    /// Chunks the pages and adds the chunks to the collection.
    pub async fn ingest_pages(
        &self,
        pages: &[Page],
        chunking: &ChunkingConfig,
    ) -> Result<IngestResult, RagError> {
        let chunks = create_chunks(pages, chunking);
        info!(
            "Created {} chunks from {} pages (size {}, overlap {})",
            chunks.len(),
            pages.len(),
            chunking.chunk_size(),
            chunking.overlap()
        );
        self.add_documents(&chunks).await
    }

    /// Embeds and stores chunks batch by batch.
    ///
    /// Chunks already stored are counted as duplicates and not embedded
    /// again. Chunks the embedder rejects are skipped. A write the store
    /// rejects ends the call; batches committed before it stay committed.
    pub async fn add_documents(&self, chunks: &[Chunk]) -> Result<IngestResult, RagError> {
        let mut result = IngestResult::default();
        let mut seen: HashSet<String> = HashSet::new();

        for (batch_no, batch) in chunks.chunks(self.batch_size).enumerate() {
            let keyed: Vec<(String, &Chunk)> = batch.iter().map(|c| (chunk_key(c), c)).collect();

            let stored = {
                let key_refs: Vec<&str> = keyed.iter().map(|(k, _)| k.as_str()).collect();
                let db = self.db.lock().await;
                db.existing_chunk_keys(self.collection, &key_refs)
                    .map_err(|e| RagError::storage(result.count_added, e))?
            };

            let mut fresh: Vec<(String, &Chunk)> = Vec::with_capacity(keyed.len());
            for (key, chunk) in keyed {
                if stored.contains(&key) || !seen.insert(key.clone()) {
                    result.count_duplicate += 1;
                } else {
                    fresh.push((key, chunk));
                }
            }
            if fresh.is_empty() {
                continue;
            }

            let texts: Vec<String> = fresh.iter().map(|(_, c)| c.text.clone()).collect();
            let vectors = self.embed_batch_lenient(texts).await?;

            let records: Vec<ChunkRecord<'_>> = fresh
                .iter()
                .zip(&vectors)
                .filter_map(|((key, chunk), vector)| {
                    vector.as_ref().map(|embedding| ChunkRecord {
                        chunk_key: key,
                        page_number: chunk.page_number,
                        chunk_index: chunk.chunk_index,
                        content: &chunk.text,
                        embedding,
                    })
                })
                .collect();
            result.count_skipped += fresh.len() - records.len();

            if records.is_empty() {
                continue;
            }

            let written = {
                let mut db = self.db.lock().await;
                db.insert_chunks(self.collection, &records)
                    .map_err(|e| RagError::storage(result.count_added, e))?
            };
            result.count_added += written;
            debug!(
                batch = batch_no,
                written,
                total = result.count_added,
                "batch committed"
            );
        }

        info!(
            "Ingestion finished: {} added, {} skipped, {} duplicate",
            result.count_added, result.count_skipped, result.count_duplicate
        );
        Ok(result)
    }

    async fn embed_batch_lenient(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Option<Vec<f32>>>, RagError> {
        let embedder = Arc::clone(&self.embedder);
        tokio::task::spawn_blocking(move || {
            let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
            embed_lenient(&*embedder, &refs)
        })
        .await
        .map_err(|e| RagError::Embedding(format!("embedding task failed: {e}")))
    }
}

/// Embeds a batch in one call, falling back to one call per text when the
/// batch fails so a single bad chunk does not sink its neighbours. The output
/// is aligned with `texts`.
fn embed_lenient<E: Embedder + ?Sized>(embedder: &E, texts: &[&str]) -> Vec<Option<Vec<f32>>> {
    match embedder.embed_batch(texts) {
        Ok(vectors) if vectors.len() == texts.len() => vectors.into_iter().map(Some).collect(),
        Ok(vectors) => {
            warn!(
                "Embedder returned {} vectors for {} texts; retrying one by one",
                vectors.len(),
                texts.len()
            );
            embed_each(embedder, texts)
        }
        Err(e) => {
            debug!("Batch embedding failed ({e}); retrying one by one");
            embed_each(embedder, texts)
        }
    }
}

fn embed_each<E: Embedder + ?Sized>(embedder: &E, texts: &[&str]) -> Vec<Option<Vec<f32>>> {
    texts
        .iter()
        .map(|text| match embedder.embed(text) {
            Ok(vector) => Some(vector),
            Err(e) => {
                let err = RagError::from(e);
                warn!("Skipping chunk: {err}");
                None
            }
        })
        .collect()
}
