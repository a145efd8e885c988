use std::sync::Arc;

use tokio::sync::Mutex as TokioMutex;
use tracing::debug;

use crate::db::Db;
use crate::db::models::CollectionInfo;
use crate::db::search::SearchResult;
use crate::embedder::Embedder;
use crate::error::RagError;

/// Query-time knobs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalConfig {
    pub top_k: usize,
    /// Results below this similarity are dropped. 0 keeps plain top-k.
    pub min_similarity: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            min_similarity: 0.25,
        }
    }
}

/// Reject queries that cannot be answered before doing any work.
pub fn validate_query(query: &str, k: usize) -> Result<(), RagError> {
    if query.trim().is_empty() {
        return Err(RagError::Validation("query must not be empty".to_string()));
    }
    if k == 0 {
        return Err(RagError::Validation("k must be at least 1".to_string()));
    }
    Ok(())
}

/// Finds the chunks of one collection closest to a query.
pub struct Retriever<'a, E: Embedder + ?Sized + 'static> {
    pub db: Arc<TokioMutex<Db>>,
    pub embedder: Arc<E>,
    pub collection: Option<&'a CollectionInfo>,
    pub min_similarity: f64,
}

impl<'a, E: Embedder + ?Sized + 'static> Retriever<'a, E> {
    /// Up to `k` results ordered by descending similarity, ties broken by
    /// page then position. A missing or empty collection yields no results.
    pub async fn similarity_search(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<SearchResult>, RagError> {
        validate_query(query, k)?;

        let Some(collection) = self.collection else {
            return Ok(Vec::new());
        };

        let embedder = Arc::clone(&self.embedder);
        let text = query.to_string();
        let query_vector = tokio::task::spawn_blocking(move || embedder.embed(&text))
            .await
            .map_err(|e| RagError::Embedding(format!("embedding task failed: {e}")))??;
        if query_vector.len() != collection.dimensions {
            return Err(RagError::Configuration(format!(
                "query vector has {} dimensions but collection '{}' stores {}",
                query_vector.len(),
                collection.name,
                collection.dimensions
            )));
        }

        let results = {
            let db = self.db.lock().await;
            db.search(collection, &query_vector, k)?
        };
        let found = results.len();

        let kept: Vec<SearchResult> = results
            .into_iter()
            .filter(|r| r.similarity_score >= self.min_similarity)
            .collect();
        debug!(
            "Retrieved {found} candidates, {} above similarity {}",
            kept.len(),
            self.min_similarity
        );
        Ok(kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::ChunkRecord;
    use crate::embedder::mock::MockEmbedder;

    async fn store(
        texts: &[(u32, &str)],
    ) -> (Arc<TokioMutex<Db>>, CollectionInfo, Arc<MockEmbedder>) {
        let embedder = Arc::new(MockEmbedder::new(1024));
        let mut db = Db::open_in_memory().unwrap();
        let collection = db
            .ensure_collection("docs", embedder.model_name(), 1024)
            .unwrap();

        let vectors: Vec<Vec<f32>> = texts
            .iter()
            .map(|(_, t)| embedder.embed(t).unwrap())
            .collect();
        let keys: Vec<String> = (0..texts.len()).map(|i| format!("k{i}")).collect();
        let records: Vec<ChunkRecord<'_>> = texts
            .iter()
            .zip(&vectors)
            .zip(&keys)
            .map(|(((page, text), vector), key)| ChunkRecord {
                chunk_key: key,
                page_number: *page,
                chunk_index: 0,
                content: text,
                embedding: vector,
            })
            .collect();
        db.insert_chunks(&collection, &records).unwrap();

        (Arc::new(TokioMutex::new(db)), collection, embedder)
    }

    #[tokio::test]
    async fn test_validation_errors() {
        let (db, collection, embedder) = store(&[(1, "anything")]).await;
        let retriever = Retriever {
            db,
            embedder: embedder.clone(),
            collection: Some(&collection),
            min_similarity: 0.0,
        };
        assert!(matches!(
            retriever.similarity_search("   ", 3).await,
            Err(RagError::Validation(_))
        ));
        assert!(matches!(
            retriever.similarity_search("refund", 0).await,
            Err(RagError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_collection_returns_nothing() {
        let embedder = Arc::new(MockEmbedder::new(1024));
        let db = Arc::new(TokioMutex::new(Db::open_in_memory().unwrap()));
        let retriever = Retriever {
            db: db.clone(),
            embedder: embedder.clone(),
            collection: None,
            min_similarity: 0.0,
        };
        assert!(retriever.similarity_search("refund", 5).await.unwrap().is_empty());

        let collection = db
            .lock()
            .await
            .ensure_collection("empty", embedder.model_name(), 1024)
            .unwrap();
        let retriever = Retriever {
            db,
            embedder: embedder.clone(),
            collection: Some(&collection),
            min_similarity: 0.0,
        };
        assert!(retriever.similarity_search("refund", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_most_similar_first_and_deterministic() {
        let (db, collection, embedder) = store(&[
            (1, "chocolate cake recipe with flour and sugar"),
            (2, "refund policy: customers may request a refund within thirty days"),
            (3, "shipping times for international orders"),
        ])
        .await;
        let retriever = Retriever {
            db,
            embedder: embedder.clone(),
            collection: Some(&collection),
            min_similarity: 0.0,
        };

        let first = retriever
            .similarity_search("what is the refund policy", 3)
            .await
            .unwrap();
        assert_eq!(first[0].page_number, 2);
        for pair in first.windows(2) {
            assert!(pair[0].similarity_score >= pair[1].similarity_score);
        }

        let second = retriever
            .similarity_search("what is the refund policy", 3)
            .await
            .unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_threshold_filters_unrelated() {
        let (db, collection, embedder) = store(&[
            (1, "chocolate cake recipe with flour and sugar"),
            (2, "refund policy: customers may request a refund within thirty days"),
        ])
        .await;
        let retriever = Retriever {
            db,
            embedder: embedder.clone(),
            collection: Some(&collection),
            min_similarity: 0.25,
        };
        let results = retriever
            .similarity_search("refund policy", 5)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].page_number, 2);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_configuration_error() {
        let (db, collection, _) = store(&[(1, "refund policy")]).await;
        let wrong = Arc::new(MockEmbedder::new(32));
        let retriever = Retriever {
            db,
            embedder: wrong,
            collection: Some(&collection),
            min_similarity: 0.0,
        };
        assert!(matches!(
            retriever.similarity_search("refund", 1).await,
            Err(RagError::Configuration(_))
        ));
    }
}
