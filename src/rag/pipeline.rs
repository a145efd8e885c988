use std::path::Path;
use std::sync::Arc;

use tokio::sync::Mutex as TokioMutex;
use tracing::{debug, info, warn};

use super::llm::LlmClient;
use super::prompt::build_prompt;
use super::response::{QueryResponse, format_response, no_context_response};
use super::retriever::{RetrievalConfig, Retriever, validate_query};
use crate::config::Config;
use crate::db::Db;
use crate::db::models::{CollectionInfo, CollectionStats};
use crate::embedder::Embedder;
use crate::error::RagError;
use crate::indexer::chunker::ChunkingConfig;
use crate::indexer::core::{IngestResult, Indexer};
use crate::indexer::pdf::{Page, extract_pages, extract_pages_from_bytes};

/// Ingest and query façade over one collection.
///
/// Holds no conversation state; callers keep their own history.
pub struct RagEngine {
    db: Arc<TokioMutex<Db>>,
    embedder: Arc<dyn Embedder>,
    llm: Option<LlmClient>,
    collection: String,
    chunking: ChunkingConfig,
    retrieval: RetrievalConfig,
    batch_size: usize,
    max_context_chars: usize,
}

impl RagEngine {
    /// Validate the configuration and bind an embedder to the configured collection.
    ///
    /// The engine cannot answer questions until a model client is attached with
    /// [`RagEngine::with_llm`]; ingestion, clearing and stats work without one.
    pub fn new(
        config: &Config,
        db: Arc<TokioMutex<Db>>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, RagError> {
        config.validate()?;
        Ok(Self {
            db,
            embedder,
            llm: None,
            collection: config.collection.clone(),
            chunking: ChunkingConfig::new(config.chunk_size, config.chunk_overlap)?,
            retrieval: RetrievalConfig {
                top_k: config.search_top_k,
                min_similarity: config.min_similarity,
            },
            batch_size: config.batch_size,
            max_context_chars: config.max_context_chars,
        })
    }

    #[must_use]
    pub fn with_llm(mut self, llm: LlmClient) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn collection_name(&self) -> &str {
        &self.collection
    }

    /// Default number of results per query.
    pub fn default_top_k(&self) -> usize {
        self.retrieval.top_k
    }

    /// Existing collection, checked against the engine's embedder.
    async fn open_collection(&self) -> Result<Option<CollectionInfo>, RagError> {
        let found = self.db.lock().await.find_collection(&self.collection)?;
        match found {
            Some(info) => {
                self.check_embedding_space(&info)?;
                Ok(Some(info))
            }
            None => Ok(None),
        }
    }

    async fn open_or_create_collection(&self) -> Result<CollectionInfo, RagError> {
        let info = self.db.lock().await.ensure_collection(
            &self.collection,
            self.embedder.model_name(),
            self.embedder.dimensions(),
        )?;
        self.check_embedding_space(&info)?;
        Ok(info)
    }

    fn check_embedding_space(&self, info: &CollectionInfo) -> Result<(), RagError> {
        if info.model_name != self.embedder.model_name()
            || info.dimensions != self.embedder.dimensions()
        {
            return Err(RagError::Configuration(format!(
                "collection '{}' was built with {} ({} dims) but the embedder is {} ({} dims); clear it or use another collection",
                info.name,
                info.model_name,
                info.dimensions,
                self.embedder.model_name(),
                self.embedder.dimensions()
            )));
        }
        Ok(())
    }

    /// Chunk, embed and store already extracted pages.
    pub async fn ingest(&self, pages: &[Page]) -> Result<IngestResult, RagError> {
        let collection = self.open_or_create_collection().await?;
        let indexer = Indexer::new(
            self.db.clone(),
            self.embedder.clone(),
            &collection,
            self.batch_size,
        )?;
        indexer.ingest_pages(pages, &self.chunking).await
    }

    /// Extract a PDF and ingest its pages.
    pub async fn ingest_pdf<P: AsRef<Path>>(&self, path: P) -> Result<IngestResult, RagError> {
        let path = path.as_ref().to_path_buf();
        let pages = tokio::task::spawn_blocking(move || extract_pages(&path))
            .await
            .map_err(|e| RagError::Pdf(format!("extraction task failed: {e}")))??;
        self.ingest(&pages).await
    }

    /// Ingest a PDF held in memory, such as an upload.
    pub async fn ingest_pdf_bytes(&self, bytes: Vec<u8>) -> Result<IngestResult, RagError> {
        let pages = tokio::task::spawn_blocking(move || extract_pages_from_bytes(&bytes))
            .await
            .map_err(|e| RagError::Pdf(format!("extraction task failed: {e}")))??;
        self.ingest(&pages).await
    }

    /// Answer a question from the stored chunks.
    ///
    /// When nothing relevant is found the fixed no-context answer is returned
    /// without calling the model.
    pub async fn query(&self, question: &str, k: usize) -> Result<QueryResponse, RagError> {
        validate_query(question, k)?;
        debug!("Retrieving context for query (k={k})");

        let collection = self.open_collection().await?;
        let retriever = Retriever {
            db: self.db.clone(),
            embedder: self.embedder.clone(),
            collection: collection.as_ref(),
            min_similarity: self.retrieval.min_similarity,
        };
        let results = retriever.similarity_search(question, k).await?;

        if results.is_empty() {
            info!("No relevant context found; answering without the model");
            return Ok(no_context_response());
        }

        let assembled = build_prompt(question, &results, self.max_context_chars);
        if assembled.used == 0 {
            warn!("No retrieved chunk fits in {} characters", self.max_context_chars);
            return Ok(no_context_response());
        }
        info!(
            "Context found: {} of {} chunks, pages {:?}",
            assembled.used,
            results.len(),
            results[..assembled.used]
                .iter()
                .map(|r| r.page_number)
                .collect::<Vec<_>>()
        );

        let llm = self.llm.as_ref().ok_or_else(|| {
            RagError::Configuration("no language model configured for answering".to_string())
        })?;
        let generation = llm.generate_response(&assembled.prompt).await?;
        debug!("Generation took {:.0} ms", generation.raw_latency_ms);

        Ok(format_response(
            generation.answer,
            &results[..assembled.used],
        ))
    }

    /// Remove every chunk of the collection. Clearing an absent collection is a no-op.
    pub async fn clear(&self) -> Result<usize, RagError> {
        let removed = self.db.lock().await.clear_collection(&self.collection)?;
        info!("Cleared {removed} chunks from '{}'", self.collection);
        Ok(removed)
    }

    /// Summary of the collection, or `None` if nothing was ever ingested.
    pub async fn stats(&self) -> Result<Option<CollectionStats>, RagError> {
        let db = self.db.lock().await;
        match db.find_collection(&self.collection)? {
            Some(info) => Ok(Some(db.collection_stats(&info)?)),
            None => Ok(None),
        }
    }
}
