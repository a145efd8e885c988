/// MCP Tool handlers for pdfqa.
///
/// 1. ingest_pdf        – extract, chunk, embed and store a PDF
/// 2. ask               – answer a question from the stored chunks
/// 3. clear_collection  – drop every stored chunk
/// 4. collection_stats  – chunk and page counts
use crate::error::RagError;
use crate::mcp::server::McpContext;
use rmcp::handler::server::ServerHandler;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::{ErrorData as McpError, handler::server::tool::ToolRouter, model::*, tool, tool_router};
use schemars::JsonSchema;
use serde::Deserialize;
use std::path::Path;

// ── Parameter structs ────────────────────────────────────────────────

#[derive(Deserialize, JsonSchema)]
struct IngestParams {
    /// Path to the PDF file
    filepath: String,
    /// Clear the collection before ingesting (default: false)
    clear: Option<bool>,
}

#[derive(Deserialize, JsonSchema)]
struct AskParams {
    /// Question about the ingested document
    question: String,
    /// Number of chunks to retrieve (default from config)
    top_k: Option<usize>,
}

// ── Response helpers ─────────────────────────────────────────────────

fn json_result(value: serde_json::Value) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::success(vec![Content::text(
        serde_json::to_string_pretty(&value).unwrap_or_default(),
    )]))
}

fn error_result(msg: &str) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::error(vec![Content::text(msg.to_string())]))
}

/// Caller mistakes go back as tool errors; everything else is internal.
fn rag_error(err: RagError) -> Result<CallToolResult, McpError> {
    match err {
        RagError::Validation(_) | RagError::Pdf(_) | RagError::Configuration(_) => {
            error_result(&err.to_string())
        }
        RagError::Generation { retryable, .. } => Err(McpError::internal_error(
            err.to_string(),
            Some(serde_json::json!({ "retryable": retryable })),
        )),
        other => Err(McpError::internal_error(other.to_string(), None)),
    }
}

// ── Tool implementations ─────────────────────────────────────────────

#[derive(Clone)]
pub struct AppTools {
    pub ctx: McpContext,
    pub tool_router: ToolRouter<Self>,
}

impl ServerHandler for AppTools {}

#[tool_router]
impl AppTools {
    pub fn new(ctx: McpContext) -> Self {
        Self {
            ctx,
            tool_router: Self::tool_router(),
        }
    }

    // ── Tool 1: ingest_pdf ──────────────────────────────────────────

    #[tool(description = "Extract the text of a PDF, split it into chunks and store their embeddings")]
    async fn ingest_pdf(
        &self,
        params: Parameters<IngestParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        if p.filepath.is_empty() {
            return error_result("filepath is required");
        }
        if !Path::new(&p.filepath).exists() {
            return error_result(&format!("file not found: {}", p.filepath));
        }

        let engine = &self.ctx.engine;
        let mut cleared = 0;
        if p.clear.unwrap_or(false) {
            cleared = match engine.clear().await {
                Ok(n) => n,
                Err(e) => return rag_error(e),
            };
        }

        match engine.ingest_pdf(&p.filepath).await {
            Ok(result) => json_result(serde_json::json!({
                "file": p.filepath,
                "collection": engine.collection_name(),
                "cleared": cleared,
                "added": result.count_added,
                "skipped": result.count_skipped,
                "duplicates": result.count_duplicate,
            })),
            Err(e) => rag_error(e),
        }
    }

    // ── Tool 2: ask ─────────────────────────────────────────────────

    #[tool(description = "Answer a question using only the ingested PDF; returns the answer with source pages and similarity scores")]
    async fn ask(&self, params: Parameters<AskParams>) -> Result<CallToolResult, McpError> {
        let p = params.0;
        if p.question.trim().is_empty() {
            return error_result("question is required");
        }

        let engine = &self.ctx.engine;
        let top_k = p.top_k.unwrap_or(engine.default_top_k());
        match engine.query(&p.question, top_k).await {
            Ok(response) => json_result(serde_json::json!({
                "answer": response.answer,
                "sources": response.sources,
            })),
            Err(e) => rag_error(e),
        }
    }

    // ── Tool 3: clear_collection ────────────────────────────────────

    #[tool(description = "Remove every stored chunk of the current collection")]
    async fn clear_collection(&self) -> Result<CallToolResult, McpError> {
        match self.ctx.engine.clear().await {
            Ok(removed) => json_result(serde_json::json!({
                "collection": self.ctx.engine.collection_name(),
                "removed": removed,
            })),
            Err(e) => rag_error(e),
        }
    }

    // ── Tool 4: collection_stats ────────────────────────────────────

    #[tool(description = "Show how many chunks and pages the current collection holds")]
    async fn collection_stats(&self) -> Result<CallToolResult, McpError> {
        match self.ctx.engine.stats().await {
            Ok(Some(stats)) => json_result(serde_json::json!(stats)),
            Ok(None) => json_result(serde_json::json!({
                "name": self.ctx.engine.collection_name(),
                "chunk_count": 0,
                "page_count": 0,
            })),
            Err(e) => rag_error(e),
        }
    }
}
