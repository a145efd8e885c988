/// End-to-end integration tests for the pdfqa pipeline.
///
/// Tests the complete flow:
///   Config → DB → Embedder → Ingest → Retrieve → Prompt → LLM → Response
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};
use pdfqa::config::Config;
use pdfqa::db::Db;
use pdfqa::embedder::mock::MockEmbedder;
use pdfqa::error::RagError;
use pdfqa::indexer::Page;
use pdfqa::rag::RagEngine;
use pdfqa::rag::llm::mock::ScriptedProvider;
use pdfqa::rag::llm::{LlmClient, ProviderError, RetryPolicy};
use pdfqa::rag::response::NO_CONTEXT_ANSWER;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use tokio::sync::Mutex as TokioMutex;

const REFUND_PAGE: &str = "Refund policy. Customers may return items within thirty days of purchase \
for full refund. Refunds are issued to the original payment method.";
const SHIPPING_PAGE: &str = "Shipping information. Orders ship within two business days.";

fn config(collection: &str) -> Config {
    Config {
        collection: collection.to_string(),
        ..Config::default()
    }
}

fn engine_on(
    db: Arc<TokioMutex<Db>>,
    dims: usize,
    provider: Arc<ScriptedProvider>,
) -> RagEngine {
    let llm = LlmClient::new(provider, RetryPolicy::default(), Duration::from_secs(30));
    RagEngine::new(&config("manual"), db, Arc::new(MockEmbedder::new(dims)))
        .unwrap()
        .with_llm(llm)
}

fn memory_db() -> Arc<TokioMutex<Db>> {
    Arc::new(TokioMutex::new(Db::open_in_memory().unwrap()))
}

fn pages() -> Vec<Page> {
    vec![Page::new(1, REFUND_PAGE), Page::new(2, SHIPPING_PAGE)]
}

/// Builds a PDF with one text line per page.
fn build_pdf(lines: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids = Vec::new();
    for line in lines {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 10.into()]),
                Operation::new("Td", vec![36.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*line)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

/// Unrelated question against a refund policy: fixed answer, model never called.
#[tokio::test]
async fn test_unrelated_question_gets_no_context_answer() {
    let provider = Arc::new(ScriptedProvider::answering("should not be used"));
    let engine = engine_on(memory_db(), 1024, provider.clone());
    engine.ingest(&pages()).await.unwrap();

    let response = engine
        .query("How do I bake chocolate cake?", 5)
        .await
        .unwrap();

    assert_eq!(response.answer, NO_CONTEXT_ANSWER);
    assert!(response.sources.is_empty());
    assert_eq!(provider.call_count(), 0, "no provider call expected");
}

/// Refund question against a cookbook that only shares function words with it.
#[tokio::test]
async fn test_refund_question_against_recipes_gets_no_context_answer() {
    let provider = Arc::new(ScriptedProvider::answering("should not be used"));
    let engine = engine_on(memory_db(), 1024, provider.clone());
    let recipes = vec![
        Page::new(
            1,
            "What is the secret of a good sauce? The butter is melted slowly over low heat.",
        ),
        Page::new(2, "Chocolate cake. Whisk eggs with sugar, then fold in flour and cocoa."),
        Page::new(3, "Bread dough needs yeast, warm water and at least two hours to rise."),
    ];
    assert_eq!(engine.ingest(&recipes).await.unwrap().count_added, 3);

    let response = engine.query("What is the refund policy?", 5).await.unwrap();

    assert_eq!(response.answer, NO_CONTEXT_ANSWER);
    assert!(response.sources.is_empty());
    assert_eq!(provider.call_count(), 0, "no provider call expected");
}

/// Related question: one model call, answer annotated with its source page.
#[tokio::test]
async fn test_related_question_is_answered_with_sources() {
    let provider = Arc::new(ScriptedProvider::answering(
        "Items can be returned within thirty days (Page 1).",
    ));
    let engine = engine_on(memory_db(), 1024, provider.clone());
    let ingested = engine.ingest(&pages()).await.unwrap();
    assert_eq!(ingested.count_added, 2);

    let response = engine
        .query("What is the refund policy for returned items?", 5)
        .await
        .unwrap();

    assert_eq!(
        response.answer,
        "Items can be returned within thirty days (Page 1)."
    );
    assert_eq!(provider.call_count(), 1);
    assert!(!response.sources.is_empty());
    assert_eq!(response.sources[0].page_number, 1);
    assert!(response.sources[0].similarity_score >= 0.25);
    assert!(response.sources[0].similarity_score <= 1.0);

    let prompt = &provider.prompts()[0];
    assert!(prompt.contains("[Source: Page 1]"));
    assert!(prompt.contains(REFUND_PAGE));
    assert!(prompt.contains("Question: What is the refund policy for returned items?"));
}

#[tokio::test]
async fn test_empty_index_never_calls_model() {
    let provider = Arc::new(ScriptedProvider::answering("unused"));
    let engine = engine_on(memory_db(), 1024, provider.clone());

    let response = engine.query("What is the refund policy?", 5).await.unwrap();
    assert_eq!(response.answer, NO_CONTEXT_ANSWER);
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn test_repeated_queries_are_identical() {
    let provider = Arc::new(ScriptedProvider::answering("Thirty days."));
    let engine = engine_on(memory_db(), 1024, provider.clone());
    engine.ingest(&pages()).await.unwrap();

    let first = engine.query("refund policy", 3).await.unwrap();
    let second = engine.query("refund policy", 3).await.unwrap();
    assert_eq!(first, second);

    let prompts = provider.prompts();
    assert_eq!(prompts[0], prompts[1]);
}

#[tokio::test]
async fn test_reingest_is_deduplicated() {
    let engine = engine_on(memory_db(), 1024, Arc::new(ScriptedProvider::answering("ok")));
    let first = engine.ingest(&pages()).await.unwrap();
    let second = engine.ingest(&pages()).await.unwrap();

    assert_eq!(first.count_added, 2);
    assert_eq!(second.count_added, 0);
    assert_eq!(second.count_duplicate, 2);
    assert_eq!(engine.stats().await.unwrap().unwrap().chunk_count, 2);
}

#[tokio::test]
async fn test_embedder_mismatch_is_configuration_error() {
    let db = memory_db();
    let engine = engine_on(db.clone(), 256, Arc::new(ScriptedProvider::answering("ok")));
    engine.ingest(&pages()).await.unwrap();

    let other = engine_on(db, 128, Arc::new(ScriptedProvider::answering("ok")));
    assert!(matches!(
        other.query("refund policy", 3).await,
        Err(RagError::Configuration(_))
    ));
    assert!(matches!(
        other.ingest(&pages()).await,
        Err(RagError::Configuration(_))
    ));

    // After clearing, the new embedder may rebuild the collection.
    assert_eq!(other.clear().await.unwrap(), 2);
    assert_eq!(other.ingest(&pages()).await.unwrap().count_added, 2);
}

#[tokio::test]
async fn test_clear_is_idempotent() {
    let provider = Arc::new(ScriptedProvider::answering("ok"));
    let engine = engine_on(memory_db(), 1024, provider.clone());
    engine.ingest(&pages()).await.unwrap();

    assert_eq!(engine.clear().await.unwrap(), 2);
    assert_eq!(engine.clear().await.unwrap(), 0);

    let response = engine.query("refund policy", 3).await.unwrap();
    assert_eq!(response.answer, NO_CONTEXT_ANSWER);
    assert_eq!(provider.call_count(), 0);
}

/// Two transient failures, then success: three calls spaced 1 s and 2 s apart.
#[tokio::test(start_paused = true)]
async fn test_transient_failures_are_retried_with_backoff() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        Err(ProviderError::Transient("503 Service Unavailable".into())),
        Err(ProviderError::Transient("429 Too Many Requests".into())),
        Ok("Thirty days (Page 1).".into()),
    ]));
    let engine = engine_on(memory_db(), 1024, provider.clone());
    engine.ingest(&pages()).await.unwrap();

    let response = engine.query("refund policy", 3).await.unwrap();
    assert_eq!(response.answer, "Thirty days (Page 1).");
    assert_eq!(provider.call_count(), 3);

    let calls = provider.call_instants();
    let first_gap = calls[1] - calls[0];
    let second_gap = calls[2] - calls[1];
    assert!(first_gap >= Duration::from_secs(1) && first_gap < Duration::from_millis(1005));
    assert!(second_gap >= Duration::from_secs(2) && second_gap < Duration::from_millis(2005));
}

#[tokio::test(start_paused = true)]
async fn test_fatal_failure_surfaces_as_non_retryable() {
    let provider = Arc::new(ScriptedProvider::new(vec![Err(ProviderError::Fatal(
        "401 Unauthorized".into(),
    ))]));
    let engine = engine_on(memory_db(), 1024, provider.clone());
    engine.ingest(&pages()).await.unwrap();

    let err = engine.query("refund policy", 3).await.unwrap_err();
    assert!(!err.is_retryable());
    assert!(matches!(err, RagError::Generation { attempts: 1, .. }));
    assert_eq!(provider.call_count(), 1);
}

/// PDF on disk → pages → chunks → persistent store, surviving a reopen.
#[tokio::test]
async fn test_pdf_ingest_persists_across_restarts() {
    let dir = tempdir().unwrap();
    let pdf_path = dir.path().join("policy.pdf");
    std::fs::write(&pdf_path, build_pdf(&[REFUND_PAGE, SHIPPING_PAGE, ""])).unwrap();
    let db_path = dir.path().join("pdfqa.db");

    {
        let db = Arc::new(TokioMutex::new(Db::open(&db_path).unwrap()));
        let engine = engine_on(db, 1024, Arc::new(ScriptedProvider::answering("ok")));
        let result = engine.ingest_pdf(&pdf_path).await.unwrap();
        assert_eq!(result.count_added, 2);
    }

    let db = Arc::new(TokioMutex::new(Db::open(&db_path).unwrap()));
    let provider = Arc::new(ScriptedProvider::answering("Thirty days."));
    let engine = engine_on(db, 1024, provider.clone());

    let stats = engine.stats().await.unwrap().unwrap();
    assert_eq!(stats.chunk_count, 2);
    assert_eq!(stats.page_count, 2);
    assert_eq!(stats.model_name, "mock-bag-of-words");

    let response = engine.query("refund policy", 3).await.unwrap();
    assert_eq!(response.sources[0].page_number, 1);
    assert_eq!(provider.call_count(), 1);
}

#[tokio::test]
async fn test_pdf_bytes_ingest_matches_file_ingest() {
    let provider = Arc::new(ScriptedProvider::answering("Thirty days."));
    let engine = engine_on(memory_db(), 1024, provider.clone());
    let result = engine
        .ingest_pdf_bytes(build_pdf(&[REFUND_PAGE, SHIPPING_PAGE]))
        .await
        .unwrap();
    assert_eq!(result.count_added, 2);

    let response = engine.query("refund policy", 3).await.unwrap();
    assert_eq!(response.sources[0].page_number, 1);
    assert_eq!(provider.call_count(), 1);

    assert!(matches!(
        engine.ingest_pdf_bytes(b"not a pdf".to_vec()).await,
        Err(RagError::Pdf(_))
    ));
}

#[tokio::test]
async fn test_missing_pdf_is_pdf_error() {
    let engine = engine_on(memory_db(), 1024, Arc::new(ScriptedProvider::answering("ok")));
    assert!(matches!(
        engine.ingest_pdf("/nonexistent/policy.pdf").await,
        Err(RagError::Pdf(_))
    ));
}
