use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex as TokioMutex;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use pdfqa::config::Config;
use pdfqa::db::Db;
use pdfqa::embedder::Embedder;
use pdfqa::embedder::download::{all_files_present, download_model_files};
use pdfqa::embedder::mock::MockEmbedder;
use pdfqa::embedder::onnx::OnnxEmbedder;
use pdfqa::mcp::server::{McpContext, McpServer};
use pdfqa::rag::llm::LlmClient;
use pdfqa::rag::{QueryResponse, RagEngine};
use pdfqa::session::{ChatSession, Role, format_sources};

#[derive(Parser, Debug)]
#[command(
    name = "pdfqa",
    version,
    about = "Ask questions about a PDF, answered from its own pages"
)]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(long, global = true, default_value = "config.json")]
    config: String,

    /// Collection to use instead of the configured one
    #[arg(long, global = true)]
    collection: Option<String>,

    /// Use the offline bag-of-words embedder instead of the ONNX model
    #[arg(long, global = true, default_value_t = false)]
    mock_embedder: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Extract, chunk and embed a PDF into the collection
    Ingest(IngestArgs),
    /// Ask a single question
    Ask(AskArgs),
    /// Interactive question loop
    Chat(ChatArgs),
    /// Remove every chunk of the collection
    Clear,
    /// Show what the collection holds
    Stats,
    /// Serve the MCP tools over stdio
    Serve,
    /// Fetch the ONNX embedding model
    DownloadModel,
}

#[derive(Args, Debug)]
struct IngestArgs {
    pdf: PathBuf,

    /// Clear the collection first
    #[arg(long, default_value_t = false)]
    clear: bool,
}

#[derive(Args, Debug)]
struct AskArgs {
    question: String,

    #[arg(long)]
    top_k: Option<usize>,
}

#[derive(Args, Debug)]
struct ChatArgs {
    #[arg(long)]
    top_k: Option<usize>,
}

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(err) = run().await {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(&cli.config)?;
    if let Some(collection) = cli.collection {
        config.collection = collection;
    }

    if let Commands::DownloadModel = cli.command {
        return download_model(&config).await;
    }

    let db = Db::open(&config.db_path).context("Failed to open database")?;
    let db = Arc::new(TokioMutex::new(db));
    let embedder = build_embedder(&config, cli.mock_embedder).await?;
    let engine = RagEngine::new(&config, db, embedder)?;

    match cli.command {
        Commands::Ingest(args) => ingest(&engine, args).await,
        Commands::Ask(args) => {
            let engine = engine.with_llm(LlmClient::from_config(&config.llm)?);
            let top_k = args.top_k.unwrap_or(config.search_top_k);
            let response = engine.query(&args.question, top_k).await?;
            print_response(&response);
            Ok(())
        }
        Commands::Chat(args) => {
            let engine = engine.with_llm(LlmClient::from_config(&config.llm)?);
            chat(&engine, args.top_k.unwrap_or(config.search_top_k)).await
        }
        Commands::Clear => {
            let removed = engine.clear().await?;
            println!("Removed {removed} chunks from '{}'", engine.collection_name());
            Ok(())
        }
        Commands::Stats => {
            match engine.stats().await? {
                Some(stats) => println!("{}", serde_json::to_string_pretty(&stats)?),
                None => println!("Collection '{}' is empty", engine.collection_name()),
            }
            Ok(())
        }
        Commands::Serve => {
            let engine = match LlmClient::from_config(&config.llm) {
                Ok(llm) => engine.with_llm(llm),
                Err(e) => {
                    warn!("{e}; the ask tool will be unavailable");
                    engine
                }
            };
            let server = McpServer::new(McpContext {
                engine: Arc::new(engine),
            });
            server.start().await
        }
        Commands::DownloadModel => Ok(()),
    }
}

async fn build_embedder(config: &Config, mock: bool) -> Result<Arc<dyn Embedder>> {
    if mock {
        info!("Using mock embedder ({} dims)", config.model.dimensions);
        return Ok(Arc::new(MockEmbedder::new(config.model.dimensions)));
    }

    let model_dir = config.model_dir();
    if !all_files_present(&model_dir) {
        download_model(config).await?;
    }
    let embedder = OnnxEmbedder::new(&model_dir, &config.model.name, config.model.dimensions)
        .with_context(|| format!("failed to load model from {}", model_dir.display()))?;
    Ok(Arc::new(embedder))
}

async fn download_model(config: &Config) -> Result<()> {
    let model_dir = config.model_dir();
    tokio::task::spawn_blocking(move || download_model_files(&model_dir))
        .await
        .context("model download task failed")?
}

async fn ingest(engine: &RagEngine, args: IngestArgs) -> Result<()> {
    if args.clear {
        engine.clear().await?;
    }
    let result = engine
        .ingest_pdf(&args.pdf)
        .await
        .with_context(|| format!("failed to ingest {}", args.pdf.display()))?;
    println!(
        "Ingested {}: {} chunks added, {} skipped, {} already present",
        args.pdf.display(),
        result.count_added,
        result.count_skipped,
        result.count_duplicate
    );
    Ok(())
}

fn print_response(response: &QueryResponse) {
    println!("{}", response.answer);
    if response.has_sources() {
        println!("\nSources: {}", format_sources(&response.sources));
    }
}

async fn chat(engine: &RagEngine, top_k: usize) -> Result<()> {
    let mut session = ChatSession::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    println!("Ask about '{}'. Commands: /history, /reset, /quit", engine.collection_name());
    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/reset" => {
                session.reset();
                println!("Conversation cleared.");
                continue;
            }
            "/history" => {
                for turn in session.turns() {
                    let who = match turn.role {
                        Role::User => "you",
                        Role::Assistant => "pdfqa",
                    };
                    println!("[{}] {who}: {}", turn.timestamp.format("%H:%M:%S"), turn.content);
                }
                continue;
            }
            _ => {}
        }

        session.push_user(line);
        match engine.query(line, top_k).await {
            Ok(response) => {
                print_response(&response);
                session.push_assistant(&response);
            }
            // Keep the session alive on per-question failures.
            Err(e) if e.is_retryable() => println!("The model is unavailable right now: {e}"),
            Err(e) => println!("Error: {e}"),
        }
    }
    Ok(())
}
