use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use log::{error, info, warn};
use std::sync::Arc;

use docqa::answer::AnswerGenerator;
use docqa::chunking::Chunker;
use docqa::config::Settings;
use docqa::database::{QdrantConfig, QdrantStore, VectorStore};
use docqa::document::HttpDocumentLoader;
use docqa::embeddings::HashingEmbedder;
use docqa::index::VectorIndex;
use docqa::llm::{ChatCompletionsClient, LlmProvider, ProviderConfig};
use docqa::memory::InMemoryStore;
use docqa::rag::{RagEngine, RetrievalConfig};

/// Answer questions about a remote PDF, DOCX or TXT document
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Index a document, then answer questions about it
    Run {
        /// URL of the document to process
        document_url: String,
        /// Question to answer (repeatable)
        #[arg(short, long = "question", required = true)]
        questions: Vec<String>,
    },
    /// Index a document into the collection
    Index {
        /// URL of the document to process
        document_url: String,
    },
    /// Answer questions against what is already indexed
    Ask {
        #[arg(required = true)]
        questions: Vec<String>,
        /// Return a decision/amount/justification record
        #[arg(long)]
        structured: bool,
    },
    /// Index a document and enter an interactive Q&A loop
    Chat {
        /// URL of the document to process
        document_url: String,
    },
    /// Report component availability
    Health {
        /// Also check live connectivity of the vector store and LLM provider
        #[arg(long)]
        probe: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize environment
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();

    // Load configuration from environment
    let settings = Settings::from_env().context("Invalid configuration")?;
    let engine = build_engine(&settings).context("Failed to initialize RAG engine")?;

    match args.command {
        Command::Run {
            document_url,
            questions,
        } => {
            info!("Processing request with {} questions", questions.len());

            let index_result = engine.index_document(&document_url).await;
            if !index_result.success {
                let cause = index_result.error.unwrap_or_default();
                error!("Document indexing failed: {}", cause);
                anyhow::bail!("Document processing failed: {}", cause);
            }
            info!(
                "Document indexed successfully. Processed {} chunks",
                index_result.chunks_processed
            );

            let batch = engine.answer_questions(&questions).await;
            if !batch.success {
                anyhow::bail!(
                    "Question answering failed: {}",
                    batch.error.unwrap_or_default()
                );
            }
            println!("{}", serde_json::to_string_pretty(&batch)?);
        }
        Command::Index { document_url } => {
            let result = engine.index_document(&document_url).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.success {
                std::process::exit(1);
            }
        }
        Command::Ask {
            questions,
            structured,
        } => {
            if structured {
                for question in &questions {
                    let answer = engine
                        .answer_structured(question)
                        .await
                        .with_context(|| format!("Failed to answer {:?}", question))?;
                    println!("{}", serde_json::to_string_pretty(&answer)?);
                }
            } else {
                let batch = engine.answer_questions(&questions).await;
                println!("{}", serde_json::to_string_pretty(&batch)?);
            }
        }
        Command::Chat { document_url } => {
            let result = engine.index_document(&document_url).await;
            if !result.success {
                anyhow::bail!(
                    "Document processing failed: {}",
                    result.error.unwrap_or_default()
                );
            }
            engine
                .run_query_loop(&document_url)
                .await
                .context("Error in query loop")?;
        }
        Command::Health { probe } => {
            let status = engine.status(probe).await;
            let overall = if status.is_healthy() {
                "healthy"
            } else {
                "degraded"
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "status": overall,
                    "components": status,
                }))?
            );
        }
    }

    Ok(())
}

/// Wire the pipeline components from settings
fn build_engine(settings: &Settings) -> Result<RagEngine> {
    let store: Arc<dyn VectorStore> = match QdrantConfig::from_env() {
        Some(qdrant_config) => {
            info!("Using Qdrant at {}", qdrant_config.url);
            Arc::new(QdrantStore::new(qdrant_config).context("Failed to initialize Qdrant client")?)
        }
        None => {
            warn!("QDRANT_URL not set, indexed documents are kept in memory only");
            Arc::new(InMemoryStore::new())
        }
    };

    let index = VectorIndex::new(
        Arc::new(HashingEmbedder::default()),
        store,
        settings.collection_name.clone(),
    );
    info!(
        "Indexing into collection {} on {}",
        index.collection(),
        index.backend()
    );

    // OpenAI first, Perplexity as the fallback
    let providers: Vec<Arc<dyn LlmProvider>> = vec![
        Arc::new(ChatCompletionsClient::new(ProviderConfig::openai(
            settings.openai_api_key.clone(),
            settings.openai_model.clone(),
            settings.llm_timeout,
        ))?),
        Arc::new(ChatCompletionsClient::new(ProviderConfig::perplexity(
            settings.perplexity_api_key.clone(),
            settings.perplexity_model.clone(),
            settings.llm_timeout,
        ))?),
    ];
    let generator = AnswerGenerator::new(providers);
    if !generator.is_configured() {
        warn!("No LLM API keys configured; questions cannot be answered");
    }

    let loader = HttpDocumentLoader::new(settings.fetch_timeout, settings.max_document_bytes)?;
    let chunker = Chunker::new(settings.chunk_size, settings.chunk_overlap)?;

    Ok(RagEngine::new(
        Arc::new(loader),
        chunker,
        index,
        generator,
        RetrievalConfig {
            top_k: settings.top_k,
            clear_before_index: settings.clear_before_index,
            answer_concurrency: settings.answer_concurrency,
        },
    ))
}
