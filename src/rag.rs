use crate::answer::{AnswerGenerator, StructuredAnswer};
use crate::chunking::Chunker;
use crate::database::{ChunkMetadata, SearchResult};
use crate::document::DocumentLoader;
use crate::error::{RagError, Result};
use crate::index::{IndexDocument, VectorIndex};
use futures::{FutureExt, StreamExt};
use log::{error, info, warn};
use serde::Serialize;
use std::io::{self, Write};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Retrieval knobs for the engine
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// Passages retrieved per question
    pub top_k: usize,
    /// Drop every indexed entry before indexing a new document
    pub clear_before_index: bool,
    /// Questions answered concurrently within a batch
    pub answer_concurrency: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        RetrievalConfig {
            top_k: 5,
            clear_before_index: false,
            answer_concurrency: 1,
        }
    }
}

/// Where the engine stands with respect to the current document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Indexing { document_ref: String },
    Indexed { document_ref: String, chunks: usize },
    Failed { document_ref: String, error: String },
}

/// Outcome of indexing one document
#[derive(Debug, Clone, Serialize)]
pub struct IndexResult {
    pub success: bool,
    pub document_ref: String,
    pub chunks_processed: usize,
    pub ids: Vec<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of answering one question
#[derive(Debug, Clone, Serialize)]
pub struct AnswerRecord {
    pub question: String,
    pub answer: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    pub sources: Vec<SearchResult>,
}

impl AnswerRecord {
    fn answered(question: &str, answer: String, sources: Vec<SearchResult>) -> Self {
        AnswerRecord {
            question: question.to_string(),
            answer,
            success: true,
            error: None,
            sources,
        }
    }

    fn failed(question: &str, error: String) -> Self {
        AnswerRecord {
            question: question.to_string(),
            answer: format!("Error: {}", error),
            success: false,
            error: Some(error),
            sources: Vec::new(),
        }
    }
}

/// Answers for a batch of questions, in question order
#[derive(Debug, Clone, Serialize)]
pub struct AnswerBatch {
    pub success: bool,
    pub answers: Vec<String>,
    #[serde(skip)]
    pub records: Vec<AnswerRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Component availability, optionally with live connectivity checks
#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    pub vector_store_available: bool,
    pub vector_store_backend: String,
    pub llm_client_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_provider: Option<String>,
    pub document_processor_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector_store_healthy: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector_store_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_client_healthy: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_client_error: Option<String>,
}

impl SystemStatus {
    /// All components available and no probe reported a failure
    pub fn is_healthy(&self) -> bool {
        self.vector_store_available
            && self.llm_client_available
            && self.document_processor_available
            && self.vector_store_healthy != Some(false)
            && self.llm_client_healthy != Some(false)
    }
}

/// RAG (Retrieval-Augmented Generation) engine
pub struct RagEngine {
    loader: Arc<dyn DocumentLoader>,
    chunker: Chunker,
    index: VectorIndex,
    generator: AnswerGenerator,
    config: RetrievalConfig,
    state: RwLock<PipelineState>,
}

impl RagEngine {
    /// Create a new RAG engine from its collaborators
    pub fn new(
        loader: Arc<dyn DocumentLoader>,
        chunker: Chunker,
        index: VectorIndex,
        generator: AnswerGenerator,
        config: RetrievalConfig,
    ) -> Self {
        RagEngine {
            loader,
            chunker,
            index,
            generator,
            config,
            state: RwLock::new(PipelineState::Idle),
        }
    }

    pub async fn state(&self) -> PipelineState {
        self.state.read().await.clone()
    }

    /// Load, chunk, embed and store a document. Failures are reported in the result.
    pub async fn index_document(&self, document_ref: &str) -> IndexResult {
        *self.state.write().await = PipelineState::Indexing {
            document_ref: document_ref.to_string(),
        };

        match self.try_index(document_ref).await {
            Ok(ids) => {
                info!(
                    "Indexed {} chunks from document: {}",
                    ids.len(),
                    document_ref
                );
                *self.state.write().await = PipelineState::Indexed {
                    document_ref: document_ref.to_string(),
                    chunks: ids.len(),
                };
                IndexResult {
                    success: true,
                    document_ref: document_ref.to_string(),
                    chunks_processed: ids.len(),
                    ids,
                    error: None,
                }
            }
            Err(e) => {
                error!("Error processing and indexing document: {}", e);
                *self.state.write().await = PipelineState::Failed {
                    document_ref: document_ref.to_string(),
                    error: e.to_string(),
                };
                IndexResult {
                    success: false,
                    document_ref: document_ref.to_string(),
                    chunks_processed: 0,
                    ids: Vec::new(),
                    error: Some(e.to_string()),
                }
            }
        }
    }

    async fn try_index(&self, document_ref: &str) -> Result<Vec<Uuid>> {
        let document = self.loader.load(document_ref).await?;

        let chunks = self.chunker.split(&document.text);
        info!("Split into {} chunks", chunks.len());

        let documents: Vec<IndexDocument> = chunks
            .into_iter()
            .map(|chunk| IndexDocument {
                metadata: ChunkMetadata {
                    document_ref: document_ref.to_string(),
                    format: Some(document.format),
                    chunk_index: chunk.index,
                    total_chunks: chunk.total_chunks,
                    byte_length: document.byte_length,
                },
                text: chunk.text,
            })
            .collect();

        if self.config.clear_before_index {
            self.index.clear().await?;
        }

        self.index.upsert(&documents).await
    }

    /// A failed indexing attempt blocks answering until a document indexes successfully
    async fn ensure_answerable(&self) -> Result<()> {
        match &*self.state.read().await {
            PipelineState::Failed { error, .. } => Err(RagError::NotIndexed(error.clone())),
            _ => Ok(()),
        }
    }

    /// Retrieve context for one question and generate an answer
    pub async fn answer_question(&self, question: &str) -> AnswerRecord {
        if let Err(e) = self.ensure_answerable().await {
            return AnswerRecord::failed(question, e.to_string());
        }

        let results = match self.index.query(question, self.config.top_k).await {
            Ok(results) => results,
            Err(e) => {
                error!("Error answering question: {}", e);
                return AnswerRecord::failed(question, e.to_string());
            }
        };

        if results.is_empty() {
            return AnswerRecord::failed(question, RagError::NoRelevantContext.to_string());
        }

        let passages: Vec<&str> = results.iter().map(|r| r.text.as_str()).collect();
        match self.generator.generate(question, &passages).await {
            Ok(answer) => AnswerRecord::answered(question, answer, results),
            Err(e) => {
                error!("Error generating LLM response: {}", e);
                AnswerRecord::failed(question, format!("LLM error: {}", e))
            }
        }
    }

    /// Answer every question independently; results keep the input order
    pub async fn answer_questions(&self, questions: &[String]) -> AnswerBatch {
        let concurrency = self.config.answer_concurrency.max(1);
        let answering = futures::stream::iter(questions)
            .map(|question| self.answer_question(question))
            .buffered(concurrency)
            .collect::<Vec<AnswerRecord>>();

        match AssertUnwindSafe(answering).catch_unwind().await {
            Ok(records) => {
                let failed = records.iter().filter(|r| !r.success).count();
                if failed > 0 {
                    warn!("{} of {} questions failed", failed, records.len());
                }
                AnswerBatch {
                    success: true,
                    answers: records.iter().map(|r| r.answer.clone()).collect(),
                    records,
                    error: None,
                }
            }
            Err(_) => {
                error!("Answering aborted by a panic");
                AnswerBatch {
                    success: false,
                    answers: Vec::new(),
                    records: Vec::new(),
                    error: Some("question answering aborted unexpectedly".to_string()),
                }
            }
        }
    }

    /// Retrieve context and ask for a decision/amount/justification record
    pub async fn answer_structured(&self, question: &str) -> Result<StructuredAnswer> {
        self.ensure_answerable().await?;

        let results = self.index.query(question, self.config.top_k).await?;
        if results.is_empty() {
            return Err(RagError::NoRelevantContext);
        }

        let passages: Vec<&str> = results.iter().map(|r| r.text.as_str()).collect();
        self.generator.generate_structured(question, &passages).await
    }

    /// Report component availability; with `probe`, also test live connectivity
    pub async fn status(&self, probe: bool) -> SystemStatus {
        let mut status = SystemStatus {
            vector_store_available: true,
            vector_store_backend: self.index.backend().to_string(),
            llm_client_available: self.generator.is_configured(),
            llm_provider: self
                .generator
                .active_provider()
                .map(|p| p.name().to_string()),
            document_processor_available: true,
            vector_store_healthy: None,
            vector_store_error: None,
            llm_client_healthy: None,
            llm_client_error: None,
        };

        if !probe {
            return status;
        }

        match self.index.query("test", 1).await {
            Ok(_) => status.vector_store_healthy = Some(true),
            Err(e) => {
                status.vector_store_healthy = Some(false);
                status.vector_store_error = Some(e.to_string());
            }
        }

        if status.llm_client_available {
            match self.generator.probe().await {
                Ok(()) => status.llm_client_healthy = Some(true),
                Err(e) => {
                    status.llm_client_healthy = Some(false);
                    status.llm_client_error = Some(e.to_string());
                }
            }
        }

        status
    }

    /// Run an interactive question loop on stdin until `exit`
    pub async fn run_query_loop(&self, document_ref: &str) -> anyhow::Result<()> {
        println!(
            "Ready to answer questions about {}. Type 'exit' to quit.",
            document_ref
        );

        let stdin = io::stdin();
        let mut stdout = io::stdout();
        let mut buffer = String::new();

        loop {
            print!("\nYour question: ");
            stdout.flush()?;

            buffer.clear();
            if stdin.read_line(&mut buffer)? == 0 {
                break;
            }

            let question = buffer.trim();
            if question.is_empty() {
                continue;
            }
            if question.eq_ignore_ascii_case("exit") {
                println!("Goodbye!");
                break;
            }

            let record = self.answer_question(question).await;
            println!("\n{}", record.answer);
        }

        Ok(())
    }
}
