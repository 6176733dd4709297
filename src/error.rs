use thiserror::Error;

/// Errors raised by the retrieval pipeline
#[derive(Debug, Error)]
pub enum RagError {
    /// The document could not be downloaded
    #[error("Failed to fetch document from {url}: {message}")]
    Fetch { url: String, message: String },

    /// The document locator does not carry a supported extension
    #[error("Unsupported file type: {0}")]
    UnsupportedFormat(String),

    /// The downloaded bytes could not be parsed as their declared format
    #[error("Failed to extract text from {format} document: {message}")]
    Extraction { format: String, message: String },

    #[error("Document is {size} bytes, larger than the {limit} byte limit")]
    DocumentTooLarge { size: usize, limit: usize },

    #[error("Invalid chunking parameters: chunk size {chunk_size}, overlap {overlap}")]
    InvalidChunking { chunk_size: usize, overlap: usize },

    /// An embedding did not match the collection dimension
    #[error("Embedding has {actual} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The vector store backend could not serve the request
    #[error("Vector store unavailable ({backend}): {message}")]
    IndexUnavailable { backend: String, message: String },

    /// The last indexing attempt failed, so the index cannot be trusted for answers
    #[error("document was not indexed: {0}")]
    NotIndexed(String),

    /// Retrieval returned no passages for a question
    #[error("No relevant context found")]
    NoRelevantContext,

    #[error("No LLM API keys provided")]
    NoProviderConfigured,

    /// The selected LLM backend answered with a failure
    #[error("{provider} API error: {message}")]
    Provider { provider: String, message: String },
}

impl RagError {
    pub(crate) fn index_unavailable(backend: &str, message: impl ToString) -> Self {
        RagError::IndexUnavailable {
            backend: backend.to_string(),
            message: message.to_string(),
        }
    }

    pub(crate) fn provider(provider: &str, message: impl ToString) -> Self {
        RagError::Provider {
            provider: provider.to_string(),
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RagError>;
