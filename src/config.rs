use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Placeholder values shipped in sample `.env` files; treated as "not configured"
const OPENAI_PLACEHOLDER: &str = "your-openai-api-key";
const PERPLEXITY_PLACEHOLDER: &str = "your-perplexity-api-key";

/// Pipeline settings loaded from the environment
#[derive(Debug, Clone)]
pub struct Settings {
    pub collection_name: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub max_document_bytes: usize,
    pub fetch_timeout: Duration,
    pub llm_timeout: Duration,
    pub clear_before_index: bool,
    pub answer_concurrency: usize,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub perplexity_api_key: Option<String>,
    pub perplexity_model: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            collection_name: "rag-system".to_string(),
            chunk_size: 1000,
            chunk_overlap: 200,
            top_k: 5,
            max_document_bytes: 10 * 1024 * 1024,
            fetch_timeout: Duration::from_secs(30),
            llm_timeout: Duration::from_secs(30),
            clear_before_index: false,
            answer_concurrency: 1,
            openai_api_key: None,
            openai_model: "gpt-3.5-turbo".to_string(),
            perplexity_api_key: None,
            perplexity_model: "sonar".to_string(),
        }
    }
}

impl Settings {
    /// Create settings from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self> {
        let defaults = Settings::default();

        let settings = Settings {
            collection_name: env::var("RAG_COLLECTION").unwrap_or(defaults.collection_name),
            chunk_size: parse_var("CHUNK_SIZE", defaults.chunk_size)?,
            chunk_overlap: parse_var("CHUNK_OVERLAP", defaults.chunk_overlap)?,
            top_k: parse_var("TOP_K_RESULTS", defaults.top_k)?,
            max_document_bytes: parse_var("MAX_FILE_SIZE", defaults.max_document_bytes)?,
            fetch_timeout: Duration::from_secs(parse_var(
                "FETCH_TIMEOUT_SECS",
                defaults.fetch_timeout.as_secs(),
            )?),
            llm_timeout: Duration::from_secs(parse_var(
                "LLM_TIMEOUT_SECS",
                defaults.llm_timeout.as_secs(),
            )?),
            clear_before_index: parse_var("CLEAR_BEFORE_INDEX", defaults.clear_before_index)?,
            answer_concurrency: parse_var("ANSWER_CONCURRENCY", defaults.answer_concurrency)?,
            openai_api_key: credential(env::var("OPENAI_API_KEY").ok(), OPENAI_PLACEHOLDER),
            openai_model: env::var("OPENAI_MODEL").unwrap_or(defaults.openai_model),
            perplexity_api_key: credential(
                env::var("PERPLEXITY_API_KEY").ok(),
                PERPLEXITY_PLACEHOLDER,
            ),
            perplexity_model: env::var("PERPLEXITY_MODEL").unwrap_or(defaults.perplexity_model),
        };

        if settings.chunk_overlap >= settings.chunk_size {
            anyhow::bail!(
                "CHUNK_OVERLAP ({}) must be smaller than CHUNK_SIZE ({})",
                settings.chunk_overlap,
                settings.chunk_size
            );
        }

        Ok(settings)
    }
}

/// Parse an optional environment variable, using `default` when it is unset
fn parse_var<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {}: {:?}", key, raw)),
        Err(_) => Ok(default),
    }
}

/// Turn a raw credential into `None` when it is empty or still the sample placeholder
pub fn credential(raw: Option<String>, placeholder: &str) -> Option<String> {
    raw.map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty() && value != placeholder)
}
