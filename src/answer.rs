use crate::error::{RagError, Result};
use crate::llm::{ChatMessage, ChatRequest, LlmProvider};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Decision recorded when the backend reply carries no parseable JSON object
pub const UNPARSED_DECISION: &str = "Unable to parse structured response";
/// Amount recorded when none is present
pub const NO_AMOUNT: &str = "N/A";

const TEMPERATURE: f32 = 0.1;
const SIMPLE_MAX_TOKENS: u32 = 500;
const STRUCTURED_MAX_TOKENS: u32 = 1500;
const PROBE_MAX_TOKENS: u32 = 5;

const STRUCTURED_SYSTEM_PROMPT: &str = "You are an insurance policy analyzer. Based on the provided policy document context, \
analyze the query and provide a structured response with:
1. Decision: Whether the claim/request is approved or rejected
2. Amount: The payout amount if applicable (or \"N/A\" if not applicable)
3. Justification: Detailed explanation with specific policy clauses referenced

Format your response as a JSON object with these fields.";

/// Claim-adjudication style answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredAnswer {
    pub decision: String,
    pub amount: String,
    pub justification: String,
}

impl StructuredAnswer {
    /// Parse the first brace-delimited JSON object in a reply, or fall back to
    /// carrying the raw reply as the justification
    pub fn from_response(response: &str) -> Self {
        json_object_span(response)
            .and_then(|span| serde_json::from_str::<Map<String, Value>>(span).ok())
            .map(|object| StructuredAnswer {
                decision: field(&object, "decision"),
                amount: field(&object, "amount"),
                justification: field(&object, "justification"),
            })
            .unwrap_or_else(|| {
                debug!("Structured reply is not JSON, keeping raw text");
                StructuredAnswer {
                    decision: UNPARSED_DECISION.to_string(),
                    amount: NO_AMOUNT.to_string(),
                    justification: response.to_string(),
                }
            })
    }
}

/// Composes answers from retrieved passages using the first configured provider
pub struct AnswerGenerator {
    providers: Vec<Arc<dyn LlmProvider>>,
}

impl AnswerGenerator {
    /// Providers are tried in the given priority order
    pub fn new(providers: Vec<Arc<dyn LlmProvider>>) -> Self {
        AnswerGenerator { providers }
    }

    /// The provider that would serve the next call, if any
    pub fn active_provider(&self) -> Option<&dyn LlmProvider> {
        self.providers
            .iter()
            .find(|p| p.is_configured())
            .map(|p| p.as_ref())
    }

    pub fn is_configured(&self) -> bool {
        self.active_provider().is_some()
    }

    /// Answer a question in plain text from the given passages
    pub async fn generate(&self, question: &str, passages: &[&str]) -> Result<String> {
        let request = ChatRequest {
            messages: vec![ChatMessage::user(simple_prompt(question, passages))],
            max_tokens: SIMPLE_MAX_TOKENS,
            temperature: TEMPERATURE,
        };
        self.complete(&request).await
    }

    /// Ask for a decision/amount/justification record; non-JSON replies degrade to a fallback record
    pub async fn generate_structured(
        &self,
        question: &str,
        passages: &[&str],
    ) -> Result<StructuredAnswer> {
        let user_prompt = format!(
            "Policy Context: {}\n\nQuery: {}\n\nPlease analyze this query against the policy and provide a structured response.",
            join_passages(passages),
            question
        );
        let request = ChatRequest {
            messages: vec![
                ChatMessage::system(STRUCTURED_SYSTEM_PROMPT),
                ChatMessage::user(user_prompt),
            ],
            max_tokens: STRUCTURED_MAX_TOKENS,
            temperature: TEMPERATURE,
        };

        let response = self.complete(&request).await?;
        Ok(StructuredAnswer::from_response(&response))
    }

    /// Send a minimal request to check connectivity of the active provider
    pub async fn probe(&self) -> Result<()> {
        let request = ChatRequest {
            messages: vec![ChatMessage::user("test")],
            max_tokens: PROBE_MAX_TOKENS,
            temperature: TEMPERATURE,
        };
        self.complete(&request).await.map(|_| ())
    }

    // The first configured provider's result is final; there is no cascade on failure
    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        let provider = self
            .active_provider()
            .ok_or(RagError::NoProviderConfigured)?;
        debug!("Generating with {}", provider.name());

        provider.complete(request).await.map_err(|e| {
            warn!("{} generation failed: {}", provider.name(), e);
            e
        })
    }
}

fn join_passages(passages: &[&str]) -> String {
    passages.join("\n\n")
}

fn simple_prompt(question: &str, passages: &[&str]) -> String {
    format!(
        "Based on the following document context, answer the question:\n\nContext: {}\n\nQuestion: {}\n\nAnswer:",
        join_passages(passages),
        question
    )
}

/// Span from the first `{` to the last `}`, if any
fn json_object_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Read a field case-insensitively, rendering non-string values as JSON
fn field(object: &Map<String, Value>, name: &str) -> String {
    object
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| match value {
            Value::String(s) => s.clone(),
            Value::Null => NO_AMOUNT.to_string(),
            other => other.to_string(),
        })
        .unwrap_or_else(|| NO_AMOUNT.to_string())
}
