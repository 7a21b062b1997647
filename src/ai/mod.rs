use anyhow::Context;
use axum::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::AiConfig;
use crate::state::AppState;
use axum::Router;

pub mod handlers;

pub fn router() -> Router<AppState> {
    handlers::routes()
}

/// One chat-completion message in OpenAI-compatible wire format.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Returns the assistant's text for a single chat completion.
    async fn chat(&self, model: &str, messages: &[ChatMessage]) -> anyhow::Result<String>;
}

/// Client for any OpenAI-compatible /chat/completions endpoint.
#[derive(Clone)]
pub struct OpenAiCompatClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiCompatClient {
    pub fn new(config: &AiConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .context("build ai http client")?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompatClient {
    async fn chat(&self, model: &str, messages: &[ChatMessage]) -> anyhow::Result<String> {
        #[derive(Serialize)]
        struct ChatRequest<'a> {
            model: &'a str,
            messages: &'a [ChatMessage],
        }
        #[derive(Deserialize)]
        struct ChoiceMessage {
            content: Option<String>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMessage,
        }
        #[derive(Deserialize)]
        struct ChatResponse {
            choices: Vec<Choice>,
        }

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&ChatRequest { model, messages })
            .send()
            .await
            .context("chat completion request")?
            .error_for_status()
            .context("chat completion status")?;

        let body: ChatResponse = response.json().await.context("decode chat completion")?;
        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow::anyhow!("completion returned no choices"))?;
        debug!(%model, chars = content.len(), "chat completion ok");
        Ok(content)
    }
}

/// Failures of AI-assisted generation. A model answer that cannot be parsed
/// is a distinct case from the upstream call failing.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("completion call failed: {0}")]
    Upstream(anyhow::Error),
    #[error("model returned unparseable flashcards: {0}")]
    Parse(serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedFlashcard {
    pub term: String,
    pub definition: String,
}

/// Models wrap JSON answers in markdown fences more often than not.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix("```").unwrap_or(trimmed);
    trimmed.trim()
}

pub fn parse_generated_flashcards(text: &str) -> Result<Vec<GeneratedFlashcard>, GenerationError> {
    serde_json::from_str(strip_code_fences(text)).map_err(GenerationError::Parse)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_json_fences() {
        let text = "```json\n[{\"term\":\"a\",\"definition\":\"b\"}]\n```";
        assert_eq!(strip_code_fences(text), "[{\"term\":\"a\",\"definition\":\"b\"}]");
    }

    #[test]
    fn strips_bare_fences_and_whitespace() {
        let text = "  ```\n[]\n```  ";
        assert_eq!(strip_code_fences(text), "[]");
    }

    #[test]
    fn leaves_plain_json_alone() {
        assert_eq!(strip_code_fences("[1, 2]"), "[1, 2]");
    }

    #[test]
    fn parses_fenced_flashcards() {
        let text = "```json\n[{\"term\":\"Osmosis\",\"definition\":\"Movement of water\"}]\n```";
        let cards = parse_generated_flashcards(text).unwrap();
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].term, "Osmosis");
    }

    #[test]
    fn parse_failure_is_a_parse_error() {
        let err = parse_generated_flashcards("the model apologizes instead").unwrap_err();
        assert!(matches!(err, GenerationError::Parse(_)));
    }
}
