//! Ollama backend for embeddings, long-form generation and short-form summaries.
//!
//! This module is only available when the `ollama` feature is enabled.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::embedding::EmbeddingProvider;
use crate::error::{Result, ThemeError};
use crate::generation::{ShortFormSummarizer, TextGenerator};

/// The default Ollama server.
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// The default embedding model (all-MiniLM-L6-v2).
pub const DEFAULT_EMBEDDING_MODEL: &str = "all-minilm";

/// Dimensionality of [`DEFAULT_EMBEDDING_MODEL`].
pub const DEFAULT_DIMENSIONS: usize = 384;

/// The default long-form model.
pub const DEFAULT_CHAT_MODEL: &str = "mistral";

/// The default short-form model.
pub const DEFAULT_SUMMARY_MODEL: &str = "llama3.2:1b";

/// Default input ceiling for the short-form model, in characters.
pub const DEFAULT_MAX_INPUT_CHARS: usize = 2048;

const PROVIDER: &str = "Ollama";

/// A client for a local Ollama server.
///
/// Implements [`EmbeddingProvider`] over `/api/embed`, [`TextGenerator`] over `/api/chat`
/// and [`ShortFormSummarizer`] over `/api/generate`, each with its own model.
///
/// # Example
///
/// ```rust,ignore
/// use adk_themes::ollama::OllamaClient;
///
/// let client = OllamaClient::new("http://localhost:11434").with_chat_model("mistral");
/// let label = client.generate("Name this theme: parking, shuttle, bus").await?;
/// ```
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    embedding_model: String,
    dimensions: usize,
    chat_model: String,
    summary_model: String,
    max_input_chars: usize,
}

impl Default for OllamaClient {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl OllamaClient {
    /// Create a client for the server at `base_url` with the default models.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.into(),
            dimensions: DEFAULT_DIMENSIONS,
            chat_model: DEFAULT_CHAT_MODEL.into(),
            summary_model: DEFAULT_SUMMARY_MODEL.into(),
            max_input_chars: DEFAULT_MAX_INPUT_CHARS,
        }
    }

    /// Set the embedding model and the dimensionality it produces.
    pub fn with_embedding_model(mut self, model: impl Into<String>, dimensions: usize) -> Self {
        self.embedding_model = model.into();
        self.dimensions = dimensions;
        self
    }

    /// Set the long-form model.
    pub fn with_chat_model(mut self, model: impl Into<String>) -> Self {
        self.chat_model = model.into();
        self
    }

    /// Set the short-form model and its input ceiling in characters.
    pub fn with_summary_model(mut self, model: impl Into<String>, max_input_chars: usize) -> Self {
        self.summary_model = model.into();
        self.max_input_chars = max_input_chars;
        self
    }

    async fn post<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        model: &str,
        body: &B,
    ) -> std::result::Result<R, String> {
        let url = format!("{}{path}", self.base_url);
        let response = self.client.post(&url).json(body).send().await.map_err(|e| {
            error!(provider = PROVIDER, model, url = %url, error = %e, "request failed");
            format!("request failed: {e}")
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail =
                serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error).unwrap_or(body);
            error!(provider = PROVIDER, model, %status, "API error");
            return Err(format!("API returned {status}: {detail}"));
        }

        response.json().await.map_err(|e| {
            error!(provider = PROVIDER, model, error = %e, "failed to parse response");
            format!("failed to parse response: {e}")
        })
    }

    fn generation_error(model: &str, message: String) -> ThemeError {
        ThemeError::GenerationFailure { model: model.to_string(), message }
    }
}

// ── Ollama API request/response types ──────────────────────────────

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    num_predict: usize,
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: String,
}

fn summary_instruction(text: &str, max_len: usize, min_len: usize) -> String {
    format!(
        "Summarize the following text in {min_len} to {max_len} words. Reply with the summary \
         only.\n\n{text}"
    )
}

// ── Trait implementations ──────────────────────────────────────────

#[async_trait]
impl EmbeddingProvider for OllamaClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_batch(&[text]).await?;
        results.into_iter().next().ok_or_else(|| ThemeError::Embedding {
            provider: PROVIDER.into(),
            message: "API returned empty response".into(),
        })
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(
            provider = PROVIDER,
            batch_size = texts.len(),
            model = %self.embedding_model,
            "embedding batch"
        );

        let request = EmbedRequest { model: &self.embedding_model, input: texts.to_vec() };
        let response: EmbedResponse = self
            .post("/api/embed", &self.embedding_model, &request)
            .await
            .map_err(|message| ThemeError::Embedding { provider: PROVIDER.into(), message })?;
        Ok(response.embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[async_trait]
impl TextGenerator for OllamaClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        debug!(
            provider = PROVIDER,
            model = %self.chat_model,
            prompt_len = prompt.len(),
            "chat request"
        );
        let request = ChatRequest {
            model: &self.chat_model,
            messages: vec![ChatMessage { role: "user", content: prompt }],
            stream: false,
        };
        let response: ChatResponse = self
            .post("/api/chat", &self.chat_model, &request)
            .await
            .map_err(|message| Self::generation_error(&self.chat_model, message))?;
        Ok(response.message.content.trim().to_string())
    }

    fn model(&self) -> &str {
        &self.chat_model
    }
}

#[async_trait]
impl ShortFormSummarizer for OllamaClient {
    async fn summarize(&self, text: &str, max_len: usize, min_len: usize) -> Result<String> {
        debug!(
            provider = PROVIDER,
            model = %self.summary_model,
            text_len = text.len(),
            "summary request"
        );
        let request = GenerateRequest {
            model: &self.summary_model,
            prompt: summary_instruction(text, max_len, min_len),
            stream: false,
            // Tokens run slightly longer than words.
            options: GenerateOptions { num_predict: max_len * 2, temperature: 0.0 },
        };
        let response: GenerateResponse = self
            .post("/api/generate", &self.summary_model, &request)
            .await
            .map_err(|message| Self::generation_error(&self.summary_model, message))?;
        Ok(response.response.trim().to_string())
    }

    fn max_input_chars(&self) -> usize {
        self.max_input_chars
    }

    fn name(&self) -> &str {
        &self.summary_model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_drops_trailing_slash() {
        let client = OllamaClient::new("http://gpu-box:11434/");
        assert_eq!(client.base_url, "http://gpu-box:11434");
    }

    #[test]
    fn defaults_use_minilm_and_mistral() {
        let client = OllamaClient::default();
        assert_eq!(EmbeddingProvider::dimensions(&client), 384);
        assert_eq!(TextGenerator::model(&client), "mistral");
        assert_eq!(ShortFormSummarizer::max_input_chars(&client), DEFAULT_MAX_INPUT_CHARS);
    }

    #[test]
    fn requests_serialize_to_ollama_shapes() {
        let chat = ChatRequest {
            model: "mistral",
            messages: vec![ChatMessage { role: "user", content: "hi" }],
            stream: false,
        };
        let value = serde_json::to_value(&chat).unwrap();
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["stream"], false);

        let generate = GenerateRequest {
            model: "small",
            prompt: summary_instruction("text", 120, 30),
            stream: false,
            options: GenerateOptions { num_predict: 240, temperature: 0.0 },
        };
        let value = serde_json::to_value(&generate).unwrap();
        assert_eq!(value["options"]["num_predict"], 240);
        assert!(value["prompt"].as_str().unwrap().contains("30 to 120 words"));
    }

    #[test]
    fn responses_parse() {
        let embed: EmbedResponse = serde_json::from_str(r#"{"embeddings": [[0.1, 0.2]]}"#).unwrap();
        assert_eq!(embed.embeddings[0].len(), 2);
        let chat: ChatResponse =
            serde_json::from_str(r#"{"message": {"role": "assistant", "content": " Parking "}}"#)
                .unwrap();
        assert_eq!(chat.message.content, " Parking ");
    }
}
