//! Ollama client implementation
//!
//! Async HTTP client for the Ollama chat and embedding APIs, with image support.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::core::{Config, Message, PilotError, Result};
use crate::llm::status::{classify_failure, classify_transport};
use crate::llm::traits::{
    EmbeddingProvider, GenerateOptions, LLMProvider, LLMResponse, TokenUsage,
};

/// Ollama API client
#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    embedding_model: String,
}

/// Ollama chat request
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
    stream: bool,
}

/// Ollama message format
#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    images: Option<Vec<String>>,
}

/// Ollama generation options
#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
}

/// Ollama chat response (non-streaming)
#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: OllamaMessage,
    model: String,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaClient {
    /// Create a new Ollama client from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.ollama.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.ollama_url(),
            embedding_model: config.models.embedding.clone(),
        })
    }

    /// Create a client with custom base URL
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            embedding_model: "nomic-embed-text".to_string(),
        }
    }

    /// Convert internal Message to Ollama format
    fn to_ollama_message(msg: &Message) -> OllamaMessage {
        OllamaMessage {
            role: msg.role.as_str().to_string(),
            content: msg.content.clone(),
            images: msg.image.as_ref().map(|img| vec![img.data.clone()]),
        }
    }

    /// Convert Ollama response to LLMResponse
    fn to_llm_response(response: ChatResponse) -> LLMResponse {
        let usage = match (response.prompt_eval_count, response.eval_count) {
            (Some(prompt), Some(completion)) => Some(TokenUsage::new(prompt, completion)),
            _ => None,
        };

        LLMResponse {
            content: response.message.content,
            usage,
            model: response.model,
        }
    }

    async fn post_json<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<String> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await
            .map_err(|e| classify_transport("Ollama", &self.base_url, e))?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(classify_failure("Ollama", status, &text));
        }
        Ok(text)
    }
}

#[async_trait]
impl LLMProvider for OllamaClient {
    async fn chat(
        &self,
        model: &str,
        messages: &[Message],
        options: Option<GenerateOptions>,
    ) -> Result<LLMResponse> {
        let request = ChatRequest {
            model,
            messages: messages.iter().map(Self::to_ollama_message).collect(),
            options: options.map(|opts| OllamaOptions {
                temperature: opts.temperature,
                num_predict: opts.max_tokens,
                stop: opts.stop,
            }),
            stream: false,
        };

        debug!(model, messages = messages.len(), "Ollama chat request");
        let response_text = self.post_json("/api/chat", &request).await?;

        let chat_response: ChatResponse = serde_json::from_str(&response_text)
            .map_err(|e| PilotError::llm(format!("Failed to parse Ollama response: {}", e)))?;

        Ok(Self::to_llm_response(chat_response))
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbedRequest {
            model: &self.embedding_model,
            input: texts,
        };
        let response_text = self.post_json("/api/embed", &request).await?;
        let parsed: EmbedResponse = serde_json::from_str(&response_text)?;
        Ok(parsed.embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ImageAttachment;

    #[test]
    fn test_client_creation() {
        let client = OllamaClient::with_base_url("http://localhost:11434");
        assert_eq!(client.base_url, "http://localhost:11434");
    }

    #[test]
    fn test_client_from_config() {
        let mut config = Config::default();
        config.ollama.timeout_secs = 5;
        config.models.embedding = "mxbai-embed-large".to_string();
        let client = OllamaClient::from_config(&config).unwrap();
        assert_eq!(client.base_url, config.ollama_url());
        assert_eq!(client.embedding_model, "mxbai-embed-large");
    }

    #[test]
    fn test_message_conversion_carries_image() {
        let msg = Message::user("Observation: page").with_image(ImageAttachment::png(b"png"));
        let ollama_msg = OllamaClient::to_ollama_message(&msg);
        assert_eq!(ollama_msg.role, "user");
        assert_eq!(ollama_msg.images.unwrap(), vec!["cG5n".to_string()]);
    }

    #[test]
    fn test_response_usage() {
        let raw = r#"{"model":"m","message":{"role":"assistant","content":"Thought: x"},"prompt_eval_count":12,"eval_count":3}"#;
        let response = OllamaClient::to_llm_response(serde_json::from_str(raw).unwrap());
        assert_eq!(response.usage.unwrap(), TokenUsage::new(12, 3));
    }
}
