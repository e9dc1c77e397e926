//! OpenAI-compatible Provider
//!
//! Speaks the `/chat/completions` and `/embeddings` APIs. Used for OpenAI
//! itself and for OpenRouter, which exposes the same wire format.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::env;
use std::time::Duration;
use tracing::debug;

use crate::core::{Config, Message, PilotError, Result};
use crate::llm::status::{classify_failure, classify_transport, is_policy_refusal};
use crate::llm::traits::{
    EmbeddingProvider, GenerateOptions, LLMProvider, LLMResponse, TokenUsage,
};

const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: String,
    embedding_model: String,
    name: &'static str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    model: String,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiClient {
    /// Build a client for the endpoint in `[openai]`
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::build(
            config,
            config.openai.base_url.clone(),
            config.openai.api_key.clone(),
            "openai",
        )
    }

    /// Build a client for OpenRouter, keyed by `OPENROUTER_API_KEY`
    pub fn openrouter(config: &Config) -> Result<Self> {
        let api_key = env::var("OPENROUTER_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .unwrap_or_else(|| config.openai.api_key.clone());
        Self::build(config, OPENROUTER_BASE_URL.to_string(), api_key, "openrouter")
    }

    fn build(
        config: &Config,
        base_url: String,
        api_key: String,
        name: &'static str,
    ) -> Result<Self> {
        if api_key.is_empty() {
            return Err(PilotError::config(format!(
                "No API key configured for the {} provider",
                name
            )));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.openai.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            embedding_model: config.models.embedding.clone(),
            name,
        })
    }

    /// Convert internal Message into the OpenAI content-part format
    fn to_wire_message(msg: &Message) -> Value {
        match &msg.image {
            Some(image) => json!({
                "role": msg.role.as_str(),
                "content": [
                    { "type": "text", "text": msg.content },
                    { "type": "image_url", "image_url": { "url": image.data_url() } },
                ],
            }),
            None => json!({
                "role": msg.role.as_str(),
                "content": msg.content,
            }),
        }
    }

    /// A user turn carrying a PDF inline as a `file` content part
    fn pdf_message(system: &str, filename: &str, pdf: &[u8], question: &str) -> Vec<Value> {
        vec![
            json!({ "role": "system", "content": system }),
            json!({
                "role": "user",
                "content": [
                    {
                        "type": "file",
                        "file": {
                            "filename": filename,
                            "file_data": format!("data:application/pdf;base64,{}", STANDARD.encode(pdf)),
                        },
                    },
                    { "type": "text", "text": question },
                ],
            }),
        ]
    }

    /// Ask a question about a PDF document
    pub async fn ask_about_pdf(
        &self,
        model: &str,
        system: &str,
        filename: &str,
        pdf: &[u8],
        question: &str,
    ) -> Result<LLMResponse> {
        let request = ChatRequest {
            model,
            messages: Self::pdf_message(system, filename, pdf, question),
            temperature: None,
            max_tokens: None,
            stop: None,
        };

        debug!(provider = self.name, model, bytes = pdf.len(), "pdf request");
        let text = self.post_json("/chat/completions", &request).await?;
        let parsed: ChatResponse = serde_json::from_str(&text).map_err(|e| {
            PilotError::llm(format!("Failed to parse {} response: {}", self.name, e))
        })?;
        self.to_llm_response(parsed)
    }

    fn to_llm_response(&self, response: ChatResponse) -> Result<LLMResponse> {
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| PilotError::llm(format!("{} returned no choices", self.name)))?;

        if choice.finish_reason.as_deref() == Some("content_filter") {
            return Err(PilotError::ContentPolicy(format!(
                "{} response stopped by content filter",
                self.name
            )));
        }

        Ok(LLMResponse {
            content: choice.message.content.unwrap_or_default(),
            usage: response
                .usage
                .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens)),
            model: response.model,
        })
    }

    async fn post_json<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<String> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| classify_transport(self.name, &self.base_url, e))?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(classify_failure(self.name, status, &text));
        }
        Ok(text)
    }
}

#[async_trait]
impl LLMProvider for OpenAiClient {
    async fn chat(
        &self,
        model: &str,
        messages: &[Message],
        options: Option<GenerateOptions>,
    ) -> Result<LLMResponse> {
        let options = options.unwrap_or_default();
        let request = ChatRequest {
            model,
            messages: messages.iter().map(Self::to_wire_message).collect(),
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            stop: options.stop,
        };

        debug!(provider = self.name, model, messages = messages.len(), "chat request");
        let text = self.post_json("/chat/completions", &request).await?;

        // Some gateways report refusals with a 200 and an error body
        if is_policy_refusal(&text) && !text.contains("\"choices\"") {
            return Err(PilotError::ContentPolicy(text));
        }

        let parsed: ChatResponse = serde_json::from_str(&text).map_err(|e| {
            PilotError::llm(format!("Failed to parse {} response: {}", self.name, e))
        })?;
        self.to_llm_response(parsed)
    }

    fn name(&self) -> &str {
        self.name
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = json!({ "model": self.embedding_model, "input": texts });
        let text = self.post_json("/embeddings", &body).await?;
        let mut parsed: EmbeddingResponse = serde_json::from_str(&text)?;
        parsed.data.sort_by_key(|d| d.index);
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}
