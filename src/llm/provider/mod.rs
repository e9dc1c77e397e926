//! LLM Provider implementations and factory
//!
//! Submodules implement non-Ollama providers.

pub mod openai;

use std::sync::Arc;

use crate::core::config::{Config, ProviderType};
use crate::core::Result;
use crate::llm::traits::{EmbeddingProvider, LLMProvider};
use crate::llm::OllamaClient;

use self::openai::OpenAiClient;

/// Create a new LLM provider based on configuration
pub fn create_provider(config: &Config) -> Result<Arc<dyn LLMProvider>> {
    let provider: Arc<dyn LLMProvider> = match config.provider {
        ProviderType::Ollama => Arc::new(OllamaClient::from_config(config)?),
        ProviderType::OpenAi => Arc::new(OpenAiClient::from_config(config)?),
        ProviderType::OpenRouter => Arc::new(OpenAiClient::openrouter(config)?),
    };
    Ok(provider)
}

/// Create the embedding provider matching the configured backend
pub fn create_embedding_provider(config: &Config) -> Result<Arc<dyn EmbeddingProvider>> {
    let provider: Arc<dyn EmbeddingProvider> = match config.provider {
        ProviderType::Ollama => Arc::new(OllamaClient::from_config(config)?),
        ProviderType::OpenAi => Arc::new(OpenAiClient::from_config(config)?),
        ProviderType::OpenRouter => Arc::new(OpenAiClient::openrouter(config)?),
    };
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_ollama_provider() {
        let config = Config::default();
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.name(), "ollama");
    }

    #[test]
    fn test_openai_requires_key() {
        let mut config = Config::default();
        config.provider = ProviderType::OpenAi;
        config.openai.api_key = String::new();
        assert!(create_provider(&config).is_err());

        config.openai.api_key = "sk-test".to_string();
        assert_eq!(create_provider(&config).unwrap().name(), "openai");
    }
}
