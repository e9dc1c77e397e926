//! LLM module - Language Model integrations
//!
//! Provides abstractions for different LLM backends with Ollama as the primary.

pub mod ollama;
pub mod provider;
pub mod status;
pub mod traits;

pub use ollama::OllamaClient;
pub use provider::openai::OpenAiClient;
pub use provider::{create_embedding_provider, create_provider};
pub use traits::{EmbeddingProvider, GenerateOptions, LLMProvider, LLMResponse, TokenUsage};
