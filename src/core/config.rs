//! Configuration management for webpilot
//!
//! Supports environment variables, config files, and runtime overrides.
//!
//! Config file location: ~/.config/webpilot/config.toml

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::core::error::{PilotError, Result};

/// Main configuration for webpilot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Which LLM backend to talk to
    #[serde(default)]
    pub provider: ProviderType,
    /// Ollama configuration
    #[serde(default)]
    pub ollama: OllamaConfig,
    /// OpenAI-compatible endpoint configuration
    #[serde(default)]
    pub openai: OpenAiConfig,
    /// Model configuration
    #[serde(default)]
    pub models: ModelConfig,
    /// Browser configuration
    #[serde(default)]
    pub browser: BrowserConfig,
    /// Agent loop configuration
    #[serde(default)]
    pub agent: AgentConfig,
    /// LLM retry policy
    #[serde(default)]
    pub retry: RetryConfig,
    /// Retrieval configuration
    #[serde(default)]
    pub rag: RagConfig,
}

/// Supported LLM backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    #[default]
    Ollama,
    OpenAi,
    OpenRouter,
}

impl std::str::FromStr for ProviderType {
    type Err = PilotError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAi),
            "openrouter" => Ok(Self::OpenRouter),
            other => Err(PilotError::config(format!("Unknown provider '{}'", other))),
        }
    }
}

/// Ollama server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Host address (default: localhost)
    pub host: String,
    /// Port number (default: 11434)
    pub port: u16,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

/// OpenAI-compatible endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// Base URL including the version segment
    pub base_url: String,
    /// API key (falls back to OPENAI_API_KEY)
    #[serde(default)]
    pub api_key: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

/// Model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model that drives the browsing loop
    pub agent: String,
    /// Model used for query rewriting and grounded answers
    pub retrieval: String,
    /// Embedding model
    pub embedding: String,
    /// Sampling temperature for the agent model
    pub temperature: f32,
}

/// Browser automation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Session name for agent-browser
    pub session_name: String,
    /// Whether to run in headed mode (visible browser)
    pub headed: bool,
    /// Observe pages through the accessibility tree instead of screenshots
    pub text_only: bool,
    /// Viewport height, used for window scroll distance
    pub window_height: u32,
    /// Directory watched for downloaded files
    pub download_dir: PathBuf,
    /// Fixed delay after each action, modelling page-load latency
    pub settle_ms: u64,
    /// Wait after a click changes the download directory
    #[serde(default = "default_download_settle_ms")]
    pub download_settle_ms: u64,
}

fn default_download_settle_ms() -> u64 {
    10_000
}

/// Agent loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum perceive/decide/act cycles per task
    /// Default: 5
    pub max_iterations: usize,
    /// Observation turns kept with full payload when calling the LLM
    /// Default: 1
    pub max_attached_images: usize,
    /// Whether to show debug output
    pub debug: bool,
    /// Root directory for task records
    pub output_dir: PathBuf,
    /// Write each perceived screenshot into the task directory
    pub save_screenshots: bool,
}

/// Retry/backoff policy for LLM calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub rate_limit_backoff_secs: u64,
    pub server_backoff_secs: u64,
    pub other_backoff_secs: u64,
    /// Total retries allowed before the task is aborted
    pub max_retries: u32,
}

/// Retrieval-augmented context configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    /// Whether to query the knowledge base before each task
    pub enabled: bool,
    /// Directory holding one sub-directory per site
    pub knowledge_root: PathBuf,
    /// Number of chunks retrieved per query
    pub top_k: usize,
    /// Target chunk size in characters
    pub chunk_size: usize,
    /// Overlap between neighbouring chunks in characters
    pub chunk_overlap: usize,
    /// Vector dimension used when the embedding provider is unavailable
    pub fallback_dimension: usize,
}

fn env_flag(name: &str, default: bool) -> bool {
    env::var(name)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(default)
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: env::var("OLLAMA_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: env::var("OLLAMA_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(11434),
            timeout_secs: 120,
        }
    }
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            api_key: env::var("OPENAI_API_KEY").unwrap_or_default(),
            timeout_secs: 120,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            agent: env::var("WEBPILOT_AGENT_MODEL").unwrap_or_else(|_| "qwen2.5vl:7b".to_string()),
            retrieval: env::var("WEBPILOT_RETRIEVAL_MODEL")
                .unwrap_or_else(|_| "qwen3:8b".to_string()),
            embedding: env::var("WEBPILOT_EMBEDDING_MODEL")
                .unwrap_or_else(|_| "nomic-embed-text".to_string()),
            temperature: 1.0,
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            session_name: env::var("WEBPILOT_BROWSER_SESSION")
                .unwrap_or_else(|_| "webpilot".to_string()),
            headed: env_flag("WEBPILOT_BROWSER_HEADED", false),
            text_only: env_flag("WEBPILOT_TEXT_ONLY", false),
            window_height: 768,
            download_dir: PathBuf::from("downloads"),
            settle_ms: 3000,
            download_settle_ms: default_download_settle_ms(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            max_attached_images: 1,
            debug: env_flag("WEBPILOT_DEBUG", false),
            output_dir: PathBuf::from("results"),
            save_screenshots: true,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            rate_limit_backoff_secs: 10,
            server_backoff_secs: 15,
            other_backoff_secs: 2,
            max_retries: 10,
        }
    }
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            enabled: env_flag("WEBPILOT_USE_RAG", false),
            knowledge_root: env::var("WEBPILOT_KNOWLEDGE_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data/knowledge")),
            top_k: 5,
            chunk_size: 1000,
            chunk_overlap: 200,
            fallback_dimension: 768,
        }
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("webpilot")
    }

    /// Get the config file path
    pub fn config_file() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load configuration from file, environment, and defaults
    /// Priority: CLI args > env vars > config file > defaults
    pub fn load() -> Self {
        let _ = dotenvy::dotenv();

        if let Ok(config) = Self::load_from_file() {
            return config;
        }

        // Fall back to defaults (which respect env vars)
        Self::default()
    }

    /// Load configuration from file only
    pub fn load_from_file() -> Result<Self> {
        let config_path = Self::config_file();

        if !config_path.exists() {
            return Err(PilotError::config("Config file not found"));
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|e| PilotError::config(format!("Failed to read config: {}", e)))?;

        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text; missing sections take defaults
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| PilotError::config(format!("Failed to parse config: {}", e)))
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<PathBuf> {
        let config_dir = Self::config_dir();
        let config_path = Self::config_file();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .map_err(|e| PilotError::config(format!("Failed to create config dir: {}", e)))?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| PilotError::config(format!("Failed to serialize config: {}", e)))?;

        fs::write(&config_path, content)
            .map_err(|e| PilotError::config(format!("Failed to write config: {}", e)))?;

        Ok(config_path)
    }

    /// Get the full Ollama API URL
    pub fn ollama_url(&self) -> String {
        format!("http://{}:{}", self.ollama.host, self.ollama.port)
    }

    /// Generate a default config file content for display
    pub fn default_config_toml() -> String {
        toml::to_string_pretty(&Config::default())
            .unwrap_or_else(|_| String::from("# Error generating config"))
    }
}

impl RetryConfig {
    pub fn rate_limit_backoff(&self) -> Duration {
        Duration::from_secs(self.rate_limit_backoff_secs)
    }

    pub fn server_backoff(&self) -> Duration {
        Duration::from_secs(self.server_backoff_secs)
    }

    pub fn other_backoff(&self) -> Duration {
        Duration::from_secs(self.other_backoff_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.provider, ProviderType::Ollama);
        assert_eq!(config.ollama.port, 11434);
        assert_eq!(config.agent.max_iterations, 5);
        assert_eq!(config.agent.max_attached_images, 1);
        assert_eq!(config.retry.rate_limit_backoff_secs, 10);
        assert_eq!(config.retry.server_backoff_secs, 15);
        assert_eq!(config.retry.max_retries, 10);
        assert_eq!(config.rag.top_k, 5);
        assert_eq!(config.rag.chunk_size, 1000);
        assert_eq!(config.rag.chunk_overlap, 200);
    }

    #[test]
    fn test_ollama_url() {
        let config = Config::default();
        assert_eq!(
            config.ollama_url(),
            format!("http://{}:{}", config.ollama.host, config.ollama.port)
        );
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = Config::from_toml(
            r#"
provider = "openrouter"

[agent]
max_iterations = 12
max_attached_images = 3
debug = false
output_dir = "out"
save_screenshots = false
"#,
        )
        .unwrap();
        assert_eq!(config.provider, ProviderType::OpenRouter);
        assert_eq!(config.agent.max_iterations, 12);
        assert_eq!(config.retry.max_retries, 10);
    }

    #[test]
    fn test_provider_from_str() {
        assert_eq!("OpenAI".parse::<ProviderType>().unwrap(), ProviderType::OpenAi);
        assert!("claude".parse::<ProviderType>().is_err());
    }

    #[test]
    fn test_config_serialization() {
        let toml_str = Config::default_config_toml();
        assert!(toml_str.contains("max_iterations"));
        assert!(toml_str.contains("knowledge_root"));
    }
}
