//! Custom error types for webpilot
//!
//! Provides a unified error handling system across all modules.

use thiserror::Error;

/// Main error type for webpilot operations
#[derive(Error, Debug)]
pub enum PilotError {
    /// LLM call failed for a reason that is not otherwise classified
    #[error("LLM error: {0}")]
    Llm(String),

    /// Provider rejected the call because of rate limiting
    #[error("LLM rate limited: {0}")]
    RateLimited(String),

    /// Provider returned a server-side failure
    #[error("LLM server error: {0}")]
    LlmServer(String),

    /// Provider rejected the request itself (bad key, unknown model, malformed body)
    #[error("LLM request rejected: {0}")]
    LlmRejected(String),

    /// Provider refused the request on content-policy grounds
    #[error("Content policy violation: {0}")]
    ContentPolicy(String),

    /// Browser automation errors
    #[error("Browser error: {0}")]
    Browser(String),

    /// Knowledge base loading / retrieval errors
    #[error("Knowledge base error: {0}")]
    Knowledge(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON parsing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Agent-browser not installed
    #[error("agent-browser not found. Install with: npm install -g agent-browser && agent-browser install")]
    AgentBrowserNotFound,

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Generic error for other cases
    #[error("{0}")]
    Other(String),
}

/// Convenience Result type for webpilot operations
pub type Result<T> = std::result::Result<T, PilotError>;

impl PilotError {
    /// Create a generic LLM error
    pub fn llm(msg: impl Into<String>) -> Self {
        Self::Llm(msg.into())
    }

    /// Create a browser error
    pub fn browser(msg: impl Into<String>) -> Self {
        Self::Browser(msg.into())
    }

    /// Create a knowledge base error
    pub fn knowledge(msg: impl Into<String>) -> Self {
        Self::Knowledge(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Wrap an error with additional context
    pub fn with_context<E>(context: impl Into<String>, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::WithContext {
            context: context.into(),
            source: Box::new(error),
        }
    }

    /// Whether a failed LLM call may be attempted again.
    ///
    /// Content-policy violations and rejected requests are final; everything
    /// else is treated as transient by the retry policy.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::ContentPolicy(_) | Self::LlmRejected(_))
    }
}
