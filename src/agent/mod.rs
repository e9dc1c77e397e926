//! Agent module - the perceive/decide/act loop
//!
//! Parses model replies into actions, keeps the context window small, retries
//! LLM calls, and records every task it runs.

pub mod action;
pub mod context_window;
pub mod pdf;
pub mod prompts;
pub mod record;
pub mod retry;
pub mod runner;
pub mod session;

use async_trait::async_trait;
use std::path::Path;

use crate::core::Result;

pub use action::{parse_action, parse_reply, Action, ActionParseError, ScrollDirection, ScrollTarget};
pub use context_window::{compact, compact_multimodal, compact_text_only, ObservationMode};
pub use pdf::ChatPdfAssistant;
pub use prompts::{PromptTemplates, FORCED_ANSWER};
pub use record::{RunRecorder, TaskOutcome, TaskReport};
pub use retry::RetryPolicy;
pub use runner::Agent;
pub use session::AgentSession;

/// Answers a question about a downloaded PDF
#[async_trait]
pub trait PdfAssistant: Send + Sync {
    async fn answer(&self, pdf: &Path, question: &str) -> Result<String>;
}
