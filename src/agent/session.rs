//! Per-task session state
//!
//! Tracks the perceive/decide/act cycle: iteration count, the append-only
//! history, pending observations from the last act, and token totals.

use crate::browser::Snapshot;
use crate::core::Message;
use crate::llm::TokenUsage;

/// State owned by one task run
#[derive(Debug, Clone)]
pub struct AgentSession {
    /// Completed iterations (1-based once the first one starts)
    pub iteration: usize,
    /// Iteration cap
    pub max_iterations: usize,
    /// Full, uncompacted conversation
    pub history: Vec<Message>,
    /// Failure text left by the previous act; skips the next perception
    pub fail_obs: Option<String>,
    /// PDF assistant answer left by the previous act
    pub pdf_obs: Option<String>,
    /// Soft warning left by the previous act
    pub warn_obs: Option<String>,
    /// Raw text of the latest model reply
    pub last_response: Option<String>,
    /// Tokens spent across every LLM call of the task
    pub usage: TokenUsage,
    /// Snapshot the latest decision was made from
    pub last_snapshot: Option<Snapshot>,
    grounding: Option<String>,
}

impl AgentSession {
    /// Start a session with the system prompt as the first message
    pub fn new(system_prompt: impl Into<String>, max_iterations: usize) -> Self {
        Self {
            iteration: 0,
            max_iterations,
            history: vec![Message::system(system_prompt)],
            fail_obs: None,
            pdf_obs: None,
            warn_obs: None,
            last_response: None,
            usage: TokenUsage::default(),
            last_snapshot: None,
            grounding: None,
        }
    }

    pub fn with_grounding(mut self, grounding: Option<String>) -> Self {
        self.grounding = grounding;
        self
    }

    /// Whether another iteration may start
    pub fn should_continue(&self) -> bool {
        self.iteration < self.max_iterations
    }

    /// Advance the counter and return the new iteration number
    pub fn next_iteration(&mut self) -> usize {
        self.iteration += 1;
        self.iteration
    }

    pub fn is_first_iteration(&self) -> bool {
        self.iteration == 1
    }

    /// Grounding context, handed out at most once
    pub fn take_grounding(&mut self) -> Option<String> {
        self.grounding.take()
    }

    pub fn push(&mut self, message: Message) {
        self.history.push(message);
    }

    /// Record a model reply and its token usage
    pub fn record_reply(&mut self, content: &str, usage: &TokenUsage) {
        self.usage.accumulate(usage);
        self.last_response = Some(content.to_string());
        self.history.push(Message::assistant(content));
    }

    /// Leave a failure observation for the next iteration
    pub fn fail(&mut self, text: impl Into<String>) {
        self.fail_obs = Some(text.into());
        self.pdf_obs = None;
        self.warn_obs = None;
    }

    /// Clear observations consumed by a new turn
    pub fn clear_observations(&mut self) {
        self.fail_obs = None;
        self.pdf_obs = None;
        self.warn_obs = None;
    }
}
