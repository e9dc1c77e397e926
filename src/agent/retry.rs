//! Retry policy for LLM calls
//!
//! Transient failures sleep and retry with a per-class backoff; content-policy
//! refusals end the task straight away.

use std::time::Duration;
use tracing::{error, warn};

use crate::core::config::RetryConfig;
use crate::core::{Message, PilotError, Result};
use crate::llm::{GenerateOptions, LLMProvider, LLMResponse};

/// Backoff schedule and retry budget
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub rate_limit_backoff: Duration,
    pub server_backoff: Duration,
    pub other_backoff: Duration,
    /// Total retries across all error classes
    pub max_retries: u32,
}

/// A successful call together with how many retries it took
#[derive(Debug, Clone)]
pub struct RetriedResponse {
    pub response: LLMResponse,
    pub retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            rate_limit_backoff: config.rate_limit_backoff(),
            server_backoff: config.server_backoff(),
            other_backoff: config.other_backoff(),
            max_retries: config.max_retries,
        }
    }

    /// Backoff to apply after `err`, or `None` when the error is final
    pub fn backoff_for(&self, err: &PilotError) -> Option<Duration> {
        if !err.is_retryable() {
            return None;
        }
        Some(match err {
            PilotError::RateLimited(_) => self.rate_limit_backoff,
            PilotError::LlmServer(_) => self.server_backoff,
            _ => self.other_backoff,
        })
    }

    /// Call the model, retrying transient failures within the budget
    pub async fn chat(
        &self,
        llm: &dyn LLMProvider,
        model: &str,
        messages: &[Message],
        options: Option<GenerateOptions>,
    ) -> Result<RetriedResponse> {
        let mut retries = 0u32;

        loop {
            let err = match llm.chat(model, messages, options.clone()).await {
                Ok(response) => return Ok(RetriedResponse { response, retries }),
                Err(err) => err,
            };

            let Some(backoff) = self.backoff_for(&err) else {
                error!(error = %err, "LLM call refused, not retrying");
                return Err(err);
            };

            if retries >= self.max_retries {
                error!(retries, error = %err, "LLM retry budget exhausted");
                return Err(PilotError::llm(format!(
                    "gave up after {} retries: {}",
                    retries, err
                )));
            }

            retries += 1;
            warn!(
                retry = retries,
                backoff_secs = backoff.as_secs(),
                error = %err,
                "LLM call failed, backing off"
            );
            tokio::time::sleep(backoff).await;
        }
    }
}
