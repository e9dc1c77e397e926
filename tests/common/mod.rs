//! Scripted fakes shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use webpilot::agent::{Action, PdfAssistant};
use webpilot::browser::{ActionOutcome, BrowserDriver, PageElement, Snapshot};
use webpilot::core::Message;
use webpilot::llm::{GenerateOptions, LLMProvider, LLMResponse, TokenUsage};
use webpilot::{PilotError, Result};

pub fn reply(text: &str) -> Result<LLMResponse> {
    Ok(LLMResponse {
        content: text.to_string(),
        usage: Some(TokenUsage::new(100, 10)),
        model: "scripted".to_string(),
    })
}

/// Replays a script of results, then repeats a fixed reply
pub struct ScriptedLlm {
    script: Mutex<VecDeque<Result<LLMResponse>>>,
    fallback: String,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedLlm {
    pub fn new(script: Vec<Result<LLMResponse>>) -> Self {
        Self::repeating(script, "Thought: done\nAction: ANSWER; [fallback]")
    }

    pub fn repeating(script: Vec<Result<LLMResponse>>, fallback: &str) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: fallback.to_string(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every message list the model was called with
    pub fn calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl LLMProvider for ScriptedLlm {
    async fn chat(
        &self,
        _model: &str,
        messages: &[Message],
        _options: Option<GenerateOptions>,
    ) -> Result<LLMResponse> {
        self.calls.lock().unwrap().push(messages.to_vec());
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| reply(&self.fallback))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// A page with two labelled elements that records what it is asked to do
pub struct FakeBrowser {
    pub open_fails: bool,
    pub execute_fails: bool,
    pub pdf: Option<PathBuf>,
    executed: Mutex<Vec<Action>>,
    snapshots: Mutex<usize>,
    closed: Mutex<bool>,
}

impl FakeBrowser {
    pub fn new() -> Self {
        Self {
            open_fails: false,
            execute_fails: false,
            pdf: None,
            executed: Mutex::new(Vec::new()),
            snapshots: Mutex::new(0),
            closed: Mutex::new(false),
        }
    }

    pub fn executed(&self) -> Vec<Action> {
        self.executed.lock().unwrap().clone()
    }

    pub fn snapshot_count(&self) -> usize {
        *self.snapshots.lock().unwrap()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock().unwrap()
    }
}

#[async_trait]
impl BrowserDriver for FakeBrowser {
    async fn open(&self, url: &str) -> Result<()> {
        if self.open_fails {
            return Err(PilotError::browser(format!("net::ERR_NAME_NOT_RESOLVED at {}", url)));
        }
        Ok(())
    }

    async fn snapshot(&self) -> Result<Snapshot> {
        let mut count = self.snapshots.lock().unwrap();
        *count += 1;
        Ok(Snapshot::with_elements(
            format!("png-{}", count).into_bytes(),
            vec![
                PageElement::new(1, "input", "Search"),
                PageElement::new(2, "a", "Next page"),
            ],
        ))
    }

    async fn execute(&self, action: &Action, _snapshot: &Snapshot) -> Result<ActionOutcome> {
        self.executed.lock().unwrap().push(action.clone());
        if self.execute_fails {
            return Err(PilotError::browser("element is not visible"));
        }
        Ok(ActionOutcome {
            warning: None,
            downloaded_pdf: self.pdf.clone(),
        })
    }

    async fn close(&self) -> Result<()> {
        *self.closed.lock().unwrap() = true;
        Ok(())
    }
}

/// Always gives the same answer about a PDF
pub struct FixedPdfAssistant(pub String);

#[async_trait]
impl PdfAssistant for FixedPdfAssistant {
    async fn answer(&self, _pdf: &Path, _question: &str) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Text of the newest user message in a call
pub fn last_user(call: &[Message]) -> &Message {
    call.iter().rev().find(|m| m.is_user()).unwrap()
}
