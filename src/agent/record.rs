//! Task outcomes and their on-disk record
//!
//! Each run gets a timestamped directory; each task a `task<id>` folder with
//! the redacted conversation, the answer, and a JSON report.

use chrono::Local;
use serde::Serialize;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::core::{Message, PilotError, Result};
use crate::knowledge::EmbeddingMode;
use crate::llm::TokenUsage;

/// Stand-in for screenshot bytes in persisted histories
pub const REDACTED_IMAGE: &str = "data:image/png;base64,{b64_img}";

/// How a task ended; exactly one per task
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskOutcome {
    /// The model issued an `ANSWER` action
    Answered,
    /// The iteration cap was reached and the forced answer recorded
    IterationLimit,
    /// A fatal error ended the task
    Aborted { reason: String },
}

impl TaskOutcome {
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }
}

/// Summary of one task run
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub task_id: String,
    pub outcome: TaskOutcome,
    /// Final answer, explicit or forced; empty when aborted
    pub answer: String,
    pub iterations: usize,
    /// Tokens across the loop and retrieval calls
    pub usage: TokenUsage,
    /// How retrieval vectors were produced, when retrieval ran
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_mode: Option<EmbeddingMode>,
}

/// Writes task records under one run directory
#[derive(Debug, Clone)]
pub struct RunRecorder {
    run_dir: PathBuf,
}

impl RunRecorder {
    /// Create `<output_dir>/<timestamp>/`
    pub fn create(output_dir: &Path) -> Result<Self> {
        let stamp = Local::now().format("%Y%m%d_%H_%M_%S").to_string();
        Self::at(output_dir.join(stamp))
    }

    /// Use an explicit run directory
    pub fn at(run_dir: impl Into<PathBuf>) -> Result<Self> {
        let run_dir = run_dir.into();
        fs::create_dir_all(&run_dir).map_err(|e| {
            PilotError::with_context(format!("creating {}", run_dir.display()), e)
        })?;
        Ok(Self { run_dir })
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Per-task directory; characters outside `[A-Za-z0-9_-]` in the id
    /// become `_` so the id stays a single path component
    pub fn task_dir(&self, task_id: &str) -> PathBuf {
        let safe: String = task_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.run_dir.join(format!("task{}", safe))
    }

    fn ensure_task_dir(&self, task_id: &str) -> Result<PathBuf> {
        let dir = self.task_dir(task_id);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Save the screenshot perceived in `iteration`
    pub fn save_screenshot(&self, task_id: &str, iteration: usize, png: &[u8]) -> Result<PathBuf> {
        let path = self
            .ensure_task_dir(task_id)?
            .join(format!("screenshot{}.png", iteration));
        fs::write(&path, png)?;
        debug!(path = %path.display(), "saved screenshot");
        Ok(path)
    }

    /// Persist history, answer and report for a finished task
    pub fn save_task(&self, report: &TaskReport, history: &[Message]) -> Result<PathBuf> {
        let dir = self.ensure_task_dir(&report.task_id)?;

        let messages = serde_json::to_string_pretty(&redact_history(history))?;
        fs::write(dir.join("interact_messages.json"), messages)?;
        fs::write(dir.join("answer.txt"), &report.answer)?;
        if let TaskOutcome::Aborted { reason } = &report.outcome {
            fs::write(dir.join("abort_reason.txt"), reason)?;
        }
        fs::write(dir.join("result.json"), serde_json::to_string_pretty(report)?)?;

        info!(task = %report.task_id, dir = %dir.display(), "task record saved");
        Ok(dir)
    }

    /// Aggregate all task reports into `results.json`
    pub fn save_results(&self, reports: &[TaskReport]) -> Result<PathBuf> {
        let path = self.run_dir.join("results.json");
        fs::write(&path, serde_json::to_string_pretty(reports)?)?;
        Ok(path)
    }
}

/// History as JSON with every image payload replaced by a placeholder
pub fn redact_history(history: &[Message]) -> Vec<Value> {
    history
        .iter()
        .map(|msg| {
            let mut entry = json!({
                "role": msg.role.as_str(),
                "content": msg.content,
            });
            if msg.has_image() {
                entry["image"] = json!(REDACTED_IMAGE);
            }
            if let Some(context) = &msg.context {
                entry["context"] = json!(context);
            }
            if msg.compacted {
                entry["compacted"] = json!(true);
            }
            entry
        })
        .collect()
}
