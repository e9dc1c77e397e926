//! Task definitions and the JSONL task file loader

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::warn;
use url::Url;

use crate::core::error::{PilotError, Result};

/// One unit of work for the agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Task identifier
    pub id: String,
    /// Natural-language question
    pub ques: String,
    /// Start URL
    pub web: String,
    /// Site label used to locate the knowledge base
    #[serde(default)]
    pub web_name: String,
}

impl Task {
    pub fn new(id: impl Into<String>, ques: impl Into<String>, web: impl Into<String>) -> Self {
        let mut task = Self {
            id: id.into(),
            ques: ques.into(),
            web: web.into(),
            web_name: String::new(),
        };
        task.web_name = task.default_site_name();
        task
    }

    /// Set the site label explicitly
    pub fn with_site_name(mut self, name: impl Into<String>) -> Self {
        self.web_name = name.into();
        self
    }

    /// Site label, falling back to the URL host
    pub fn site_name(&self) -> &str {
        &self.web_name
    }

    fn default_site_name(&self) -> String {
        Url::parse(&self.web)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()))
            .unwrap_or_default()
    }
}

/// Raw task line; `id` may be a number or a string in task files
#[derive(Deserialize)]
struct TaskLine {
    id: serde_json::Value,
    ques: String,
    web: String,
    #[serde(default)]
    web_name: Option<String>,
}

/// Load tasks from a JSONL file (one JSON object per line)
///
/// Blank lines are ignored; malformed lines are logged and skipped.
pub fn load_tasks(path: impl AsRef<Path>) -> Result<Vec<Task>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| {
        PilotError::with_context(format!("Failed to read task file {}", path.display()), e)
    })?;

    let mut tasks = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match serde_json::from_str::<TaskLine>(line) {
            Ok(raw) => {
                let id = match raw.id {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                let mut task = Task::new(id, raw.ques, raw.web);
                if let Some(name) = raw.web_name.filter(|n| !n.is_empty()) {
                    task.web_name = name;
                }
                tasks.push(task);
            }
            Err(e) => warn!(line = line_no + 1, "Skipping malformed task line: {}", e),
        }
    }

    Ok(tasks)
}
