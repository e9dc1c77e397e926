//! Knowledge document loading
//!
//! Reads one site's knowledge directory. Markdown, JSON, JSONL and plain
//! text are understood; anything else is skipped.

use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::core::Result;

/// Format of a knowledge document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Markdown,
    Json,
    Text,
}

/// One raw document from the knowledge base
#[derive(Debug, Clone, PartialEq)]
pub struct KnowledgeDocument {
    /// File name the document came from
    pub source: String,
    pub kind: DocumentKind,
    /// Raw text; for JSON the serialized record
    pub content: String,
    pub title: Option<String>,
    /// Parsed record for JSON documents
    pub record: Option<Value>,
    /// 1-based position of the record in a multi-record file
    pub record_index: Option<usize>,
}

impl KnowledgeDocument {
    pub fn markdown(source: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        let title = content
            .lines()
            .find_map(|line| line.strip_prefix("# "))
            .map(|t| t.trim().to_string());
        Self {
            source: source.into(),
            kind: DocumentKind::Markdown,
            content,
            title,
            record: None,
            record_index: None,
        }
    }

    pub fn text(source: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            kind: DocumentKind::Text,
            content: content.into(),
            title: None,
            record: None,
            record_index: None,
        }
    }

    pub fn json(source: impl Into<String>, record: Value) -> Self {
        let title = record
            .get("title")
            .and_then(Value::as_str)
            .map(str::to_string);
        Self {
            source: source.into(),
            kind: DocumentKind::Json,
            content: record.to_string(),
            title,
            record: Some(record),
            record_index: None,
        }
    }

    /// Mark the document as record `index` of its file.
    pub fn at_record(mut self, index: usize) -> Self {
        self.record_index = Some(index);
        self
    }

    /// Identity of the record: the file name, plus `#n` inside JSONL files
    /// and JSON arrays.
    pub fn identity(&self) -> String {
        match self.record_index {
            Some(index) => format!("{}#{}", self.source, index),
            None => self.source.clone(),
        }
    }
}

/// Load every supported file in `dir`, in file-name order.
///
/// A missing directory yields an empty list. Unreadable files and malformed
/// records are logged and skipped.
pub fn load_documents(dir: &Path) -> Result<Vec<KnowledgeDocument>> {
    if !dir.exists() {
        warn!(dir = %dir.display(), "knowledge directory does not exist");
        return Ok(Vec::new());
    }

    let mut paths: Vec<_> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    paths.sort();

    let mut documents = Vec::new();
    for path in paths {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();

        if !matches!(extension.as_str(), "md" | "json" | "jsonl" | "txt") {
            continue;
        }

        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                warn!(file = %name, error = %e, "failed to read knowledge file");
                continue;
            }
        };

        match extension.as_str() {
            "md" => documents.push(KnowledgeDocument::markdown(&name, content)),
            "txt" => documents.push(KnowledgeDocument::text(&name, content)),
            "jsonl" => documents.extend(parse_jsonl(&name, &content)),
            _ => documents.extend(parse_json(&name, &content)),
        }
    }

    info!(dir = %dir.display(), count = documents.len(), "loaded knowledge documents");
    Ok(documents)
}

fn parse_json(name: &str, content: &str) -> Vec<KnowledgeDocument> {
    match serde_json::from_str::<Value>(content) {
        Ok(Value::Array(items)) => items
            .into_iter()
            .enumerate()
            .filter_map(|(i, item)| record_document(name, item).map(|d| d.at_record(i + 1)))
            .collect(),
        Ok(value) => record_document(name, value).into_iter().collect(),
        Err(e) => {
            warn!(file = %name, error = %e, "malformed JSON knowledge file");
            Vec::new()
        }
    }
}

fn parse_jsonl(name: &str, content: &str) -> Vec<KnowledgeDocument> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(n, line)| match serde_json::from_str::<Value>(line) {
            Ok(value) => record_document(name, value).map(|d| d.at_record(n + 1)),
            Err(e) => {
                warn!(file = %name, line = n + 1, error = %e, "malformed JSONL line");
                None
            }
        })
        .collect()
}

fn record_document(name: &str, value: Value) -> Option<KnowledgeDocument> {
    if value.is_object() {
        Some(KnowledgeDocument::json(name, value))
    } else {
        warn!(file = %name, "skipping non-object JSON record");
        None
    }
}
