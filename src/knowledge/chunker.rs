//! Type-aware chunking of knowledge documents
//!
//! Markdown is cut at headers and then by size, action logs are grouped into
//! fixed runs of steps, other JSON records stay whole, and plain text goes
//! straight through the size splitter.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Map, Value};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use tracing::info;

use crate::core::config::RagConfig;
use crate::knowledge::document::{DocumentKind, KnowledgeDocument};
use crate::knowledge::splitter::{split_markdown_sections, RecursiveSplitter};

/// Logs with at most this many steps stay in one chunk
pub const MAX_STEPS_PER_LOG_CHUNK: usize = 10;
/// Steps per chunk when a long log is split
pub const STEP_GROUP_SIZE: usize = 5;

/// Inclusive, 1-based range of steps covered by a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepRange {
    pub start: usize,
    pub end: usize,
}

impl StepRange {
    pub fn len(&self) -> usize {
        self.end + 1 - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }
}

impl fmt::Display for StepRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Payload of a chunk
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkBody {
    Text(String),
    /// A JSON record kept whole
    Record(Value),
    /// A run of steps cut from a long action log
    Steps { range: StepRange, record: Value },
}

/// A retrieval unit derived from exactly one document
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub source: String,
    /// Source document identity; differs from `source` for records in
    /// multi-record files
    pub document: String,
    pub kind: DocumentKind,
    /// Position among the chunks of the same document
    pub ordinal: usize,
    pub total: usize,
    pub title: String,
    /// Header breadcrumb for markdown chunks
    pub headers: Vec<String>,
    pub body: ChunkBody,
}

/// Splits documents into chunks
#[derive(Debug, Clone)]
pub struct Chunker {
    splitter: RecursiveSplitter,
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(1000, 200)
    }
}

/// Chunk with the default sizes
pub fn chunk_documents(documents: &[KnowledgeDocument]) -> Vec<Chunk> {
    Chunker::default().chunk_all(documents)
}

static FIRST_HEADER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^#+\s+(.+)$").unwrap());

impl Chunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            splitter: RecursiveSplitter::new(chunk_size, chunk_overlap),
        }
    }

    pub fn from_config(config: &RagConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    pub fn chunk_all(&self, documents: &[KnowledgeDocument]) -> Vec<Chunk> {
        let chunks: Vec<Chunk> = documents.iter().flat_map(|doc| self.chunk(doc)).collect();
        info!(
            documents = documents.len(),
            chunks = chunks.len(),
            "chunked knowledge documents"
        );
        chunks
    }

    /// Chunk one document; ordinals are dense and start at zero
    pub fn chunk(&self, doc: &KnowledgeDocument) -> Vec<Chunk> {
        let parts: Vec<(Vec<String>, ChunkBody)> = match (&doc.kind, &doc.record) {
            (DocumentKind::Json, Some(record)) => chunk_record(record)
                .into_iter()
                .map(|body| (Vec::new(), body))
                .collect(),
            (DocumentKind::Markdown, _) => split_markdown_sections(&doc.content)
                .into_iter()
                .flat_map(|section| {
                    self.splitter
                        .split(&section.text)
                        .into_iter()
                        .map(move |text| (section.headers.clone(), ChunkBody::Text(text)))
                })
                .collect(),
            _ => self
                .splitter
                .split(&doc.content)
                .into_iter()
                .map(|text| (Vec::new(), ChunkBody::Text(text)))
                .collect(),
        };

        let total = parts.len();
        parts
            .into_iter()
            .enumerate()
            .map(|(ordinal, (headers, body))| Chunk {
                source: doc.source.clone(),
                document: doc.identity(),
                kind: doc.kind,
                ordinal,
                total,
                title: chunk_title(doc, &body, ordinal),
                headers,
                body,
            })
            .collect()
    }
}

/// Whether a record is an ordered action log
pub fn is_action_log(record: &Value) -> bool {
    record.get("task_description").is_some()
        && record.get("actions").map(Value::is_array).unwrap_or(false)
}

fn chunk_record(record: &Value) -> Vec<ChunkBody> {
    let actions = match record.get("actions").and_then(Value::as_array) {
        Some(actions) if is_action_log(record) => actions,
        _ => return vec![ChunkBody::Record(record.clone())],
    };

    if actions.len() <= MAX_STEPS_PER_LOG_CHUNK {
        return vec![ChunkBody::Record(record.clone())];
    }

    actions
        .chunks(STEP_GROUP_SIZE)
        .enumerate()
        .map(|(group, steps)| {
            let start = group * STEP_GROUP_SIZE + 1;
            let range = StepRange {
                start,
                end: start + steps.len() - 1,
            };
            let action_types: BTreeSet<&str> = steps
                .iter()
                .filter_map(|a| a.get("type").and_then(Value::as_str))
                .collect();

            ChunkBody::Steps {
                range,
                record: json!({
                    "task_description": record["task_description"],
                    "timestamp": record.get("timestamp").cloned().unwrap_or_else(|| json!("")),
                    "sequence_range": range.to_string(),
                    "actions": steps,
                    "action_types": action_types,
                }),
            }
        })
        .collect()
}

fn chunk_title(doc: &KnowledgeDocument, body: &ChunkBody, ordinal: usize) -> String {
    let part = ordinal + 1;
    match body {
        ChunkBody::Text(text) => {
            if doc.kind == DocumentKind::Markdown {
                if let Some(caps) = FIRST_HEADER.captures(text) {
                    return caps[1].trim().to_string();
                }
            }
            match &doc.title {
                Some(title) => format!("{} (Part {})", title, part),
                None => format!("Section {}", part),
            }
        }
        ChunkBody::Record(record) | ChunkBody::Steps { record, .. } => {
            if let Some(title) = record.get("title").and_then(Value::as_str) {
                title.to_string()
            } else if let Some(name) = record.get("name").and_then(Value::as_str) {
                format!("{} (JSON Part {})", name, part)
            } else if let Some(id) = record.get("id") {
                format!("JSON Item {}", display_value(id))
            } else {
                format!("JSON Part {}", part)
            }
        }
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

static CODE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"```[\s\S]*?```").unwrap());
static INLINE_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`]+)`").unwrap());
static HEADER_MARK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^#+\s+(.+)$").unwrap());
static BOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*(.+?)\*\*").unwrap());
static ITALIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*(.+?)\*").unwrap());
static BULLET: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*[-*+]\s+").unwrap());

/// Strip markdown syntax, keeping the words
pub fn strip_markdown(text: &str) -> String {
    let text = CODE_FENCE.replace_all(text, "");
    let text = INLINE_CODE.replace_all(&text, "$1");
    let text = HEADER_MARK.replace_all(&text, "$1");
    let text = BOLD.replace_all(&text, "$1");
    let text = ITALIC.replace_all(&text, "$1");
    let text = BULLET.replace_all(&text, "");
    text.trim().to_string()
}

impl Chunk {
    /// Text sent to the embedding model
    pub fn embedding_text(&self) -> String {
        match &self.body {
            ChunkBody::Text(text) if self.kind == DocumentKind::Markdown => strip_markdown(text),
            ChunkBody::Text(text) => text.clone(),
            ChunkBody::Record(record) | ChunkBody::Steps { record, .. } => record.to_string(),
        }
    }

    /// The record carried by a JSON chunk
    pub fn record(&self) -> Option<&Value> {
        match &self.body {
            ChunkBody::Record(record) | ChunkBody::Steps { record, .. } => Some(record),
            ChunkBody::Text(_) => None,
        }
    }

    pub fn step_range(&self) -> Option<StepRange> {
        match &self.body {
            ChunkBody::Steps { range, .. } => Some(*range),
            _ => None,
        }
    }

    /// Context block shown to the grounding model
    pub fn render(&self) -> String {
        let mut out = format!("## {}\n\n", self.title);

        match &self.body {
            ChunkBody::Text(text) => {
                out.push_str(text);
                out.push_str("\n\n");
            }
            ChunkBody::Record(record) | ChunkBody::Steps { record, .. } if is_action_log(record) => {
                render_action_log(record, self.step_range(), &mut out);
            }
            ChunkBody::Record(record) | ChunkBody::Steps { record, .. } => {
                let shown = match record {
                    Value::Object(map) => Value::Object(
                        map.iter()
                            .filter(|(k, _)| !matches!(k.as_str(), "type" | "source"))
                            .map(|(k, v)| (k.clone(), v.clone()))
                            .collect::<Map<String, Value>>(),
                    ),
                    other => other.clone(),
                };
                let pretty =
                    serde_json::to_string_pretty(&shown).unwrap_or_else(|_| shown.to_string());
                out.push_str(&pretty);
                out.push('\n');
            }
        }

        out.push_str(&format!("Source: {}\n\n", self.source));
        out
    }
}

fn field<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or("")
}

fn first_non_empty<'a>(candidates: &[&'a str]) -> &'a str {
    candidates.iter().copied().find(|s| !s.is_empty()).unwrap_or("")
}

/// Render a log as a numbered action list, dropping repeated navigations and
/// consecutive duplicates of non-input steps
fn render_action_log(record: &Value, range: Option<StepRange>, out: &mut String) {
    out.push_str(&format!("### Web Task: {}\n", field(record, "task_description")));
    if let Some(range) = range {
        out.push_str(&format!("**Actions Sequence**: {}\n", range));
    }
    out.push_str("\n**Actions**:\n");

    let actions = record
        .get("actions")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let mut visited = HashSet::new();
    let mut previous: Option<&str> = None;

    for action in actions {
        let kind = field(action, "type");
        let order = action
            .get("order")
            .map(display_value)
            .unwrap_or_default();
        let element = action.get("element").or_else(|| action.get("element_info"));
        let element_field = |key: &str| element.map(|e| field(e, key)).unwrap_or("");
        let elements_text = field(action, "elements_text");

        if kind == "Navigate" && !visited.insert(field(action, "url").to_string()) {
            continue;
        }
        if previous == Some(kind) && !matches!(kind, "Click" | "Type" | "answer") {
            continue;
        }
        previous = Some(kind);

        let line = match kind {
            "Navigate" => format!(
                "- [{}] Navigate to {} ({})",
                order,
                field(action, "url"),
                field(action, "page_title")
            ),
            "Click" => format!(
                "- [{}] Click {}: {}",
                order,
                element_field("tagName"),
                first_non_empty(&[element_field("text"), elements_text])
            ),
            "Type" => format!(
                "- [{}] Type: {}",
                order,
                first_non_empty(&[
                    field(action, "input_value"),
                    element_field("value"),
                    elements_text
                ])
            ),
            "answer" => format!("- [{}] Complete: {}", order, elements_text),
            other => format!("- [{}] {}", order, other),
        };
        out.push_str(&line);
        out.push('\n');
    }
}
