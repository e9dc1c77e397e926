//! Text splitting primitives
//!
//! A recursive character splitter that prefers paragraph and sentence breaks,
//! and a markdown splitter that cuts at `#` to `####` headers.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// Separators tried in order, coarsest first
pub const DEFAULT_SEPARATORS: &[&str] = &["\n\n", "\n", "。", "！", "？", "，", " ", ""];

/// Splits text into chunks of at most `chunk_size` characters where possible,
/// with up to `chunk_overlap` characters carried between neighbours
#[derive(Debug, Clone)]
pub struct RecursiveSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl RecursiveSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            chunk_overlap: chunk_overlap.min(chunk_size.saturating_sub(1)),
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_with(text, &self.separators)
    }

    fn split_with(&self, text: &str, separators: &[String]) -> Vec<String> {
        let mut separator: &str = "";
        let mut remaining: &[String] = &[];
        for (i, candidate) in separators.iter().enumerate() {
            if candidate.is_empty() {
                break;
            }
            if text.contains(candidate.as_str()) {
                separator = candidate.as_str();
                remaining = &separators[i + 1..];
                break;
            }
        }

        let mut chunks = Vec::new();
        let mut pending: Vec<String> = Vec::new();

        for piece in split_keeping_separator(text, separator) {
            if char_len(&piece) < self.chunk_size {
                pending.push(piece);
                continue;
            }
            if !pending.is_empty() {
                chunks.extend(self.merge(&pending));
                pending.clear();
            }
            if remaining.is_empty() {
                chunks.push(piece);
            } else {
                chunks.extend(self.split_with(&piece, remaining));
            }
        }

        if !pending.is_empty() {
            chunks.extend(self.merge(&pending));
        }
        chunks
    }

    /// Greedily join small pieces, keeping an overlapping tail between chunks
    fn merge(&self, pieces: &[String]) -> Vec<String> {
        let mut docs = Vec::new();
        let mut window: Vec<&str> = Vec::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(piece);
            if total + len > self.chunk_size && !window.is_empty() {
                if total > self.chunk_size {
                    debug!(total, limit = self.chunk_size, "chunk exceeds target size");
                }
                push_trimmed(&mut docs, &window.concat());

                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    let Some(first) = window.first() else { break };
                    total -= char_len(first);
                    window.remove(0);
                }
            }
            window.push(piece);
            total += len;
        }

        push_trimmed(&mut docs, &window.concat());
        docs
    }
}

fn push_trimmed(docs: &mut Vec<String>, text: &str) {
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        docs.push(trimmed.to_string());
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Split on `separator`, attaching each separator to the piece that follows it
fn split_keeping_separator(text: &str, separator: &str) -> Vec<String> {
    if separator.is_empty() {
        return text.chars().map(String::from).collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices(separator) {
        if idx > start {
            pieces.push(text[start..idx].to_string());
        }
        start = idx;
    }
    if start < text.len() {
        pieces.push(text[start..].to_string());
    }
    pieces.retain(|p| !p.is_empty());
    pieces
}

/// A markdown section and the header breadcrumb above it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkdownSection {
    pub headers: Vec<String>,
    /// Section text including its own header line
    pub text: String,
}

static HEADER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(#{1,4})\s+(.+?)\s*$").unwrap());

/// Cut markdown at header lines, ignoring headers inside code fences
pub fn split_markdown_sections(text: &str) -> Vec<MarkdownSection> {
    let mut sections = Vec::new();
    let mut stack: Vec<(usize, String)> = Vec::new();
    let mut lines: Vec<&str> = Vec::new();
    let mut in_fence = false;

    for line in text.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
        }

        if !in_fence {
            if let Some(caps) = HEADER.captures(line) {
                flush_section(&mut lines, &stack, &mut sections);
                let level = caps[1].len();
                stack.retain(|(l, _)| *l < level);
                stack.push((level, caps[2].to_string()));
            }
        }
        lines.push(line);
    }
    flush_section(&mut lines, &stack, &mut sections);

    sections
}

fn flush_section(lines: &mut Vec<&str>, stack: &[(usize, String)], out: &mut Vec<MarkdownSection>) {
    let body = lines.join("\n");
    let body = body.trim();
    if !body.is_empty() {
        out.push(MarkdownSection {
            headers: stack.iter().map(|(_, h)| h.clone()).collect(),
            text: body.to_string(),
        });
    }
    lines.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_is_single_chunk() {
        let splitter = RecursiveSplitter::new(1000, 200);
        assert_eq!(splitter.split("  hello world  "), vec!["hello world"]);
        assert!(splitter.split("").is_empty());
    }

    #[test]
    fn test_prefers_paragraph_breaks() {
        let splitter = RecursiveSplitter::new(20, 0);
        let chunks = splitter.split("first paragraph\n\nsecond paragraph");
        assert_eq!(chunks, vec!["first paragraph", "second paragraph"]);
    }

    #[test]
    fn test_chunks_respect_size_and_overlap() {
        let words: Vec<String> = (0..400).map(|i| format!("w{:03}", i)).collect();
        let text = words.join(" ");
        let splitter = RecursiveSplitter::new(100, 20);
        let chunks = splitter.split(&text);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 100, "oversized: {}", chunk.len());
        }
        // neighbours share their boundary words
        let last_word = chunks[0].rsplit(' ').next().unwrap();
        assert!(chunks[1].contains(last_word));
        assert!(chunks.last().unwrap().ends_with("w399"));
    }

    #[test]
    fn test_cjk_punctuation_is_a_break() {
        let sentence = "這是一段很長的說明文字。";
        let text = sentence.repeat(10);
        let splitter = RecursiveSplitter::new(30, 0);
        let chunks = splitter.split(&text);
        assert!(chunks.iter().all(|c| c.chars().count() <= 30));
        assert_eq!(chunks.concat().matches('。').count(), 10);
    }

    #[test]
    fn test_markdown_sections_keep_headers() {
        let md = "# Guide\nintro\n## Search\nType in box\n```\n# not a header\n```\n### Filters\nuse sort\n## Account\nlogin";
        let sections = split_markdown_sections(md);
        assert_eq!(sections.len(), 4);
        assert_eq!(sections[0].headers, vec!["Guide"]);
        assert!(sections[1].text.starts_with("## Search"));
        assert!(sections[1].text.contains("# not a header"));
        assert_eq!(sections[2].headers, vec!["Guide", "Search", "Filters"]);
        assert_eq!(sections[3].headers, vec!["Guide", "Account"]);
    }

    #[test]
    fn test_text_before_first_header() {
        let sections = split_markdown_sections("preface\n\n# Title\nbody");
        assert_eq!(sections[0].headers, Vec::<String>::new());
        assert_eq!(sections[0].text, "preface");
        assert_eq!(sections[1].text, "# Title\nbody");
    }
}
