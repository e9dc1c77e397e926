//! Snapshot parsing for agent-browser output
//!
//! Parses the `snapshot -i --json` payload and turns its `eN` refs into the
//! numbered elements the model refers to.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::browser::driver::PageElement;

/// Parsed snapshot from agent-browser
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSnapshot {
    /// Whether the operation succeeded
    #[serde(default)]
    pub success: bool,
    /// Snapshot data
    #[serde(default)]
    pub data: Option<SnapshotData>,
}

/// Snapshot data content
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotData {
    /// Raw snapshot string (accessibility tree)
    #[serde(default)]
    pub snapshot: String,
    /// Element refs mapped to their info
    #[serde(default)]
    pub refs: HashMap<String, RefElement>,
}

/// An element in the snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefElement {
    /// ARIA role
    #[serde(default)]
    pub role: String,
    /// Accessible name
    #[serde(default)]
    pub name: String,
    /// Element value (for inputs)
    #[serde(default)]
    pub value: Option<String>,
}

/// Numeric part of an `eN` / `@eN` ref
pub fn ref_index(ref_id: &str) -> Option<usize> {
    let clean = ref_id.strip_prefix('@').unwrap_or(ref_id);
    clean.strip_prefix('e')?.parse().ok()
}

/// Ref string for a numerical label
pub fn ref_for(index: usize) -> String {
    format!("@e{}", index)
}

impl RawSnapshot {
    /// Count the number of elements with refs
    pub fn count_elements(&self) -> usize {
        self.data.as_ref().map(|d| d.refs.len()).unwrap_or(0)
    }

    /// Elements ordered by their numerical label
    pub fn elements(&self) -> Vec<PageElement> {
        let mut elements: Vec<PageElement> = self
            .data
            .as_ref()
            .map(|d| {
                d.refs
                    .iter()
                    .filter_map(|(ref_id, el)| {
                        let label = match &el.value {
                            Some(v) if !v.is_empty() && el.name.is_empty() => v.clone(),
                            _ => el.name.clone(),
                        };
                        ref_index(ref_id).map(|i| PageElement::new(i, el.role.clone(), label))
                    })
                    .collect()
            })
            .unwrap_or_default();
        elements.sort_by_key(|e| e.index);
        elements
    }

    /// Get the raw accessibility tree string
    pub fn raw_tree(&self) -> &str {
        self.data.as_ref().map(|d| d.snapshot.as_str()).unwrap_or("")
    }

    /// Accessibility tree with `[ref=eN]` rewritten to `[N]`
    pub fn numbered_tree(&self) -> String {
        REF_MARK.replace_all(self.raw_tree(), "[$1]").into_owned()
    }
}

static REF_MARK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[ref=e(\d+)\]").unwrap());

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "success": true,
        "data": {
            "snapshot": "- textbox \"Search\" [ref=e2]\n- link \"Home\" [ref=e1]",
            "refs": {
                "e2": {"role": "textbox", "name": "", "value": "rust"},
                "e1": {"role": "link", "name": "Home"},
                "e10": {"role": "button", "name": "Go", "focused": true}
            }
        }
    }"#;

    #[test]
    fn test_ref_index() {
        assert_eq!(ref_index("e12"), Some(12));
        assert_eq!(ref_index("@e3"), Some(3));
        assert_eq!(ref_index("x3"), None);
        assert_eq!(ref_for(7), "@e7");
    }

    #[test]
    fn test_elements_sorted_by_index() {
        let snapshot: RawSnapshot = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(snapshot.count_elements(), 3);
        let elements = snapshot.elements();
        let indices: Vec<usize> = elements.iter().map(|e| e.index).collect();
        assert_eq!(indices, vec![1, 2, 10]);
        assert_eq!(elements[1].label, "rust");
        assert!(elements[1].is_textbox());
        assert!(snapshot.raw_tree().contains("[ref=e2]"));
        assert_eq!(
            snapshot.numbered_tree(),
            "- textbox \"Search\" [2]\n- link \"Home\" [1]"
        );
    }
}
