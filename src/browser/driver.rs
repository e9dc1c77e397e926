//! Browser driver boundary
//!
//! The loop talks to the browser only through [`BrowserDriver`], so it can be
//! exercised against a scripted fake.

use async_trait::async_trait;
use std::path::PathBuf;

use crate::agent::action::Action;
use crate::core::Result;

/// An interactive element as shown to the model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageElement {
    /// Numerical label drawn on the screenshot
    pub index: usize,
    /// Tag or ARIA role, e.g. `button`, `textbox`
    pub tag: String,
    /// Visible text or accessible name
    pub label: String,
}

impl PageElement {
    pub fn new(index: usize, tag: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            index,
            tag: tag.into(),
            label: label.into(),
        }
    }

    /// Whether typing into this element makes sense
    pub fn is_textbox(&self) -> bool {
        matches!(
            self.tag.as_str(),
            "input" | "textarea" | "textbox" | "searchbox" | "combobox" | "spinbutton"
        )
    }

    fn render(&self) -> String {
        match (self.tag.as_str(), self.label.is_empty()) {
            ("button" | "input" | "textarea" | "textbox" | "searchbox" | "combobox", true) => {
                format!("[{}]: <{}>;", self.index, self.tag)
            }
            ("button" | "input" | "textarea" | "textbox" | "searchbox" | "combobox", false) => {
                format!("[{}]: <{}> \"{}\";", self.index, self.tag, self.label)
            }
            _ => format!("[{}]: \"{}\";", self.index, self.label),
        }
    }
}

/// The page as seen in one iteration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageView {
    /// Labelled elements over a screenshot
    Elements(Vec<PageElement>),
    /// Accessibility tree text with the node ids it contains
    AccessibilityTree { text: String, node_ids: Vec<usize> },
}

/// One perception of the current page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// PNG bytes; empty when the driver does not capture images
    pub screenshot: Vec<u8>,
    pub view: PageView,
}

impl Snapshot {
    pub fn with_elements(screenshot: Vec<u8>, elements: Vec<PageElement>) -> Self {
        Self {
            screenshot,
            view: PageView::Elements(elements),
        }
    }

    pub fn with_tree(screenshot: Vec<u8>, text: impl Into<String>, node_ids: Vec<usize>) -> Self {
        Self {
            screenshot,
            view: PageView::AccessibilityTree {
                text: text.into(),
                node_ids,
            },
        }
    }

    /// Whether `index` was labelled in this snapshot
    pub fn contains_index(&self, index: usize) -> bool {
        match &self.view {
            PageView::Elements(elements) => elements.iter().any(|e| e.index == index),
            PageView::AccessibilityTree { node_ids, .. } => node_ids.contains(&index),
        }
    }

    pub fn element(&self, index: usize) -> Option<&PageElement> {
        match &self.view {
            PageView::Elements(elements) => elements.iter().find(|e| e.index == index),
            PageView::AccessibilityTree { .. } => None,
        }
    }

    /// Text handed to the model alongside the screenshot
    pub fn page_text(&self) -> String {
        match &self.view {
            PageView::Elements(elements) => elements
                .iter()
                .map(PageElement::render)
                .collect::<Vec<_>>()
                .join("\n"),
            PageView::AccessibilityTree { text, .. } => text.clone(),
        }
    }

    pub fn has_screenshot(&self) -> bool {
        !self.screenshot.is_empty()
    }
}

/// What a successful action left behind
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionOutcome {
    /// Soft warning to show in the next observation
    pub warning: Option<String>,
    /// PDF that appeared in the download directory
    pub downloaded_pdf: Option<PathBuf>,
}

impl ActionOutcome {
    pub fn with_warning(warning: impl Into<String>) -> Self {
        Self {
            warning: Some(warning.into()),
            downloaded_pdf: None,
        }
    }
}

/// Performs one action at a time against a live page
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Navigate to the task's start page
    async fn open(&self, url: &str) -> Result<()>;

    /// Capture the current page
    async fn snapshot(&self) -> Result<Snapshot>;

    /// Execute a non-answer action; `snapshot` is the one the action was chosen from
    async fn execute(&self, action: &Action, snapshot: &Snapshot) -> Result<ActionOutcome>;

    /// Release the browser
    async fn close(&self) -> Result<()>;
}
