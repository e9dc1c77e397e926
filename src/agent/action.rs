//! Action protocol parsing
//!
//! The model answers every turn with a `Thought:` line followed by an
//! `Action:` line. This module pulls out the action segment and turns it
//! into a typed [`Action`] once, so nothing downstream re-reads raw text.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use thiserror::Error;

/// Target of a scroll action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollTarget {
    /// Scroll inside the numbered element
    Element(usize),
    /// Scroll the whole window
    Window,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirection {
    Up,
    Down,
}

impl ScrollDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrollDirection::Up => "up",
            ScrollDirection::Down => "down",
        }
    }
}

/// A structured instruction parsed from the model's reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Click(usize),
    Type { index: usize, text: String },
    Scroll {
        target: ScrollTarget,
        direction: ScrollDirection,
    },
    Wait,
    GoBack,
    Google,
    Answer(String),
}

impl Action {
    /// Element index referenced by this action, if any
    pub fn element_index(&self) -> Option<usize> {
        match self {
            Action::Click(index) | Action::Type { index, .. } => Some(*index),
            Action::Scroll {
                target: ScrollTarget::Element(index),
                ..
            } => Some(*index),
            _ => None,
        }
    }

    pub fn is_answer(&self) -> bool {
        matches!(self, Action::Answer(_))
    }

    /// Short name used in logs and records
    pub fn kind(&self) -> &'static str {
        match self {
            Action::Click(_) => "click",
            Action::Type { .. } => "type",
            Action::Scroll { .. } => "scroll",
            Action::Wait => "wait",
            Action::GoBack => "goback",
            Action::Google => "google",
            Action::Answer(_) => "answer",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Click(index) => write!(f, "Click [{}]", index),
            Action::Type { index, text } => write!(f, "Type [{}]; [{}]", index, text),
            Action::Scroll { target, direction } => {
                let target = match target {
                    ScrollTarget::Element(index) => index.to_string(),
                    ScrollTarget::Window => "WINDOW".to_string(),
                };
                write!(f, "Scroll [{}]; [{}]", target, direction.as_str())
            }
            Action::Wait => f.write_str("Wait"),
            Action::GoBack => f.write_str("GoBack"),
            Action::Google => f.write_str("Google"),
            Action::Answer(text) => write!(f, "ANSWER; [{}]", text),
        }
    }
}

/// Why a reply could not be turned into an action
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionParseError {
    #[error("reply has no `Action:` segment")]
    MissingAction,

    #[error("unrecognised action format: {0}")]
    Unrecognised(String),
}

static MARKERS: Lazy<Regex> = Lazy::new(|| Regex::new(r"Thought:|Action:|Observation:").unwrap());
static CLICK: Lazy<Regex> = Lazy::new(|| Regex::new(r"Click \[?(\d+)\]?").unwrap());
static TYPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Type \[?(\d+)\]?[; ]+\[?(.[^\]]*)\]?").unwrap());
static SCROLL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Scroll \[?(\d+|WINDOW)\]?[; ]+\[?(up|down)\]?").unwrap());
static WAIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^Wait").unwrap());
static GO_BACK: Lazy<Regex> = Lazy::new(|| Regex::new(r"^GoBack").unwrap());
static GOOGLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^Google").unwrap());
static ANSWER: Lazy<Regex> = Lazy::new(|| Regex::new(r"ANSWER[;: ]+\[?(.[^\]]*)\]?").unwrap());

/// Return the text between `Action:` and the next protocol marker
pub fn split_reply(reply: &str) -> Option<&str> {
    let start = reply.find("Action:")? + "Action:".len();
    let rest = &reply[start..];
    let end = MARKERS.find(rest).map(|m| m.start()).unwrap_or(rest.len());
    Some(rest[..end].trim())
}

/// Parse an action segment, trying each pattern in protocol order
pub fn parse_action(segment: &str) -> Result<Action, ActionParseError> {
    let segment = segment.trim();

    if let Some(caps) = CLICK.captures(segment) {
        return Ok(Action::Click(parse_index(&caps[1], segment)?));
    }

    if let Some(caps) = TYPE.captures(segment) {
        return Ok(Action::Type {
            index: parse_index(&caps[1], segment)?,
            text: strip_quotes(caps[2].trim()).to_string(),
        });
    }

    if let Some(caps) = SCROLL.captures(segment) {
        let target = match &caps[1] {
            "WINDOW" => ScrollTarget::Window,
            n => ScrollTarget::Element(parse_index(n, segment)?),
        };
        let direction = if &caps[2] == "up" {
            ScrollDirection::Up
        } else {
            ScrollDirection::Down
        };
        return Ok(Action::Scroll { target, direction });
    }

    if WAIT.is_match(segment) {
        return Ok(Action::Wait);
    }
    if GO_BACK.is_match(segment) {
        return Ok(Action::GoBack);
    }
    if GOOGLE.is_match(segment) {
        return Ok(Action::Google);
    }

    if let Some(caps) = ANSWER.captures(segment) {
        return Ok(Action::Answer(caps[1].trim().to_string()));
    }

    Err(ActionParseError::Unrecognised(segment.to_string()))
}

/// Split a full reply and parse its action
pub fn parse_reply(reply: &str) -> Result<Action, ActionParseError> {
    let segment = split_reply(reply).ok_or(ActionParseError::MissingAction)?;
    parse_action(segment)
}

fn parse_index(digits: &str, segment: &str) -> Result<usize, ActionParseError> {
    digits
        .parse()
        .map_err(|_| ActionParseError::Unrecognised(segment.to_string()))
}

/// Drop one pair of matching outer quotes
fn strip_quotes(text: &str) -> &str {
    for quote in ['"', '\''] {
        if text.len() >= 2 && text.starts_with(quote) && text.ends_with(quote) {
            return &text[1..text.len() - 1];
        }
    }
    text
}
