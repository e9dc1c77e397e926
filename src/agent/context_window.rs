//! Context window compaction
//!
//! Keeps the newest observation payloads intact and shrinks older ones to a
//! one-line placeholder before the history is sent to the model. The stored
//! history is never touched; compaction always produces a new view.

use crate::core::{Message, Role};

/// Marker that identifies a turn carrying a PDF assistant answer
pub const PDF_MARKER: &str = "You downloaded a PDF file";

const OBSERVATION_MARKER: &str = "Observation:";

/// How observations are delivered to the model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservationMode {
    /// Screenshot plus element text
    Multimodal,
    /// Accessibility tree only
    TextOnly,
}

impl ObservationMode {
    pub fn from_text_only(text_only: bool) -> Self {
        if text_only {
            Self::TextOnly
        } else {
            Self::Multimodal
        }
    }

    fn placeholder(&self, with_pdf: bool) -> &'static str {
        match (self, with_pdf) {
            (Self::Multimodal, false) => "Observation: A screenshot and some texts. (Omitted in context.)",
            (Self::Multimodal, true) => {
                "Observation: A screenshot, a PDF file and some texts. (Omitted in context.)"
            }
            (Self::TextOnly, false) => "Observation: An accessibility tree. (Omitted in context.)",
            (Self::TextOnly, true) => {
                "Observation: An accessibility tree and a PDF file. (Omitted in context.)"
            }
        }
    }

    /// Whether a user turn still carries a payload that counts against the budget
    fn carries_payload(&self, msg: &Message) -> bool {
        match self {
            Self::Multimodal => msg.has_image(),
            Self::TextOnly => true,
        }
    }
}

/// Compact a screenshot-based history
pub fn compact_multimodal(history: &[Message], max_attachments: usize) -> Vec<Message> {
    compact(history, max_attachments, ObservationMode::Multimodal)
}

/// Compact an accessibility-tree history
pub fn compact_text_only(history: &[Message], max_attachments: usize) -> Vec<Message> {
    compact(history, max_attachments, ObservationMode::TextOnly)
}

/// Keep the newest `max_attachments` payload-bearing user turns and replace
/// older ones with placeholders. Order is preserved.
pub fn compact(history: &[Message], max_attachments: usize, mode: ObservationMode) -> Vec<Message> {
    let mut kept = 0usize;
    let mut view: Vec<Message> = history
        .iter()
        .rev()
        .map(|msg| {
            if msg.role != Role::User || msg.compacted || !mode.carries_payload(msg) {
                return msg.clone();
            }
            if kept < max_attachments {
                kept += 1;
                return msg.clone();
            }
            placeholder_for(msg, mode)
        })
        .collect();
    view.reverse();
    view
}

fn placeholder_for(msg: &Message, mode: ObservationMode) -> Message {
    let framing = msg
        .content
        .split(OBSERVATION_MARKER)
        .next()
        .unwrap_or_default()
        .trim();
    let placeholder = mode.placeholder(msg.content.contains(PDF_MARKER));

    let content = if framing.is_empty() {
        placeholder.to_string()
    } else {
        format!("{} {}", framing, placeholder)
    };

    let mut compacted = Message::user(content);
    compacted.compacted = true;
    compacted
}

/// Number of user turns that still carry their full payload
pub fn full_payload_turns(view: &[Message], mode: ObservationMode) -> usize {
    view.iter()
        .filter(|m| m.is_user() && !m.compacted && mode.carries_payload(m))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ImageAttachment;

    fn observation(i: usize) -> Message {
        Message::user(format!("Observation: page {} elements", i))
            .with_image(ImageAttachment::png(format!("shot{}", i).as_bytes()))
    }

    fn multimodal_history(turns: usize) -> Vec<Message> {
        let mut history = vec![Message::system("rules")];
        history.push(
            Message::user("Now given a task: find X. Observation: please analyze")
                .with_image(ImageAttachment::png(b"first")),
        );
        history.push(Message::assistant("Thought: a\nAction: Click [1]"));
        for i in 1..turns {
            history.push(observation(i));
            history.push(Message::assistant("Thought: b\nAction: Click [1]"));
        }
        history
    }

    #[test]
    fn test_keeps_exact_number_of_payload_turns() {
        let history = multimodal_history(6);
        for budget in [1, 2, 3] {
            let view = compact_multimodal(&history, budget);
            assert_eq!(view.len(), history.len());
            assert_eq!(full_payload_turns(&view, ObservationMode::Multimodal), budget);
            assert_eq!(view.iter().filter(|m| m.compacted).count(), 6 - budget);
        }
    }

    #[test]
    fn test_newest_turns_survive() {
        let history = multimodal_history(4);
        let view = compact_multimodal(&history, 1);
        let last_user = view.iter().rev().find(|m| m.is_user()).unwrap();
        assert!(last_user.has_image());
        assert!(!last_user.compacted);
    }

    #[test]
    fn test_compaction_is_idempotent() {
        let history = multimodal_history(5);
        let once = compact_multimodal(&history, 2);
        let twice = compact_multimodal(&once, 2);
        assert_eq!(once, twice);

        let text_history: Vec<Message> = (0..5)
            .map(|i| Message::user(format!("Observation: tree {}", i)))
            .collect();
        let once = compact_text_only(&text_history, 2);
        assert_eq!(compact_text_only(&once, 2), once);
    }

    #[test]
    fn test_placeholder_keeps_framing() {
        let history = multimodal_history(3);
        let view = compact_multimodal(&history, 1);
        assert_eq!(
            view[1].content,
            "Now given a task: find X. Observation: A screenshot and some texts. (Omitted in context.)"
        );
        assert!(view[1].image.is_none());
        assert_eq!(
            view[3].content,
            "Observation: A screenshot and some texts. (Omitted in context.)"
        );
    }

    #[test]
    fn test_pdf_turns_are_marked() {
        let history = vec![
            Message::user(format!("Observation: {} and the answer is 7.", PDF_MARKER))
                .with_image(ImageAttachment::png(b"a")),
            Message::assistant("Thought: ok\nAction: Wait"),
            observation(2),
        ];
        let view = compact_multimodal(&history, 1);
        assert_eq!(
            view[0].content,
            "Observation: A screenshot, a PDF file and some texts. (Omitted in context.)"
        );

        let text = vec![
            Message::user(format!("Observation: {}.", PDF_MARKER)),
            Message::user("Observation: tree"),
        ];
        let view = compact_text_only(&text, 1);
        assert_eq!(
            view[0].content,
            "Observation: An accessibility tree and a PDF file. (Omitted in context.)"
        );
    }

    #[test]
    fn test_imageless_user_turns_not_counted_in_multimodal() {
        let history = vec![
            observation(1),
            Message::user("plain note"),
            observation(2),
        ];
        let view = compact_multimodal(&history, 1);
        assert!(view[0].compacted);
        assert_eq!(view[1].content, "plain note");
        assert!(!view[1].compacted);
        assert!(view[2].has_image());
    }

    #[test]
    fn test_zero_budget_compacts_everything() {
        let history = multimodal_history(2);
        let view = compact_multimodal(&history, 0);
        assert_eq!(full_payload_turns(&view, ObservationMode::Multimodal), 0);
        assert_eq!(view[0], history[0]);
    }
}
