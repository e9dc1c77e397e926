//! Agent loop integration tests
//!
//! Drives full tasks against a scripted browser and model.

mod common;

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::Instant;
use tokio_test::assert_ok;

use common::{last_user, reply, FakeBrowser, FixedPdfAssistant, ScriptedLlm};
use webpilot::agent::context_window::PDF_MARKER;
use webpilot::agent::{
    Action, Agent, ObservationMode, PromptTemplates, RunRecorder, TaskOutcome, FORCED_ANSWER,
};
use webpilot::{PilotError, Task};

fn task() -> Task {
    Task::new("1", "Find the price of the blue lamp", "https://shop.example.com")
}

fn image_count(call: &[webpilot::core::Message]) -> usize {
    call.iter().filter(|m| m.has_image()).count()
}

#[tokio::test]
async fn test_iteration_cap_forces_answer() {
    let tmp = TempDir::new().unwrap();
    let recorder = RunRecorder::at(tmp.path()).unwrap();
    let browser = Arc::new(FakeBrowser::new());
    let llm = Arc::new(ScriptedLlm::repeating(vec![], "Thought: try it\nAction: Click [1]"));

    let agent = Agent::new(browser.clone(), llm.clone(), "test-model")
        .with_max_iterations(3)
        .with_recorder(recorder.clone(), false);
    let report = assert_ok!(agent.run_task(&task()).await);

    assert_eq!(browser.executed(), vec![Action::Click(1); 3]);
    assert_eq!(report.outcome, TaskOutcome::IterationLimit);
    assert_eq!(report.answer, FORCED_ANSWER);
    assert_eq!(report.iterations, 3);
    assert_eq!(report.usage.prompt_tokens, 300);
    assert!(browser.is_closed());

    let saved = fs::read_to_string(recorder.task_dir("1").join("answer.txt")).unwrap();
    assert_eq!(saved, FORCED_ANSWER);
    assert!(recorder.task_dir("1").join("interact_messages.json").exists());
}

#[tokio::test(start_paused = true)]
async fn test_rate_limits_are_retried_with_backoff() {
    let browser = Arc::new(FakeBrowser::new());
    let llm = Arc::new(ScriptedLlm::new(vec![
        Err(PilotError::RateLimited("429 Too Many Requests".into())),
        Err(PilotError::RateLimited("429 Too Many Requests".into())),
        reply("Thought: the price is shown\nAction: ANSWER; [$20]"),
    ]));

    let agent = Agent::new(browser.clone(), llm.clone(), "test-model");
    let start = Instant::now();
    let report = agent.run_task(&task()).await.unwrap();
    let elapsed = start.elapsed();

    assert_eq!(report.outcome, TaskOutcome::Answered);
    assert_eq!(report.answer, "$20");
    assert_eq!(llm.call_count(), 3);
    assert!(elapsed >= Duration::from_secs(20), "elapsed {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(21), "elapsed {:?}", elapsed);
}

#[tokio::test]
async fn test_content_policy_aborts_task() {
    let tmp = TempDir::new().unwrap();
    let recorder = RunRecorder::at(tmp.path()).unwrap();
    let browser = Arc::new(FakeBrowser::new());
    let llm = Arc::new(ScriptedLlm::new(vec![Err(PilotError::ContentPolicy(
        "request flagged".into(),
    ))]));

    let agent = Agent::new(browser.clone(), llm.clone(), "test-model").with_recorder(recorder.clone(), false);
    let report = agent.run_task(&task()).await.unwrap();

    match &report.outcome {
        TaskOutcome::Aborted { reason } => assert!(reason.contains("request flagged")),
        other => panic!("expected abort, got {:?}", other),
    }
    assert_eq!(llm.call_count(), 1);
    assert!(browser.executed().is_empty());
    assert!(browser.is_closed());
    assert!(recorder.task_dir("1").join("abort_reason.txt").exists());
}

#[tokio::test]
async fn test_unparsable_reply_gets_format_error() {
    let browser = Arc::new(FakeBrowser::new());
    let llm = Arc::new(ScriptedLlm::new(vec![
        reply("I am not sure what to do here."),
        reply("Thought: ok\nAction: ANSWER; [42]"),
    ]));

    let agent = Agent::new(browser.clone(), llm.clone(), "test-model");
    let report = agent.run_task(&task()).await.unwrap();

    assert_eq!(report.outcome, TaskOutcome::Answered);
    assert_eq!(report.answer, "42");
    assert_eq!(report.iterations, 2);

    let calls = llm.calls();
    let correction = last_user(&calls[1]);
    assert_eq!(correction.content, PromptTemplates::default().format_error);
    assert!(!correction.has_image());
    // the failure turn reuses the previous snapshot
    assert_eq!(browser.snapshot_count(), 1);
}

#[tokio::test]
async fn test_stale_label_becomes_failure_observation() {
    let browser = Arc::new(FakeBrowser::new());
    let llm = Arc::new(ScriptedLlm::new(vec![
        reply("Thought: click it\nAction: Click [9]"),
        reply("Thought: fine\nAction: ANSWER; [none]"),
    ]));

    let agent = Agent::new(browser.clone(), llm.clone(), "test-model");
    let report = agent.run_task(&task()).await.unwrap();

    assert_eq!(report.outcome, TaskOutcome::Answered);
    assert!(browser.executed().is_empty());
    let calls = llm.calls();
    assert!(last_user(&calls[1]).content.contains("Numerical Label 9"));
}

#[tokio::test]
async fn test_rejected_action_is_recoverable() {
    let mut fake = FakeBrowser::new();
    fake.execute_fails = true;
    let browser = Arc::new(fake);
    let llm = Arc::new(ScriptedLlm::new(vec![
        reply("Thought: search\nAction: Type [1]; [blue lamp]"),
        reply("Thought: give up\nAction: ANSWER; [unknown]"),
    ]));

    let agent = Agent::new(browser.clone(), llm.clone(), "test-model");
    let report = agent.run_task(&task()).await.unwrap();

    assert_eq!(report.answer, "unknown");
    assert_eq!(
        browser.executed(),
        vec![Action::Type {
            index: 1,
            text: "blue lamp".to_string()
        }]
    );
    let calls = llm.calls();
    assert_eq!(last_user(&calls[1]).content, PromptTemplates::default().action_failed);
}

#[tokio::test]
async fn test_downloaded_pdf_is_answered_by_assistant() {
    let mut fake = FakeBrowser::new();
    fake.pdf = Some(PathBuf::from("/tmp/downloads/report.pdf"));
    let browser = Arc::new(fake);
    let llm = Arc::new(ScriptedLlm::new(vec![
        reply("Thought: open the report\nAction: Click [2]"),
        reply("Thought: got it\nAction: ANSWER; [7]"),
    ]));

    let agent = Agent::new(browser.clone(), llm.clone(), "test-model")
        .with_pdf_assistant(Arc::new(FixedPdfAssistant("revenue grew 7%".into())));
    agent.run_task(&task()).await.unwrap();

    let calls = llm.calls();
    let observation = &last_user(&calls[1]).content;
    assert!(observation.contains(PDF_MARKER));
    assert!(observation.contains("revenue grew 7%"));
    assert!(last_user(&calls[1]).has_image());
}

#[tokio::test]
async fn test_only_newest_screenshots_are_sent() {
    let browser = Arc::new(FakeBrowser::new());
    let llm = Arc::new(ScriptedLlm::repeating(vec![], "Thought: next\nAction: Scroll [WINDOW]; [down]"));

    let agent = Agent::new(browser.clone(), llm.clone(), "test-model")
        .with_max_iterations(4)
        .with_max_attached_images(2);
    let report = agent.run_task(&task()).await.unwrap();
    assert_eq!(report.outcome, TaskOutcome::IterationLimit);

    let calls = llm.calls();
    assert_eq!(image_count(&calls[0]), 1);
    assert_eq!(image_count(&calls[3]), 2);
    assert_eq!(calls[3].iter().filter(|m| m.compacted).count(), 2);
    assert!(calls[3][1].content.starts_with("Now given a task"));
    assert!(calls[3][1].content.ends_with("(Omitted in context.)"));
}

#[tokio::test]
async fn test_text_only_mode_attaches_no_images() {
    let browser = Arc::new(FakeBrowser::new());
    let llm = Arc::new(ScriptedLlm::new(vec![reply("Thought: x\nAction: ANSWER; [y]")]));

    let agent = Agent::new(browser.clone(), llm.clone(), "test-model").with_mode(ObservationMode::TextOnly);
    agent.run_task(&task()).await.unwrap();

    let calls = llm.calls();
    assert_eq!(image_count(&calls[0]), 0);
    assert!(calls[0][0].content.contains("Accessibility Tree"));
}

#[tokio::test]
async fn test_text_only_failure_turn_keeps_element_list() {
    let browser = Arc::new(FakeBrowser::new());
    let llm = Arc::new(ScriptedLlm::new(vec![
        reply("Click banana"),
        reply("Thought: x\nAction: ANSWER; [y]"),
    ]));

    let agent = Agent::new(browser.clone(), llm.clone(), "test-model").with_mode(ObservationMode::TextOnly);
    let report = agent.run_task(&task()).await.unwrap();
    assert_eq!(report.outcome, TaskOutcome::Answered);
    assert_eq!(browser.snapshot_count(), 1);

    let calls = llm.calls();
    let correction = last_user(&calls[1]);
    assert!(!correction.compacted);
    assert!(correction.content.starts_with(&PromptTemplates::default().format_error));
    assert!(correction.content.contains("[1]: <input> \"Search\";"));
    assert!(correction.content.contains("[2]: \"Next page\";"));
    assert_eq!(calls[1].iter().filter(|m| m.compacted).count(), 1);
}

#[tokio::test]
async fn test_unreachable_start_page_aborts() {
    let mut fake = FakeBrowser::new();
    fake.open_fails = true;
    let browser = Arc::new(fake);
    let llm = Arc::new(ScriptedLlm::new(vec![]));

    let agent = Agent::new(browser.clone(), llm.clone(), "test-model");
    let report = agent.run_task(&task()).await.unwrap();

    assert!(report.outcome.is_aborted());
    assert_eq!(report.iterations, 0);
    assert_eq!(llm.call_count(), 0);
    assert!(browser.is_closed());
}
