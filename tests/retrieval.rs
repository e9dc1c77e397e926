//! Retrieval integration tests
//!
//! Builds small knowledge bases on disk and checks what reaches the models.

mod common;

use serde_json::json;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

use common::{reply, FakeBrowser, ScriptedLlm};
use webpilot::agent::{Agent, TaskOutcome};
use webpilot::core::config::RagConfig;
use webpilot::knowledge::retriever::fallback_query;
use webpilot::knowledge::{Embedder, EmbeddingMode, Retriever, NO_DATA_SENTINEL};
use webpilot::{PilotError, Task};

const SITE: &str = "shop.example.com";

fn task() -> Task {
    Task::new("4", "Find the price of the blue lamp", "https://shop.example.com")
}

fn rag_config(root: &TempDir) -> RagConfig {
    RagConfig {
        knowledge_root: root.path().to_path_buf(),
        ..RagConfig::default()
    }
}

fn knowledge_base() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let site = tmp.path().join(SITE);
    fs::create_dir_all(&site).unwrap();
    fs::write(
        site.join("guide.md"),
        "# Shop Guide\nWelcome.\n## Search\nType a product name into the search box and press Enter.\n",
    )
    .unwrap();
    tmp
}

fn retriever(llm: Arc<ScriptedLlm>, config: &RagConfig) -> Retriever {
    Retriever::new(llm, "retrieval-model", Embedder::degraded(16), config)
}

#[tokio::test]
async fn test_empty_knowledge_base_gives_no_context() {
    let tmp = TempDir::new().unwrap();
    fs::create_dir_all(tmp.path().join(SITE)).unwrap();
    let llm = Arc::new(ScriptedLlm::new(vec![reply("search methods")]));
    let retriever = retriever(llm.clone(), &rag_config(&tmp));

    let context = retriever
        .build_context(&task().ques, &task().web, SITE)
        .await;
    assert!(context.is_none());

    // missing site directory behaves the same
    let context = retriever.build_context(&task().ques, &task().web, "other.site").await;
    assert!(context.is_none());
}

#[tokio::test]
async fn test_grounding_prompt_carries_numbered_documents() {
    let tmp = knowledge_base();
    let llm = Arc::new(ScriptedLlm::new(vec![
        reply("Methods for product search"),
        reply("1. Type the product name into the search box."),
    ]));
    let retriever = retriever(llm.clone(), &rag_config(&tmp));

    let context = retriever.retrieve(&task().ques, &task().web, SITE).await.unwrap();
    assert_eq!(context.answer, "1. Type the product name into the search box.");
    assert_eq!(context.query, "Methods for product search");
    assert_eq!(context.mode, EmbeddingMode::Degraded);
    assert_eq!(context.chunks_searched, 2);
    assert_eq!(context.usage.prompt_tokens, 200);

    let calls = llm.calls();
    let system = &calls[1][0].content;
    assert!(system.contains("[DOCUMENT 1]"));
    assert!(system.contains("[DOCUMENT 2]"));
    assert!(system.contains("search box"));
    assert!(system.contains("Source: guide.md"));
}

#[tokio::test]
async fn test_failed_rewrite_uses_template_query() {
    let tmp = knowledge_base();
    let llm = Arc::new(ScriptedLlm::new(vec![
        Err(PilotError::LlmServer("502 Bad Gateway".into())),
        reply("1. Use the search box."),
    ]));
    let retriever = retriever(llm, &rag_config(&tmp));

    let context = retriever.retrieve(&task().ques, &task().web, SITE).await.unwrap();
    assert_eq!(context.query, fallback_query(&task().ques, &task().web));
}

#[tokio::test]
async fn test_grounding_failure_is_swallowed() {
    let tmp = knowledge_base();
    let llm = Arc::new(ScriptedLlm::new(vec![
        reply("search methods"),
        Err(PilotError::LlmServer("503 Service Unavailable".into())),
    ]));
    let retriever = retriever(llm, &rag_config(&tmp));
    assert!(retriever.retrieve(&task().ques, &task().web, SITE).await.is_none());
}

#[tokio::test]
async fn test_long_action_log_is_split_for_search() {
    let tmp = TempDir::new().unwrap();
    let site = tmp.path().join(SITE);
    fs::create_dir_all(&site).unwrap();
    let actions: Vec<_> = (1..=23)
        .map(|i| json!({"order": i, "type": "Click", "element": {"tagName": "A", "text": format!("link {}", i)}}))
        .collect();
    let log = json!({"task_description": "Browse lamps", "timestamp": "2024-03-01", "actions": actions});
    fs::write(site.join("log.json"), log.to_string()).unwrap();

    let llm = Arc::new(ScriptedLlm::new(vec![reply("browsing"), reply("1. Click the lamp link.")]));
    let retriever = retriever(llm.clone(), &rag_config(&tmp));
    let context = retriever.retrieve(&task().ques, &task().web, SITE).await.unwrap();

    assert_eq!(context.chunks_searched, 5);
    let system = &llm.calls()[1][0].content;
    assert!(system.contains("**Actions Sequence**: 1-5"));
    assert!(system.contains("**Actions Sequence**: 21-23"));
}

#[tokio::test]
async fn test_no_data_reply_is_never_injected() {
    let tmp = knowledge_base();
    let retrieval_llm = Arc::new(ScriptedLlm::new(vec![
        reply("search methods"),
        reply(NO_DATA_SENTINEL),
    ]));
    let agent_llm = Arc::new(ScriptedLlm::new(vec![
        reply("Thought: look\nAction: Click [2]"),
        reply("Thought: found\nAction: ANSWER; [$20]"),
    ]));
    let browser = Arc::new(FakeBrowser::new());

    let agent = Agent::new(browser, agent_llm.clone(), "agent-model")
        .with_retriever(retriever(retrieval_llm, &rag_config(&tmp)));
    let report = agent.run_task(&task()).await.unwrap();

    assert_eq!(report.outcome, TaskOutcome::Answered);
    assert_eq!(report.embedding_mode, Some(EmbeddingMode::Degraded));
    for call in agent_llm.calls() {
        for message in call {
            assert!(!message.content.contains(NO_DATA_SENTINEL));
            assert!(message.context.is_none());
        }
    }
}

#[tokio::test]
async fn test_grounding_reaches_first_turn_only() {
    let tmp = knowledge_base();
    let retrieval_llm = Arc::new(ScriptedLlm::new(vec![
        reply("search methods"),
        reply("1. Type the product name into the search box."),
    ]));
    let agent_llm = Arc::new(ScriptedLlm::new(vec![
        reply("Thought: search\nAction: Type [1]; [blue lamp]"),
        reply("Thought: found\nAction: ANSWER; [$20]"),
    ]));
    let browser = Arc::new(FakeBrowser::new());

    let agent = Agent::new(browser, agent_llm.clone(), "agent-model")
        .with_retriever(retriever(retrieval_llm, &rag_config(&tmp)));
    let report = agent.run_task(&task()).await.unwrap();

    // two retrieval calls plus two loop calls
    assert_eq!(report.usage.prompt_tokens, 400);

    let calls = agent_llm.calls();
    let first = &calls[0][1];
    assert!(first
        .content
        .contains("Here's the following operating manual provides suggestions: 1. Type the product name"));
    assert_eq!(
        first.context.as_deref(),
        Some("1. Type the product name into the search box.")
    );

    let grounded = calls[1]
        .iter()
        .filter(|m| m.content.contains("operating manual"))
        .count();
    assert_eq!(grounded, 1);
}
