//! webpilot - LLM-driven web browsing agent
//!
//! Runs natural-language tasks against live websites. Each iteration the
//! agent captures the page, asks a model for one `Thought`/`Action` pair,
//! and executes the action through a browser driver, optionally grounded by
//! a per-site knowledge base.
//!
//! # Architecture
//!
//! - **Core**: Shared types, tasks, configuration, and error handling
//! - **LLM**: Chat and embedding providers (Ollama, OpenAI-compatible)
//! - **Browser**: Driver boundary and the agent-browser implementation
//! - **Knowledge**: Document loading, chunking, embedding, and retrieval
//! - **Agent**: Action parsing, context compaction, retries, and the loop
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use webpilot::browser::AgentBrowserDriver;
//! use webpilot::llm::create_provider;
//! use webpilot::{Agent, Config, Task};
//!
//! #[tokio::main]
//! async fn main() -> webpilot::Result<()> {
//!     let config = Config::load();
//!     let browser = Arc::new(AgentBrowserDriver::from_config(&config.browser));
//!     let agent = Agent::from_config(&config, browser, create_provider(&config)?);
//!
//!     let task = Task::new("1", "Find the opening hours", "https://example.com");
//!     let report = agent.run_task(&task).await?;
//!     println!("{}", report.answer);
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod browser;
pub mod core;
pub mod knowledge;
pub mod llm;

// Re-export commonly used items
pub use agent::{Agent, TaskOutcome, TaskReport};
pub use core::{Config, PilotError, Result, Task};
