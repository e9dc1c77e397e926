//! webpilot - LLM-driven web browsing agent
//!
//! Main entry point: runs every task in a JSONL file and records the results.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use webpilot::agent::{ChatPdfAssistant, PdfAssistant, RunRecorder};
use webpilot::browser::AgentBrowserDriver;
use webpilot::core::config::ProviderType;
use webpilot::core::load_tasks;
use webpilot::knowledge::{Embedder, Retriever};
use webpilot::llm::{create_embedding_provider, create_provider, OpenAiClient};
use webpilot::{Agent, Config, PilotError};

/// webpilot - run web tasks with an LLM agent
#[derive(Parser, Debug)]
#[command(name = "webpilot")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSONL file with one `{id, ques, web, web_name}` task per line
    #[arg(long, short = 't', default_value = "data/tasks.jsonl")]
    test_file: PathBuf,

    /// Maximum iterations per task
    #[arg(long)]
    max_iter: Option<usize>,

    /// LLM backend: ollama, openai or openrouter
    #[arg(long)]
    provider: Option<String>,

    /// Model used by the agent loop
    #[arg(long, short = 'm')]
    model: Option<String>,

    /// Observe pages through the accessibility tree only
    #[arg(long)]
    text_only: bool,

    /// Ground the first turn with the site's knowledge base
    #[arg(long)]
    use_rag: bool,

    /// Observation turns kept with full payload
    #[arg(long)]
    max_attached_imgs: Option<usize>,

    /// Run in headed browser mode (visible window)
    #[arg(long)]
    headed: bool,

    /// Save a screenshot for every iteration
    #[arg(long)]
    save_screenshots: bool,

    /// Root directory for run records
    #[arg(long, short = 'o')]
    output_dir: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'd')]
    debug: bool,
}

fn init_tracing(debug: bool) {
    let default = if debug { "webpilot=debug" } else { "webpilot=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn apply_args(config: &mut Config, args: &Args) -> Result<(), PilotError> {
    if let Some(provider) = &args.provider {
        config.provider = provider.parse::<ProviderType>()?;
    }
    if let Some(model) = &args.model {
        config.models.agent = model.clone();
    }
    if let Some(max_iter) = args.max_iter {
        config.agent.max_iterations = max_iter;
    }
    if let Some(max) = args.max_attached_imgs {
        config.agent.max_attached_images = max;
    }
    if let Some(dir) = &args.output_dir {
        config.agent.output_dir = dir.clone();
    }
    config.browser.text_only |= args.text_only;
    config.browser.headed |= args.headed;
    config.rag.enabled |= args.use_rag;
    config.agent.save_screenshots |= args.save_screenshots;
    config.agent.debug |= args.debug;
    Ok(())
}

fn build_retriever(config: &Config) -> anyhow::Result<Retriever> {
    let llm = create_provider(config).context("creating retrieval model")?;
    let embedder = match create_embedding_provider(config) {
        Ok(provider) => Embedder::new(provider, config.rag.fallback_dimension),
        Err(e) => {
            warn!(error = %e, "no embedding provider, retrieval runs degraded");
            Embedder::degraded(config.rag.fallback_dimension)
        }
    };
    Ok(Retriever::new(
        llm,
        config.models.retrieval.clone(),
        embedder,
        &config.rag,
    ))
}

/// PDF answers need a chat endpoint that accepts file parts, so Ollama runs
/// without one
fn build_pdf_assistant(config: &Config) -> Option<Arc<dyn PdfAssistant>> {
    let client = match config.provider {
        ProviderType::OpenAi => OpenAiClient::from_config(config),
        ProviderType::OpenRouter => OpenAiClient::openrouter(config),
        ProviderType::Ollama => {
            info!("provider cannot read PDFs, downloads get a plain observation");
            return None;
        }
    };
    match client {
        Ok(client) => Some(Arc::new(ChatPdfAssistant::new(
            Arc::new(client),
            config.models.agent.clone(),
        ))),
        Err(e) => {
            warn!(error = %e, "no PDF assistant");
            None
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = Config::load();
    apply_args(&mut config, &args)?;
    init_tracing(config.agent.debug);

    if !AgentBrowserDriver::is_available().await {
        return Err(PilotError::AgentBrowserNotFound.into());
    }

    let tasks = load_tasks(&args.test_file)
        .with_context(|| format!("loading tasks from {}", args.test_file.display()))?;
    info!(count = tasks.len(), provider = ?config.provider, model = %config.models.agent, "loaded tasks");

    let browser = Arc::new(AgentBrowserDriver::from_config(&config.browser));
    let llm = create_provider(&config)?;
    let recorder = RunRecorder::create(&config.agent.output_dir)?;
    info!(dir = %recorder.run_dir().display(), "recording run");

    let mut agent = Agent::from_config(&config, browser, llm)
        .with_recorder(recorder.clone(), config.agent.save_screenshots);
    if config.rag.enabled {
        agent = agent.with_retriever(build_retriever(&config)?);
    }
    if let Some(assistant) = build_pdf_assistant(&config) {
        agent = agent.with_pdf_assistant(assistant);
    }

    let mut reports = Vec::with_capacity(tasks.len());
    for task in &tasks {
        match agent.run_task(task).await {
            Ok(report) => {
                println!("[{}] {:?}: {}", report.task_id, report.outcome, report.answer);
                reports.push(report);
            }
            Err(e) => warn!(task = %task.id, error = %e, "could not record task"),
        }
    }

    let path = recorder.save_results(&reports)?;
    info!(path = %path.display(), tasks = reports.len(), "run complete");
    Ok(())
}
