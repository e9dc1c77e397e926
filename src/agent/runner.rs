//! Agent control loop
//!
//! Drives one task through Init → Perceive → Decide → (Act → Perceive)* →
//! Terminate. Recoverable problems (bad replies, stale labels, rejected
//! actions) become failure observations for the next turn; only perception
//! failures and final LLM errors abort a task.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::agent::action::{parse_reply, Action};
use crate::agent::context_window::{compact, ObservationMode};
use crate::agent::prompts::{PromptTemplates, FORCED_ANSWER};
use crate::agent::record::{RunRecorder, TaskOutcome, TaskReport};
use crate::agent::retry::RetryPolicy;
use crate::agent::session::AgentSession;
use crate::agent::PdfAssistant;
use crate::browser::{ActionOutcome, BrowserDriver, Snapshot};
use crate::core::{Config, ImageAttachment, Message, Result, Task};
use crate::knowledge::{is_no_data, EmbeddingMode, Retriever};
use crate::llm::{GenerateOptions, LLMProvider};

/// Result of acting on the page
enum ActResult {
    Done(ActionOutcome),
    Failed(String),
}

/// Where the loop stopped and with which answer
struct Termination {
    outcome: TaskOutcome,
    answer: String,
}

impl Termination {
    fn answered(answer: String) -> Self {
        Self {
            outcome: TaskOutcome::Answered,
            answer,
        }
    }

    fn aborted(reason: impl Into<String>) -> Self {
        Self {
            outcome: TaskOutcome::Aborted {
                reason: reason.into(),
            },
            answer: String::new(),
        }
    }
}

/// Web agent that runs tasks one at a time against a single browser
pub struct Agent {
    browser: Arc<dyn BrowserDriver>,
    llm: Arc<dyn LLMProvider>,
    model: String,
    options: GenerateOptions,
    retriever: Option<Retriever>,
    pdf_assistant: Option<Arc<dyn PdfAssistant>>,
    prompts: PromptTemplates,
    retry: RetryPolicy,
    mode: ObservationMode,
    max_iterations: usize,
    max_attached_images: usize,
    settle: Duration,
    recorder: Option<RunRecorder>,
    save_screenshots: bool,
}

impl Agent {
    /// Create an agent with default loop settings
    pub fn new(
        browser: Arc<dyn BrowserDriver>,
        llm: Arc<dyn LLMProvider>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            browser,
            llm,
            model: model.into(),
            options: GenerateOptions::default(),
            retriever: None,
            pdf_assistant: None,
            prompts: PromptTemplates::default(),
            retry: RetryPolicy::default(),
            mode: ObservationMode::Multimodal,
            max_iterations: 5,
            max_attached_images: 1,
            settle: Duration::ZERO,
            recorder: None,
            save_screenshots: false,
        }
    }

    /// Create an agent whose loop settings come from configuration
    pub fn from_config(
        config: &Config,
        browser: Arc<dyn BrowserDriver>,
        llm: Arc<dyn LLMProvider>,
    ) -> Self {
        let mut agent = Self::new(browser, llm, config.models.agent.clone());
        agent.options = GenerateOptions {
            temperature: Some(config.models.temperature),
            ..Default::default()
        };
        agent.retry = RetryPolicy::from_config(&config.retry);
        agent.mode = ObservationMode::from_text_only(config.browser.text_only);
        agent.max_iterations = config.agent.max_iterations;
        agent.max_attached_images = config.agent.max_attached_images;
        agent.settle = Duration::from_millis(config.browser.settle_ms);
        agent.save_screenshots = config.agent.save_screenshots;
        agent
    }

    pub fn with_retriever(mut self, retriever: Retriever) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn with_pdf_assistant(mut self, assistant: Arc<dyn PdfAssistant>) -> Self {
        self.pdf_assistant = Some(assistant);
        self
    }

    pub fn with_prompts(mut self, prompts: PromptTemplates) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_mode(mut self, mode: ObservationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_max_attached_images(mut self, max_attached_images: usize) -> Self {
        self.max_attached_images = max_attached_images;
        self
    }

    /// Delay after each executed action
    pub fn with_settle_delay(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Persist each finished task through `recorder`
    pub fn with_recorder(mut self, recorder: RunRecorder, save_screenshots: bool) -> Self {
        self.recorder = Some(recorder);
        self.save_screenshots = save_screenshots;
        self
    }

    pub fn recorder(&self) -> Option<&RunRecorder> {
        self.recorder.as_ref()
    }

    pub fn mode(&self) -> ObservationMode {
        self.mode
    }

    /// Run one task to termination
    ///
    /// The browser is always released and, when a recorder is set, the task
    /// record is always written. Errors are returned only when persisting
    /// the record fails.
    pub async fn run_task(&self, task: &Task) -> Result<TaskReport> {
        info!(task = %task.id, web = %task.web, mode = ?self.mode, "starting task");

        let mut session = AgentSession::new(self.prompts.system_prompt(self.mode), self.max_iterations);
        let mut embedding_mode = None;

        let termination = match self.browser.open(&task.web).await {
            Ok(()) => {
                let grounding = self.ground(task, &mut session, &mut embedding_mode).await;
                session = session.with_grounding(grounding);
                self.drive(task, &mut session).await
            }
            Err(e) => {
                error!(task = %task.id, error = %e, "could not open start page");
                Termination::aborted(format!("failed to open {}: {}", task.web, e))
            }
        };

        if let Err(e) = self.browser.close().await {
            warn!(task = %task.id, error = %e, "failed to close browser");
        }

        info!(
            task = %task.id,
            outcome = ?termination.outcome,
            iterations = session.iteration,
            prompt_tokens = session.usage.prompt_tokens,
            completion_tokens = session.usage.completion_tokens,
            "task finished"
        );

        let report = TaskReport {
            task_id: task.id.clone(),
            outcome: termination.outcome,
            answer: termination.answer,
            iterations: session.iteration,
            usage: session.usage.clone(),
            embedding_mode,
        };

        if let Some(recorder) = &self.recorder {
            recorder.save_task(&report, &session.history)?;
        }
        Ok(report)
    }

    /// One retrieval call; the no-data sentinel counts as no context
    async fn ground(
        &self,
        task: &Task,
        session: &mut AgentSession,
        embedding_mode: &mut Option<EmbeddingMode>,
    ) -> Option<String> {
        let retriever = self.retriever.as_ref()?;
        let context = retriever
            .retrieve(&task.ques, &task.web, task.site_name())
            .await?;

        session.usage.accumulate(&context.usage);
        *embedding_mode = Some(context.mode);

        if is_no_data(&context.answer) {
            info!(task = %task.id, "knowledge base had nothing relevant");
            return None;
        }
        debug!(task = %task.id, chars = context.answer.len(), "grounding context ready");
        Some(context.answer)
    }

    async fn drive(&self, task: &Task, session: &mut AgentSession) -> Termination {
        while session.should_continue() {
            let iteration = session.next_iteration();
            info!(task = %task.id, iteration, "iteration");

            // Perceive
            let turn = match session.fail_obs.take() {
                Some(failure) => {
                    let page_text = session
                        .last_snapshot
                        .as_ref()
                        .map(Snapshot::page_text)
                        .unwrap_or_default();
                    Message::user(self.prompts.failure_turn(self.mode, &failure, &page_text))
                }
                None => match self.perceive(task, session, iteration).await {
                    Ok(turn) => turn,
                    Err(e) => {
                        error!(task = %task.id, error = %e, "perception failed");
                        return Termination::aborted(format!("snapshot failed: {}", e));
                    }
                },
            };
            session.clear_observations();
            session.push(turn);

            // Decide
            let view = compact(&session.history, self.max_attached_images, self.mode);
            let reply = match self
                .retry
                .chat(self.llm.as_ref(), &self.model, &view, Some(self.options.clone()))
                .await
            {
                Ok(reply) => reply,
                Err(e) => {
                    error!(task = %task.id, error = %e, "LLM call failed");
                    return Termination::aborted(e.to_string());
                }
            };

            let usage = reply.response.usage_or_default();
            session.record_reply(&reply.response.content, &usage);
            info!(
                iteration,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                total_prompt_tokens = session.usage.prompt_tokens,
                total_completion_tokens = session.usage.completion_tokens,
                retries = reply.retries,
                "LLM call"
            );

            let action = match parse_reply(&reply.response.content) {
                Ok(action) => action,
                Err(e) => {
                    warn!(iteration, error = %e, "reply did not contain a valid action");
                    session.fail(self.prompts.format_error.clone());
                    continue;
                }
            };
            info!(iteration, action = %action, "action");

            // Act
            if let Action::Answer(answer) = action {
                return Termination::answered(answer);
            }

            let result = match &session.last_snapshot {
                Some(snapshot) => self.act(&action, snapshot).await,
                None => ActResult::Failed(self.prompts.action_failed.clone()),
            };

            match result {
                ActResult::Done(outcome) => {
                    session.warn_obs = outcome.warning;
                    if let Some(pdf) = outcome.downloaded_pdf {
                        session.pdf_obs = self.consult_pdf(&pdf, &task.ques).await;
                    }
                    if !self.settle.is_zero() {
                        tokio::time::sleep(self.settle).await;
                    }
                }
                ActResult::Failed(text) => session.fail(text),
            }
        }

        info!(task = %task.id, max = self.max_iterations, "iteration cap reached");
        Termination {
            outcome: TaskOutcome::IterationLimit,
            answer: FORCED_ANSWER.to_string(),
        }
    }

    /// Capture the page and frame it as this iteration's user turn
    async fn perceive(
        &self,
        task: &Task,
        session: &mut AgentSession,
        iteration: usize,
    ) -> Result<Message> {
        let snapshot = self.browser.snapshot().await?;

        if self.save_screenshots && snapshot.has_screenshot() {
            if let Some(recorder) = &self.recorder {
                if let Err(e) = recorder.save_screenshot(&task.id, iteration, &snapshot.screenshot) {
                    warn!(error = %e, "could not save screenshot");
                }
            }
        }

        let page_text = snapshot.page_text();
        let mut turn = if session.is_first_iteration() {
            let grounding = session.take_grounding();
            let text = self
                .prompts
                .first_turn(task, grounding.as_deref(), self.mode, &page_text);
            match grounding {
                Some(context) => Message::user(text).with_context(context),
                None => Message::user(text),
            }
        } else {
            Message::user(self.prompts.observation(
                self.mode,
                session.warn_obs.as_deref(),
                session.pdf_obs.as_deref(),
                &page_text,
            ))
        };

        if self.mode == ObservationMode::Multimodal && snapshot.has_screenshot() {
            turn = turn.with_image(ImageAttachment::png(&snapshot.screenshot));
        }

        session.last_snapshot = Some(snapshot);
        Ok(turn)
    }

    /// Execute a non-answer action chosen from `snapshot`
    async fn act(&self, action: &Action, snapshot: &Snapshot) -> ActResult {
        if let Some(index) = action.element_index() {
            if !snapshot.contains_index(index) {
                warn!(index, "action references a label missing from the page");
                return ActResult::Failed(self.prompts.stale_element(index));
            }
        }

        match self.browser.execute(action, snapshot).await {
            Ok(outcome) => ActResult::Done(outcome),
            Err(e) => {
                warn!(action = %action, error = %e, "action failed");
                ActResult::Failed(self.prompts.action_failed.clone())
            }
        }
    }

    async fn consult_pdf(&self, pdf: &Path, question: &str) -> Option<String> {
        let assistant = self.pdf_assistant.as_ref()?;
        match assistant.answer(pdf, question).await {
            Ok(answer) => {
                info!(pdf = %pdf.display(), "PDF assistant answered");
                Some(answer)
            }
            Err(e) => {
                warn!(pdf = %pdf.display(), error = %e, "PDF assistant failed");
                None
            }
        }
    }
}
