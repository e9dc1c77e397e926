//! Browser driver backed by the agent-browser CLI
//!
//! Every call shells out to `agent-browser --session <name> ...`.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::agent::action::{Action, ScrollDirection, ScrollTarget};
use crate::browser::driver::{ActionOutcome, BrowserDriver, Snapshot};
use crate::browser::snapshot::{ref_for, ref_index, RawSnapshot};
use crate::core::config::BrowserConfig;
use crate::core::{PilotError, Result};

const GOOGLE_URL: &str = "https://www.google.com/";
const WAIT_ACTION: Duration = Duration::from_secs(5);
/// Suffixes browsers give to downloads still in flight
const PARTIAL_SUFFIXES: [&str; 4] = [".crdownload", ".part", ".download", ".tmp"];

/// Driver for browser automation via agent-browser CLI
pub struct AgentBrowserDriver {
    /// Session name for isolation
    session_name: String,
    /// Whether to run in headed mode
    headed: bool,
    text_only: bool,
    window_height: u32,
    download_dir: PathBuf,
    /// Wait for in-flight downloads once the directory changes
    download_settle: Duration,
    screenshot_path: PathBuf,
    /// Completed downloads seen after the previous action
    known_downloads: Mutex<BTreeSet<String>>,
}

impl AgentBrowserDriver {
    pub fn from_config(config: &BrowserConfig) -> Self {
        let screenshot_path =
            std::env::temp_dir().join(format!("{}-screenshot.png", config.session_name));
        Self {
            session_name: config.session_name.clone(),
            headed: config.headed,
            text_only: config.text_only,
            window_height: config.window_height,
            download_dir: config.download_dir.clone(),
            download_settle: Duration::from_millis(config.download_settle_ms),
            screenshot_path,
            known_downloads: Mutex::new(completed(list_files(&config.download_dir))),
        }
    }

    /// Check if agent-browser is installed
    pub async fn is_available() -> bool {
        Command::new("agent-browser")
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Run an agent-browser command
    async fn run_command(&self, args: &[&str]) -> Result<String> {
        let mut cmd = Command::new("agent-browser");
        cmd.args(["--session", &self.session_name]);

        if self.headed {
            cmd.arg("--headed");
        }

        cmd.args(args);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        debug!(?args, "agent-browser");
        let output = cmd.output().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PilotError::AgentBrowserNotFound
            } else {
                PilotError::browser(format!("Failed to run agent-browser: {}", e))
            }
        })?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(PilotError::browser(format!(
                "agent-browser {} failed: {}",
                args.first().copied().unwrap_or_default(),
                stderr.trim()
            )))
        }
    }

    /// Run a command and return JSON output
    async fn run_json_command(&self, args: &[&str]) -> Result<String> {
        let mut full_args: Vec<&str> = args.to_vec();
        full_args.push("--json");
        self.run_command(&full_args).await
    }

    async fn capture_screenshot(&self) -> Result<Vec<u8>> {
        let path = self.screenshot_path.to_string_lossy().into_owned();
        self.run_command(&["screenshot", &path]).await?;
        Ok(tokio::fs::read(&self.screenshot_path).await?)
    }

    async fn type_into(&self, index: usize, text: &str, snapshot: &Snapshot) -> Result<ActionOutcome> {
        let target = ref_for(index);
        let warning = snapshot
            .element(index)
            .filter(|el| !el.is_textbox())
            .map(|el| {
                format!(
                    "note: The web element you're trying to type may not be a textbox, and its tag name is <{}>.",
                    el.tag
                )
            });

        self.run_command(&["fill", &target, text]).await?;
        self.run_command(&["press", "Enter"]).await?;

        Ok(ActionOutcome {
            warning,
            downloaded_pdf: None,
        })
    }

    async fn scroll(&self, target: ScrollTarget, direction: ScrollDirection) -> Result<()> {
        match target {
            ScrollTarget::Window => {
                let pixels = (self.window_height * 2 / 3).to_string();
                self.run_command(&["scroll", direction.as_str(), &pixels]).await?;
            }
            ScrollTarget::Element(index) => {
                self.run_command(&["focus", &ref_for(index)]).await?;
                let key = match direction {
                    ScrollDirection::Up => "Alt+ArrowUp",
                    ScrollDirection::Down => "Alt+ArrowDown",
                };
                self.run_command(&["press", key]).await?;
            }
        }
        Ok(())
    }

    fn known_downloads(&self) -> std::sync::MutexGuard<'_, BTreeSet<String>> {
        match self.known_downloads.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// First PDF that finished downloading since the last check.
    ///
    /// A changed listing means a download may still be in flight, so the
    /// directory is listed again after the settle delay. Partial files are
    /// never recorded as known.
    async fn new_download(&self) -> Option<PathBuf> {
        let mut current = list_files(&self.download_dir);
        let changed = current != *self.known_downloads();
        if changed {
            debug!(wait_ms = self.download_settle.as_millis() as u64, "download directory changed, waiting to settle");
            tokio::time::sleep(self.download_settle).await;
            current = list_files(&self.download_dir);
        }

        let current = completed(current);
        let mut known = self.known_downloads();
        let fresh = current
            .difference(&known)
            .find(|name| name.to_ascii_lowercase().ends_with(".pdf"))
            .map(|name| self.download_dir.join(name));
        *known = current;
        fresh
    }
}

fn is_partial_download(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    PARTIAL_SUFFIXES.iter().any(|suffix| lower.ends_with(suffix))
}

fn completed(files: BTreeSet<String>) -> BTreeSet<String> {
    files.into_iter().filter(|name| !is_partial_download(name)).collect()
}

fn list_files(dir: &Path) -> BTreeSet<String> {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl BrowserDriver for AgentBrowserDriver {
    async fn open(&self, url: &str) -> Result<()> {
        self.run_command(&["open", url]).await?;
        if let Err(e) = self.run_command(&["wait", "--load", "networkidle"]).await {
            warn!(error = %e, "page did not reach network idle");
        }
        Ok(())
    }

    async fn snapshot(&self) -> Result<Snapshot> {
        let output = self.run_json_command(&["snapshot", "-i"]).await?;
        let raw: RawSnapshot = serde_json::from_str(&output)?;
        if !raw.success {
            return Err(PilotError::browser("agent-browser snapshot reported failure"));
        }

        if self.text_only {
            let node_ids = raw
                .data
                .as_ref()
                .map(|d| d.refs.keys().filter_map(|r| ref_index(r)).collect())
                .unwrap_or_default();
            let screenshot = self.capture_screenshot().await.unwrap_or_default();
            return Ok(Snapshot::with_tree(screenshot, raw.numbered_tree(), node_ids));
        }

        let screenshot = self.capture_screenshot().await?;
        Ok(Snapshot::with_elements(screenshot, raw.elements()))
    }

    async fn execute(&self, action: &Action, snapshot: &Snapshot) -> Result<ActionOutcome> {
        match action {
            Action::Click(index) => {
                self.run_command(&["click", &ref_for(*index)]).await?;
                Ok(ActionOutcome {
                    warning: None,
                    downloaded_pdf: self.new_download().await,
                })
            }
            Action::Type { index, text } => self.type_into(*index, text, snapshot).await,
            Action::Scroll { target, direction } => {
                self.scroll(*target, *direction).await?;
                Ok(ActionOutcome::default())
            }
            Action::Wait => {
                tokio::time::sleep(WAIT_ACTION).await;
                Ok(ActionOutcome::default())
            }
            Action::GoBack => {
                self.run_command(&["back"]).await?;
                Ok(ActionOutcome::default())
            }
            Action::Google => {
                self.run_command(&["open", GOOGLE_URL]).await?;
                Ok(ActionOutcome::default())
            }
            Action::Answer(_) => Ok(ActionOutcome::default()),
        }
    }

    async fn close(&self) -> Result<()> {
        self.run_command(&["close"]).await?;
        Ok(())
    }
}
