//! Layered configuration read from `.relay/relay.toml`.
//!
//! Precedence, lowest first: built-in defaults, the file, environment
//! variables (`RELAY_AGENT_CMD`, `RELAY_FEEDBACK_CMD`), then CLI flags.
//!
//! ```toml
//! [agent]
//! command = "claude"
//! args = ["--print", "--output-format", "stream-json", "--verbose"]
//! max_iterations = 5
//!
//! [feedback]
//! command = "my-submit-hook"
//! args = []
//! feedback_file = "USER_FEEDBACK.md"
//! buffer_capacity = 100
//! verbose = false
//!
//! [metrics]
//! history_file = "metrics/history.json"
//! history_capacity = 100
//! report_window = 10
//!
//! [logging]
//! file = false
//! json = false
//! ```

use crate::feedback::SubprocessCommand;
use crate::metrics::{DEFAULT_HISTORY_CAPACITY, DEFAULT_REPORT_WINDOW};
use crate::progress::DEFAULT_BUFFER_CAPACITY;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Directory holding relay state inside a project.
pub const RELAY_DIR: &str = ".relay";
pub const CONFIG_FILE: &str = "relay.toml";

pub const AGENT_CMD_ENV: &str = "RELAY_AGENT_CMD";
pub const FEEDBACK_CMD_ENV: &str = "RELAY_FEEDBACK_CMD";

/// Agent subprocess settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSection {
    #[serde(default = "default_agent_command")]
    pub command: String,
    #[serde(default = "default_agent_args")]
    pub args: Vec<String>,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
}

fn default_agent_command() -> String {
    "claude".to_string()
}

fn default_agent_args() -> Vec<String> {
    ["--print", "--output-format", "stream-json", "--verbose"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_max_iterations() -> u32 {
    5
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            command: default_agent_command(),
            args: default_agent_args(),
            max_iterations: default_max_iterations(),
        }
    }
}

/// Feedback collection and submission settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackSection {
    /// Submit command; feedback is appended to `feedback_file` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    /// Relative to the relay directory.
    #[serde(default = "default_feedback_file")]
    pub feedback_file: String,
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
    /// Stream submit command output.
    #[serde(default)]
    pub verbose: bool,
}

fn default_feedback_file() -> String {
    "USER_FEEDBACK.md".to_string()
}

fn default_buffer_capacity() -> usize {
    DEFAULT_BUFFER_CAPACITY
}

impl Default for FeedbackSection {
    fn default() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            feedback_file: default_feedback_file(),
            buffer_capacity: default_buffer_capacity(),
            verbose: false,
        }
    }
}

/// Snapshot history settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSection {
    /// Relative to the relay directory.
    #[serde(default = "default_history_file")]
    pub history_file: String,
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    #[serde(default = "default_report_window")]
    pub report_window: usize,
}

fn default_history_file() -> String {
    "metrics/history.json".to_string()
}

fn default_history_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}

fn default_report_window() -> usize {
    DEFAULT_REPORT_WINDOW
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self {
            history_file: default_history_file(),
            history_capacity: default_history_capacity(),
            report_window: default_report_window(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Also write a daily log file under `.relay/logs/`.
    #[serde(default)]
    pub file: bool,
    /// Write the log file as JSON lines.
    #[serde(default)]
    pub json: bool,
}

/// Contents of `relay.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelayToml {
    #[serde(default)]
    pub agent: AgentSection,
    #[serde(default)]
    pub feedback: FeedbackSection,
    #[serde(default)]
    pub metrics: MetricsSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl RelayToml {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse relay.toml")
    }

    /// Load `relay.toml` from `relay_dir`, or defaults when it does not exist.
    pub fn load_or_default(relay_dir: &Path) -> Result<Self> {
        let path = relay_dir.join(CONFIG_FILE);
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize relay.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Problems that would make a run fail; empty when valid.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.agent.command.trim().is_empty() {
            problems.push("agent.command must not be empty".to_string());
        }
        if self.agent.max_iterations == 0 {
            problems.push("agent.max_iterations must be at least 1".to_string());
        }
        if self.feedback.buffer_capacity == 0 {
            problems.push("feedback.buffer_capacity must be at least 1".to_string());
        }
        if self.metrics.history_capacity == 0 {
            problems.push("metrics.history_capacity must be at least 1".to_string());
        }
        if self.metrics.report_window == 0 {
            problems.push("metrics.report_window must be at least 1".to_string());
        }
        problems
    }
}

fn env_override(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Resolved configuration for one invocation.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub project_dir: PathBuf,
    pub relay_dir: PathBuf,
    pub toml: RelayToml,
    pub verbose: bool,
}

impl RelayConfig {
    pub fn new(project_dir: PathBuf, verbose: bool) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let relay_dir = project_dir.join(RELAY_DIR);
        let toml = RelayToml::load_or_default(&relay_dir)?;
        Ok(Self {
            project_dir,
            relay_dir,
            toml,
            verbose,
        })
    }

    pub fn config_file(&self) -> PathBuf {
        self.relay_dir.join(CONFIG_FILE)
    }

    pub fn feedback_file(&self) -> PathBuf {
        self.relay_dir.join(&self.toml.feedback.feedback_file)
    }

    pub fn history_file(&self) -> PathBuf {
        self.relay_dir.join(&self.toml.metrics.history_file)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.relay_dir.join("logs")
    }

    /// Agent command (env → file → default).
    pub fn agent_command(&self) -> String {
        env_override(AGENT_CMD_ENV).unwrap_or_else(|| self.toml.agent.command.clone())
    }

    pub fn agent_args(&self) -> &[String] {
        &self.toml.agent.args
    }

    /// Submit command, if any (env → file). Runs in the project directory.
    pub fn feedback_command(&self) -> Option<SubprocessCommand> {
        let (command, args) = match env_override(FEEDBACK_CMD_ENV) {
            Some(command) => (command, Vec::new()),
            None => (
                self.toml.feedback.command.clone()?,
                self.toml.feedback.args.clone(),
            ),
        };
        Some(
            SubprocessCommand::new(command)
                .with_args(args)
                .with_working_dir(&self.project_dir),
        )
    }

    pub fn validate(&self) -> Vec<String> {
        self.toml.validate()
    }
}
