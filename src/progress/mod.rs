//! Progress telemetry emitted by a running agent.
//!
//! [`AgentEvent`] is the typed shape produced by the event source;
//! [`ProgressEvent`] is the display-ready form the feedback-mode controller
//! buffers and flushes.

pub mod buffer;

pub use buffer::{DEFAULT_BUFFER_CAPACITY, EventBuffer};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of a progress event emitted by the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentEventKind {
    ToolStart,
    ToolProgress,
    ToolComplete,
    IterationStart,
    IterationComplete,
    StreamStart,
    StreamEnd,
    Error,
    Info,
}

impl AgentEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentEventKind::ToolStart => "tool_start",
            AgentEventKind::ToolProgress => "tool_progress",
            AgentEventKind::ToolComplete => "tool_complete",
            AgentEventKind::IterationStart => "iteration_start",
            AgentEventKind::IterationComplete => "iteration_complete",
            AgentEventKind::StreamStart => "stream_start",
            AgentEventKind::StreamEnd => "stream_end",
            AgentEventKind::Error => "error",
            AgentEventKind::Info => "info",
        }
    }
}

impl std::fmt::Display for AgentEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed event from the agent's progress stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentEvent {
    #[serde(rename = "type")]
    pub kind: AgentEventKind,
    pub content: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, rename = "toolId", skip_serializing_if = "Option::is_none")]
    pub tool_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
    /// Completion percentage, 0-100.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AgentEvent {
    pub fn new(kind: AgentEventKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            timestamp: Utc::now(),
            tool_id: None,
            backend: None,
            progress: None,
            error: None,
        }
    }

    pub fn with_tool_id(mut self, tool_id: impl Into<String>) -> Self {
        self.tool_id = Some(tool_id.into());
        self
    }

    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = Some(backend.into());
        self
    }

    /// Set the completion percentage, clamped to 100.
    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress.min(100));
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Label shown in front of the content when rendered, e.g. `[codex:tool_start] `.
    pub fn prefix(&self) -> String {
        match &self.backend {
            Some(backend) => format!("[{}:{}] ", backend, self.kind),
            None => format!("[{}] ", self.kind),
        }
    }
}

/// A display-ready progress event.
///
/// Immutable once created; the controller moves it into its buffer or hands
/// it back to the caller, never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    content: String,
    prefix: Option<String>,
    timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            prefix: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_prefix(content: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            prefix: Some(prefix.into()),
            timestamp: Utc::now(),
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// `prefix + content` when a prefix is present, `content` otherwise.
    pub fn render(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}{}", prefix, self.content),
            None => self.content.clone(),
        }
    }
}

impl From<AgentEvent> for ProgressEvent {
    fn from(event: AgentEvent) -> Self {
        let prefix = event.prefix();
        let mut content = match &event.tool_id {
            Some(id) => format!("{} ({})", event.content, id),
            None => event.content,
        };
        if let Some(pct) = event.progress {
            content.push_str(&format!(" {}%", pct));
        }
        if let Some(err) = event.error {
            content.push_str(&format!(": {}", err));
        }
        Self {
            content,
            prefix: Some(prefix),
            timestamp: event.timestamp,
        }
    }
}
