//! Agent stdout → [`AgentEvent`] translation.
//!
//! The agent writes one JSON object per line. Lines in the agent CLI's
//! stream-json shape (`assistant`, `user`, `result`, `system`) are mapped onto
//! progress events; lines already shaped like an [`AgentEvent`] pass through
//! unchanged; anything else becomes an `info` event carrying the raw text.

use crate::progress::{AgentEvent, AgentEventKind};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

const TEXT_SNIPPET_LEN: usize = 80;

/// Events from the agent CLI's stream-json output.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    #[serde(rename = "assistant")]
    Assistant { message: AssistantMessage },

    #[serde(rename = "user")]
    User {
        #[serde(default)]
        message: Option<UserMessage>,
    },

    #[serde(rename = "result")]
    Result {
        #[serde(default)]
        subtype: String,
        #[serde(default)]
        result: Option<String>,
        #[serde(default)]
        is_error: bool,
        #[serde(default)]
        duration_ms: Option<u64>,
    },

    #[serde(rename = "system")]
    System {
        #[serde(default)]
        subtype: String,
        #[serde(default)]
        model: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "tool_use")]
    ToolUse {
        name: String,
        #[serde(default)]
        input: Value,
        #[serde(default)]
        id: String,
    },

    #[serde(rename = "text")]
    Text { text: String },

    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
pub struct UserMessage {
    #[serde(default)]
    pub content: Vec<UserContent>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum UserContent {
    #[serde(rename = "tool_result")]
    ToolResult {
        #[serde(default)]
        tool_use_id: String,
        #[serde(default)]
        is_error: bool,
    },

    #[serde(other)]
    Other,
}

/// Final status reported by a `result` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultSummary {
    pub is_error: bool,
    pub text: Option<String>,
    pub duration_ms: Option<u64>,
}

/// Stateful translator for one iteration's output.
///
/// Remembers tool names by id so completions can say what finished.
#[derive(Debug, Default)]
pub struct StreamTranslator {
    backend: Option<String>,
    pending_tools: HashMap<String, String>,
    result: Option<ResultSummary>,
}

impl StreamTranslator {
    pub fn new(backend: Option<String>) -> Self {
        Self {
            backend,
            ..Default::default()
        }
    }

    /// The `result` line seen so far, if any.
    pub fn result(&self) -> Option<&ResultSummary> {
        self.result.as_ref()
    }

    pub fn translate_line(&mut self, line: &str) -> Vec<AgentEvent> {
        let line = line.trim();
        if line.is_empty() {
            return Vec::new();
        }

        if let Ok(event) = serde_json::from_str::<AgentEvent>(line) {
            return vec![event];
        }

        match serde_json::from_str::<StreamEvent>(line) {
            Ok(event) => self.translate(event),
            Err(err) => {
                tracing::trace!(error = %err, "agent line is not a known event");
                vec![self.event(AgentEventKind::Info, truncate_str(line, TEXT_SNIPPET_LEN))]
            }
        }
    }

    fn translate(&mut self, event: StreamEvent) -> Vec<AgentEvent> {
        match event {
            StreamEvent::Assistant { message } => message
                .content
                .into_iter()
                .filter_map(|block| match block {
                    ContentBlock::ToolUse { name, input, id } => {
                        let content = format!(
                            "{} {}",
                            tool_emoji(&name),
                            describe_tool_use(&name, &input)
                        );
                        let mut event = self.event(AgentEventKind::ToolStart, content);
                        if !id.is_empty() {
                            self.pending_tools.insert(id.clone(), name);
                            event = event.with_tool_id(id);
                        }
                        Some(event)
                    }
                    ContentBlock::Text { text } => {
                        let snippet = first_line_snippet(&text, TEXT_SNIPPET_LEN);
                        (!snippet.is_empty()).then(|| self.event(AgentEventKind::Info, snippet))
                    }
                    ContentBlock::Other => None,
                })
                .collect(),

            StreamEvent::User { message } => message
                .map(|m| m.content)
                .unwrap_or_default()
                .into_iter()
                .filter_map(|content| match content {
                    UserContent::ToolResult {
                        tool_use_id,
                        is_error,
                    } => {
                        let name = self
                            .pending_tools
                            .remove(&tool_use_id)
                            .unwrap_or_else(|| "tool".to_string());
                        let mut event = self
                            .event(AgentEventKind::ToolComplete, format!("{} finished", name));
                        if !tool_use_id.is_empty() {
                            event = event.with_tool_id(tool_use_id);
                        }
                        if is_error {
                            event = event.with_error("tool reported an error");
                        }
                        Some(event)
                    }
                    UserContent::Other => None,
                })
                .collect(),

            StreamEvent::Result {
                subtype,
                result,
                is_error,
                duration_ms,
            } => {
                self.result = Some(ResultSummary {
                    is_error,
                    text: result.clone(),
                    duration_ms,
                });
                let summary = result
                    .as_deref()
                    .map(|r| first_line_snippet(r, TEXT_SNIPPET_LEN))
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| subtype.clone());
                if is_error {
                    vec![
                        self.event(AgentEventKind::Error, "agent reported an error")
                            .with_error(summary),
                    ]
                } else {
                    vec![self.event(AgentEventKind::IterationComplete, summary)]
                }
            }

            StreamEvent::System { subtype, model } => {
                let content = match model {
                    Some(model) => format!("{} ({})", subtype, model),
                    None => subtype,
                };
                vec![self.event(AgentEventKind::StreamStart, content)]
            }
        }
    }

    fn event(&self, kind: AgentEventKind, content: impl Into<String>) -> AgentEvent {
        let event = AgentEvent::new(kind, content);
        match &self.backend {
            Some(backend) => event.with_backend(backend.clone()),
            None => event,
        }
    }
}

/// Human-readable description of a tool invocation.
pub fn describe_tool_use(name: &str, input: &Value) -> String {
    let field = |key: &str| input.get(key).and_then(|v| v.as_str());
    match name {
        "Read" => format!("Reading: {}", field("file_path").map(shorten_path).unwrap_or_else(|| "file".into())),
        "Write" => format!("Creating: {}", field("file_path").map(shorten_path).unwrap_or_else(|| "file".into())),
        "Edit" => format!("Editing: {}", field("file_path").map(shorten_path).unwrap_or_else(|| "file".into())),
        "Bash" => format!(
            "Running: {}",
            field("command")
                .map(|c| truncate_str(c, 40))
                .unwrap_or_else(|| "command".into())
        ),
        "Glob" => format!("Searching: {}", field("pattern").unwrap_or("*")),
        "Grep" => format!(
            "Grep: {}",
            field("pattern")
                .map(|p| truncate_str(p, 30))
                .unwrap_or_else(|| "pattern".into())
        ),
        "Task" => format!("Agent: {}", field("description").unwrap_or("subagent")),
        _ => name.to_string(),
    }
}

pub fn tool_emoji(name: &str) -> &'static str {
    match name {
        "Read" => "\u{1F4D6}",
        "Write" => "\u{1F4DD}",
        "Edit" => "\u{270F}\u{FE0F}",
        "Bash" => "\u{2699}\u{FE0F}",
        "Glob" => "\u{1F50D}",
        "Grep" => "\u{1F50E}",
        "Task" => "\u{1F916}",
        _ => "\u{1F527}",
    }
}

/// Last two path components.
fn shorten_path(path: &str) -> String {
    let parts: Vec<&str> = path.split('/').collect();
    if parts.len() <= 2 {
        path.to_string()
    } else {
        parts[parts.len() - 2..].join("/")
    }
}

/// Truncate on a char boundary, appending "..." when shortened.
pub fn truncate_str(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

fn first_line_snippet(text: &str, max_chars: usize) -> String {
    let first_line = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    truncate_str(first_line.trim(), max_chars)
}
