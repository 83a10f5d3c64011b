//! Agent session runner.
//!
//! Runs the configured agent command once per iteration with the prompt on
//! stdin, turns its stdout into progress events and routes every event
//! through [`FeedbackMode`], so nothing reaches the terminal while the
//! operator is typing or a submission is in flight.

use crate::errors::SessionError;
use crate::feedback::{FeedbackMode, SubprocessCommand};
use crate::metrics::SessionMetrics;
use crate::progress::{AgentEvent, AgentEventKind, ProgressEvent};
use crate::stream::StreamTranslator;
use crate::ui::{Channels, SessionUI};
use anyhow::Context;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};

/// What one iteration produced.
#[derive(Debug, Clone, Serialize)]
pub struct IterationOutcome {
    pub iteration: u32,
    pub success: bool,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    pub events: usize,
    pub summary: Option<String>,
}

/// Iteration loop around one agent command.
pub struct SessionRunner {
    agent: SubprocessCommand,
    iterations: u32,
    mode: Arc<FeedbackMode>,
    channels: Channels,
    ui: Option<Arc<SessionUI>>,
    backend: Option<String>,
}

impl SessionRunner {
    pub fn new(
        agent: SubprocessCommand,
        iterations: u32,
        mode: Arc<FeedbackMode>,
        channels: Channels,
    ) -> Self {
        let backend = Path::new(&agent.command)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());
        Self {
            agent,
            iterations: iterations.max(1),
            mode,
            channels,
            ui: None,
            backend,
        }
    }

    pub fn with_ui(mut self, ui: Arc<SessionUI>) -> Self {
        self.ui = Some(ui);
        self
    }

    fn log_step(&self, msg: &str) {
        if let Some(ui) = &self.ui {
            ui.log_step(msg);
        }
    }

    /// Run every iteration in order. A failing iteration is recorded and the
    /// loop continues; only a spawn or I/O failure ends the session early.
    pub async fn run(
        &self,
        prompt: &str,
        metrics: &mut SessionMetrics,
    ) -> Result<Vec<IterationOutcome>, SessionError> {
        tracing::info!(
            session = %metrics.session_id(),
            agent = %self.agent.display(),
            iterations = self.iterations,
            "agent session starting"
        );
        let mut outcomes = Vec::with_capacity(self.iterations as usize);
        for iteration in 1..=self.iterations {
            let outcome = self.run_iteration(iteration, prompt, metrics).await?;
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    async fn run_iteration(
        &self,
        iteration: u32,
        prompt: &str,
        metrics: &mut SessionMetrics,
    ) -> Result<IterationOutcome, SessionError> {
        let timer = format!("iteration-{}", iteration);
        metrics.start_timer(&timer, Some(serde_json::json!({ "iteration": iteration })));
        if let Some(ui) = &self.ui {
            ui.start_iteration(iteration, self.iterations);
        }
        let mut events = self.route(AgentEvent::new(
            AgentEventKind::IterationStart,
            format!("iteration {}/{}", iteration, self.iterations),
        ));

        self.log_step(&format!("spawning {}", self.agent.display()));
        let mut child = self
            .agent
            .piped_command()
            .spawn()
            .map_err(|source| SessionError::SpawnFailed {
                command: self.agent.command.clone(),
                source,
            })?;
        tracing::debug!(iteration, pid = ?child.id(), "agent spawned");

        // Output is drained while the prompt is written so neither pipe can
        // fill up and stall the agent.
        let stderr_task = child.stderr.take().map(|err| tokio::spawn(last_stderr_line(err)));
        let stdin_task = child.stdin.take().map(|mut stdin| {
            let prompt = prompt.to_owned();
            tokio::spawn(async move {
                stdin.write_all(prompt.as_bytes()).await?;
                stdin.shutdown().await
            })
        });

        let start = Instant::now();
        let elapsed_task = self.ui.clone().map(|ui| {
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(10));
                interval.tick().await;
                loop {
                    interval.tick().await;
                    ui.update_elapsed(start.elapsed());
                }
            })
        });

        let mut translator = StreamTranslator::new(self.backend.clone());
        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            while let Some(line) = lines
                .next_line()
                .await
                .context("Failed to read agent output")?
            {
                for event in translator.translate_line(&line) {
                    if event.kind == AgentEventKind::ToolStart {
                        self.log_step(&event.content);
                    }
                    events += self.route(event);
                }
            }
        }

        if let Some(task) = stdin_task {
            let written = task.await.context("Prompt writer task failed")?;
            if let Err(err) = written
                && err.kind() != std::io::ErrorKind::BrokenPipe
            {
                if let Some(task) = &elapsed_task {
                    task.abort();
                }
                return Err(anyhow::Error::new(err)
                    .context("Failed to write prompt to agent stdin")
                    .into());
            }
        }

        let status = child.wait().await.context("Failed to wait for agent")?;
        if let Some(task) = elapsed_task {
            task.abort();
        }
        let stderr_tail = match stderr_task {
            Some(task) => task.await.ok().flatten(),
            None => None,
        };

        let elapsed = start.elapsed();
        let duration_ms = metrics.end_timer(&timer);
        let result = translator.result();
        let reported_error = result.is_some_and(|r| r.is_error);
        let success = status.success() && !reported_error;
        metrics.record_iteration(success, Some(duration_ms));

        let summary = result
            .and_then(|r| r.text.clone())
            .or(stderr_tail)
            .map(|s| crate::stream::truncate_str(s.lines().next().unwrap_or(""), 80));

        let detail = match status.code() {
            Some(0) if reported_error => "agent reported an error".to_string(),
            Some(0) => summary.clone().unwrap_or_default(),
            Some(exit_code) => {
                let err = SessionError::AgentNonZeroExit {
                    iteration,
                    exit_code,
                };
                tracing::warn!(error = %err, "agent iteration failed");
                err.to_string()
            }
            None => "agent was terminated by a signal".to_string(),
        };

        events += self.route(AgentEvent::new(
            AgentEventKind::StreamEnd,
            match status.code() {
                Some(code) => format!("iteration {} ended (exit {})", iteration, code),
                None => format!("iteration {} ended (signal)", iteration),
            },
        ));
        if let Some(ui) = &self.ui {
            ui.iteration_done(success, elapsed, &detail);
        }
        tracing::info!(iteration, success, duration_ms, events, "agent iteration finished");

        Ok(IterationOutcome {
            iteration,
            success,
            exit_code: status.code(),
            duration_ms,
            events,
            summary,
        })
    }

    /// Hand one event to feedback mode; render it when not held back.
    fn route(&self, event: AgentEvent) -> usize {
        let progress = ProgressEvent::from(event);
        if let Some(event) = self.mode.buffer_or_passthrough(progress) {
            self.channels.telemetry.write_line(&event.render());
        }
        1
    }
}

async fn last_stderr_line<R>(reader: R) -> Option<String>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut last = None;
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!(target: "relay::agent", "{}", line);
        if !line.trim().is_empty() {
            last = Some(line);
        }
    }
    last
}

/// Resolve the prompt from an inline string or a file.
pub fn load_prompt(
    inline: Option<String>,
    file: Option<&Path>,
) -> Result<Option<String>, SessionError> {
    if let Some(text) = inline {
        return Ok(Some(text));
    }
    match file {
        Some(path) => std::fs::read_to_string(path)
            .map(Some)
            .map_err(|source| SessionError::PromptReadFailed {
                path: PathBuf::from(path),
                source,
            }),
        None => Ok(None),
    }
}
