//! Submit targets for feedback blocks.
//!
//! A sequencer is built with exactly one [`SubmitTarget`]:
//! - `Custom`: an injected async [`SubmitHandler`]
//! - `Subprocess`: an external command that receives the text on stdin and
//!   signals success with exit code 0

use crate::errors::SubmitError;
use crate::ui::output::OutputSink;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;

/// An asynchronous consumer of feedback text.
#[async_trait]
pub trait SubmitHandler: Send + Sync {
    async fn submit(&self, text: &str) -> Result<(), SubmitError>;
}

/// Description of an external submit command.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SubprocessCommand {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
}

impl SubprocessCommand {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_working_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.working_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// `command arg1 arg2`, for log lines.
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.command.clone()
        } else {
            format!("{} {}", self.command, self.args.join(" "))
        }
    }

    /// A tokio command with all three stdio streams piped, killed on drop.
    pub fn piped_command(&self) -> Command {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .envs(&self.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }

    /// Run the command once with `text` on stdin.
    ///
    /// Stdout and stderr are streamed line by line to `log` when given and
    /// discarded otherwise.
    pub async fn run(
        &self,
        text: &str,
        log: Option<Arc<dyn OutputSink>>,
    ) -> Result<(), SubmitError> {
        let mut child = self
            .piped_command()
            .spawn()
            .map_err(|source| SubmitError::SpawnFailed {
                command: self.command.clone(),
                source,
            })?;
        tracing::debug!(command = %self.display(), pid = ?child.id(), "submit command spawned");

        let stdout = child.stdout.take().map(|out| {
            tokio::spawn(stream_lines(out, log.clone(), ""))
        });
        let stderr = child.stderr.take().map(|err| {
            tokio::spawn(stream_lines(err, log.clone(), "[stderr] "))
        });

        if let Some(mut stdin) = child.stdin.take() {
            let payload = with_trailing_newline(text);
            let write = async {
                stdin.write_all(payload.as_bytes()).await?;
                stdin.shutdown().await
            };
            // A command that exits without reading stdin closes the pipe;
            // its exit code decides the outcome, not the broken pipe.
            if let Err(err) = write.await
                && err.kind() != std::io::ErrorKind::BrokenPipe
            {
                return Err(SubmitError::StdinWrite(err));
            }
        }

        let status = child.wait().await.map_err(SubmitError::WaitFailed)?;
        for task in [stdout, stderr].into_iter().flatten() {
            let _ = task.await;
        }

        match status.code() {
            Some(0) => Ok(()),
            Some(exit_code) => Err(SubmitError::NonZeroExit {
                command: self.command.clone(),
                exit_code,
            }),
            None => Err(SubmitError::Terminated {
                command: self.command.clone(),
            }),
        }
    }
}

async fn stream_lines<R>(reader: R, log: Option<Arc<dyn OutputSink>>, label: &'static str)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if let Some(log) = &log {
            log.write_line(&format!("    {}{}", label, line));
        }
    }
}

fn with_trailing_newline(text: &str) -> String {
    if text.ends_with('\n') {
        text.to_string()
    } else {
        format!("{}\n", text)
    }
}

/// Handler appending each submission to a markdown feedback file.
#[derive(Debug, Clone)]
pub struct FileAppendHandler {
    path: PathBuf,
}

impl FileAppendHandler {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SubmitHandler for FileAppendHandler {
    async fn submit(&self, text: &str) -> Result<(), SubmitError> {
        let file_err = |source| SubmitError::FileAppend {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.map_err(file_err)?;
        }

        let entry = format!(
            "## Feedback {}\n\n{}\n\n",
            Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
            text.trim_end()
        );
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(file_err)?;
        file.write_all(entry.as_bytes()).await.map_err(file_err)?;
        file.flush().await.map_err(file_err)?;
        Ok(())
    }
}

/// How a sequencer hands off each submission.
#[derive(Clone)]
pub enum SubmitTarget {
    Custom(Arc<dyn SubmitHandler>),
    Subprocess(SubprocessCommand),
}

impl SubmitTarget {
    pub fn custom(handler: impl SubmitHandler + 'static) -> Self {
        SubmitTarget::Custom(Arc::new(handler))
    }

    pub fn describe(&self) -> String {
        match self {
            SubmitTarget::Custom(_) => "custom handler".to_string(),
            SubmitTarget::Subprocess(cmd) => cmd.display(),
        }
    }
}

impl std::fmt::Debug for SubmitTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubmitTarget::Custom(_) => f.write_str("SubmitTarget::Custom"),
            SubmitTarget::Subprocess(cmd) => {
                f.debug_tuple("SubmitTarget::Subprocess").field(cmd).finish()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::output::{ChannelKind, Channels};
    use tempfile::tempdir;

    #[test]
    fn test_trailing_newline_is_added_once() {
        assert_eq!(with_trailing_newline("a"), "a\n");
        assert_eq!(with_trailing_newline("a\n"), "a\n");
    }

    #[test]
    fn test_display_joins_args() {
        let cmd = SubprocessCommand::new("hook").with_args(["--issue", "-v"]);
        assert_eq!(cmd.display(), "hook --issue -v");
        assert_eq!(SubprocessCommand::new("hook").display(), "hook");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_subprocess_receives_text_with_newline() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("received.txt");
        let cmd = SubprocessCommand::new("sh")
            .with_args(["-c", &format!("cat > '{}'", out.display())]);

        cmd.run("line one\nline two", None).await.unwrap();

        let received = std::fs::read_to_string(&out).unwrap();
        assert_eq!(received, "line one\nline two\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_subprocess_non_zero_exit_is_error() {
        let cmd = SubprocessCommand::new("sh").with_args(["-c", "cat > /dev/null; exit 3"]);
        let err = cmd.run("text", None).await.unwrap_err();
        assert!(matches!(err, SubmitError::NonZeroExit { exit_code: 3, .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_subprocess_output_streams_to_log() {
        let (channels, transcript) = Channels::capture();
        let cmd = SubprocessCommand::new("sh")
            .with_args(["-c", "read line; echo \"got $line\"; echo oops >&2"]);
        cmd.run("hello", Some(channels.telemetry.clone()))
            .await
            .unwrap();

        let log = transcript.text(ChannelKind::Telemetry);
        assert!(log.contains("got hello"));
        assert!(log.contains("[stderr] oops"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_subprocess_env_and_working_dir() {
        let dir = tempdir().unwrap();
        let cmd = SubprocessCommand::new("sh")
            .with_args(["-c", "cat > /dev/null; echo \"$RELAY_TAG\" > tag.txt"])
            .with_env("RELAY_TAG", "feedback")
            .with_working_dir(dir.path());
        cmd.run("x", None).await.unwrap();
        let tag = std::fs::read_to_string(dir.path().join("tag.txt")).unwrap();
        assert_eq!(tag.trim(), "feedback");
    }

    #[tokio::test]
    async fn test_missing_command_is_spawn_error() {
        let cmd = SubprocessCommand::new("relay-definitely-not-a-real-command");
        let err = cmd.run("x", None).await.unwrap_err();
        assert!(matches!(err, SubmitError::SpawnFailed { .. }));
    }

    #[tokio::test]
    async fn test_file_append_handler_appends_entries() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/USER_FEEDBACK.md");
        let handler = FileAppendHandler::new(&path);

        handler.submit("first note").await.unwrap();
        handler.submit("second\nnote\n").await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches("## Feedback ").count(), 2);
        let first = content.find("first note").unwrap();
        let second = content.find("second\nnote").unwrap();
        assert!(first < second);
    }
}
