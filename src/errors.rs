//! Typed error hierarchy for relay.
//!
//! Four top-level enums cover the subsystems:
//! - `FeedbackError`: feedback collection and sequencing
//! - `SubmitError`: a single submission attempt
//! - `SessionError`: agent session runner failures
//! - `MetricsError`: snapshot history persistence

use std::path::PathBuf;
use thiserror::Error;

/// Errors from the feedback subsystem.
#[derive(Debug, Error)]
pub enum FeedbackError {
    #[error("Submission sequencer is closed; block #{block_index} was not accepted")]
    SequencerClosed { block_index: u64 },

    #[error("Failed to read feedback input: {0}")]
    InputRead(#[source] std::io::Error),

    #[error("Sequencer worker terminated abnormally: {0}")]
    WorkerPanicked(String),
}

/// Errors from a single submission attempt.
///
/// These never cross the sequencer boundary: the worker reports them on the
/// human-facing channel and moves on to the next block.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("Failed to spawn submit command '{command}': {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write feedback to submit command stdin: {0}")]
    StdinWrite(#[source] std::io::Error),

    #[error("Failed to wait for submit command: {0}")]
    WaitFailed(#[source] std::io::Error),

    #[error("Submit command '{command}' exited with code {exit_code}")]
    NonZeroExit { command: String, exit_code: i32 },

    #[error("Submit command '{command}' was terminated by a signal")]
    Terminated { command: String },

    #[error("Failed to append feedback to {path}: {source}")]
    FileAppend {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Handler(#[from] anyhow::Error),
}

/// Errors from the agent session runner.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to spawn agent process '{command}': {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read prompt file at {path}: {source}")]
    PromptReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Agent exited with non-zero code {exit_code} in iteration {iteration}")]
    AgentNonZeroExit { iteration: u32, exit_code: i32 },

    #[error(transparent)]
    Feedback(#[from] FeedbackError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors from metrics persistence.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("Failed to read metrics history at {path}: {source}")]
    HistoryRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write metrics history at {path}: {source}")]
    HistoryWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Metrics history at {path} is not valid JSON: {source}")]
    HistoryParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize metrics: {0}")]
    Serialize(#[source] serde_json::Error),
}
