//! Submission sequencer.
//!
//! Blocks are queued on an unbounded FIFO channel and drained by a single
//! worker task, which gives strict arrival order and at most one submission
//! running at any time. A failed or panicking submission is reported and the
//! worker moves on; nothing breaks the chain.

use super::collector::FeedbackBlock;
use super::submit::SubmitTarget;
use crate::errors::{FeedbackError, SubmitError};
use crate::ui::icons::{CHECK, CROSS, FEEDBACK};
use crate::ui::output::Channels;
use chrono::{DateTime, Utc};
use console::style;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A feedback block accepted for processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// 1-based, strictly increasing in acceptance order.
    pub submission_number: u64,
    pub block_index: u64,
}

/// Result of handling one submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionOutcome {
    pub submission: Submission,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SubmissionOutcome {
    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

/// Whether a submission is currently being handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerState {
    Idle,
    Running,
}

/// Hook called by the worker whenever the queue drains.
///
/// Runs while `submit` is locked out, so it sees an up-to-date
/// [`SubmissionSequencer::in_flight`]. It must not call `submit` or `close`.
pub type IdleNotifier = Arc<dyn Fn() + Send + Sync>;

/// Construction options for [`SubmissionSequencer`].
#[derive(Clone, Default)]
pub struct SequencerOptions {
    /// Stream subprocess output to the telemetry channel.
    pub verbose: bool,
    pub on_idle: Option<IdleNotifier>,
}

struct Shared {
    /// `None` once closed. Also guards the in-flight count against the idle
    /// check, see [`run_worker`].
    sender: Mutex<Option<mpsc::UnboundedSender<Submission>>>,
    target: SubmitTarget,
    channels: Channels,
    verbose: bool,
    on_idle: Option<IdleNotifier>,
    in_flight: AtomicUsize,
    running: AtomicBool,
}

/// Serializes submission handling behind a single worker task.
pub struct SubmissionSequencer {
    worker: Mutex<Option<JoinHandle<Vec<SubmissionOutcome>>>>,
    next_number: AtomicU64,
    shared: Arc<Shared>,
}

impl SubmissionSequencer {
    /// Spawn the worker on the current tokio runtime.
    pub fn spawn(target: SubmitTarget, channels: Channels, options: SequencerOptions) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            sender: Mutex::new(Some(tx)),
            target,
            channels,
            verbose: options.verbose,
            on_idle: options.on_idle,
            in_flight: AtomicUsize::new(0),
            running: AtomicBool::new(false),
        });
        let worker = tokio::spawn(run_worker(rx, shared.clone()));
        tracing::debug!(target = %shared.target.describe(), "submission sequencer started");
        Self {
            worker: Mutex::new(Some(worker)),
            next_number: AtomicU64::new(1),
            shared,
        }
    }

    /// Queue a block for submission.
    ///
    /// Returns the assigned submission number, or `None` when the block is
    /// empty after trimming (silently dropped).
    pub fn submit(&self, block: FeedbackBlock) -> Result<Option<u64>, FeedbackError> {
        let content = block.text.trim_end().to_string();
        if content.trim().is_empty() {
            return Ok(None);
        }

        let sender = self.shared.lock_sender();
        let Some(tx) = sender.as_ref() else {
            return Err(FeedbackError::SequencerClosed {
                block_index: block.block_index,
            });
        };

        // Numbered under the sender lock so numbers follow channel order.
        let submission_number = self.next_number.fetch_add(1, Ordering::SeqCst);
        self.shared.in_flight.fetch_add(1, Ordering::SeqCst);
        let submission = Submission {
            content,
            timestamp: Utc::now(),
            submission_number,
            block_index: block.block_index,
        };
        if tx.send(submission).is_err() {
            self.shared.in_flight.fetch_sub(1, Ordering::SeqCst);
            return Err(FeedbackError::SequencerClosed {
                block_index: block.block_index,
            });
        }
        tracing::debug!(submission = submission_number, "feedback queued");
        Ok(Some(submission_number))
    }

    /// Stop accepting new blocks. Already queued blocks still run.
    pub fn close(&self) {
        if self.shared.lock_sender().take().is_some() {
            tracing::debug!("submission sequencer closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock_sender().is_none()
    }

    /// Queued plus running submissions.
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> SequencerState {
        if self.shared.running.load(Ordering::SeqCst) {
            SequencerState::Running
        } else {
            SequencerState::Idle
        }
    }

    /// Close, drain everything already queued, and return all outcomes in
    /// submission order. A second call returns an empty list.
    pub async fn shutdown(&self) -> Result<Vec<SubmissionOutcome>, FeedbackError> {
        self.close();
        let worker = self.worker.lock().unwrap_or_else(|p| p.into_inner()).take();
        match worker {
            Some(handle) => handle
                .await
                .map_err(|err| FeedbackError::WorkerPanicked(err.to_string())),
            None => Ok(Vec::new()),
        }
    }
}

impl Drop for SubmissionSequencer {
    fn drop(&mut self) {
        // The worker shares the sender; closing lets it finish.
        self.close();
    }
}

impl std::fmt::Debug for SubmissionSequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmissionSequencer")
            .field("target", &self.shared.target)
            .field("in_flight", &self.in_flight())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Shared {
    fn lock_sender(&self) -> MutexGuard<'_, Option<mpsc::UnboundedSender<Submission>>> {
        self.sender.lock().unwrap_or_else(|p| p.into_inner())
    }
}

async fn run_worker(
    mut rx: mpsc::UnboundedReceiver<Submission>,
    shared: Arc<Shared>,
) -> Vec<SubmissionOutcome> {
    let mut outcomes = Vec::new();
    while let Some(submission) = rx.recv().await {
        shared.running.store(true, Ordering::SeqCst);
        let outcome = handle_submission(&shared, submission).await;
        shared.running.store(false, Ordering::SeqCst);
        outcomes.push(outcome);

        // `submit` counts under the same lock, so a block queued concurrently
        // is either seen here or arrives after the idle hook has run.
        let _gate = shared.lock_sender();
        if shared.in_flight.fetch_sub(1, Ordering::SeqCst) == 1
            && let Some(on_idle) = &shared.on_idle
        {
            on_idle();
        }
    }
    tracing::debug!(handled = outcomes.len(), "submission worker finished");
    outcomes
}

async fn handle_submission(shared: &Shared, submission: Submission) -> SubmissionOutcome {
    let number = submission.submission_number;
    let primary = &shared.channels.primary;
    let line_count = submission.content.lines().count();
    primary.write_line(&format!(
        "{}Submitting feedback #{} {}",
        FEEDBACK,
        number,
        style(format!("({} line{})", line_count, if line_count == 1 { "" } else { "s" })).dim()
    ));

    let started_at = Utc::now();
    let attempt = AssertUnwindSafe(dispatch(shared, &submission.content))
        .catch_unwind()
        .await;
    let result = match attempt {
        Ok(result) => result,
        Err(_) => Err(SubmitError::Handler(anyhow::anyhow!(
            "submit handler panicked"
        ))),
    };
    let finished_at = Utc::now();

    let error = match result {
        Ok(()) => {
            tracing::info!(submission = number, "feedback submitted");
            primary.write_line(&format!(
                "{}Feedback #{} submitted",
                CHECK,
                style(number).green()
            ));
            None
        }
        Err(err) => {
            tracing::warn!(submission = number, error = %err, "feedback submission failed");
            primary.write_line(&format!(
                "{}Feedback #{} failed: {}",
                CROSS,
                style(number).red(),
                err
            ));
            Some(err.to_string())
        }
    };

    SubmissionOutcome {
        success: error.is_none(),
        submission,
        started_at,
        finished_at,
        error,
    }
}

async fn dispatch(shared: &Shared, text: &str) -> Result<(), SubmitError> {
    match &shared.target {
        SubmitTarget::Custom(handler) => handler.submit(text).await,
        SubmitTarget::Subprocess(cmd) => {
            let log = shared
                .verbose
                .then(|| shared.channels.telemetry.clone());
            cmd.run(text, log).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::submit::{SubmitHandler, SubprocessCommand};
    use crate::ui::output::ChannelKind;
    use async_trait::async_trait;
    use std::sync::{OnceLock, Weak};
    use std::time::Duration;

    fn block(text: &str, index: u64) -> FeedbackBlock {
        FeedbackBlock {
            text: text.to_string(),
            block_index: index,
            completed_at: Utc::now(),
        }
    }

    /// Records start/end instants and tracks concurrent entries.
    #[derive(Default)]
    struct RecordingHandler {
        active: AtomicUsize,
        max_active: AtomicUsize,
        seen: Mutex<Vec<String>>,
        fail_on: Option<&'static str>,
        panic_on: Option<&'static str>,
    }

    #[async_trait]
    impl SubmitHandler for RecordingHandler {
        async fn submit(&self, text: &str) -> Result<(), SubmitError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.seen.lock().unwrap().push(text.to_string());
            self.active.fetch_sub(1, Ordering::SeqCst);
            if self.panic_on == Some(text) {
                panic!("handler exploded");
            }
            if self.fail_on == Some(text) {
                return Err(SubmitError::Handler(anyhow::anyhow!("rejected {}", text)));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_submissions_run_in_order_without_overlap() {
        let handler = Arc::new(RecordingHandler::default());
        let (channels, _) = Channels::capture();
        let sequencer = SubmissionSequencer::spawn(
            SubmitTarget::Custom(handler.clone()),
            channels,
            SequencerOptions::default(),
        );

        for i in 1..=5 {
            sequencer.submit(block(&format!("block {}", i), i)).unwrap();
        }
        let outcomes = sequencer.shutdown().await.unwrap();

        assert_eq!(outcomes.len(), 5);
        assert_eq!(handler.max_active.load(Ordering::SeqCst), 1);
        for (i, outcome) in outcomes.iter().enumerate() {
            assert_eq!(outcome.submission.submission_number, i as u64 + 1);
            assert_eq!(outcome.submission.content, format!("block {}", i + 1));
            assert!(outcome.success);
        }
        for pair in outcomes.windows(2) {
            assert!(pair[0].finished_at <= pair[1].started_at);
            assert!(pair[0].submission.timestamp <= pair[1].submission.timestamp);
        }
        assert_eq!(
            *handler.seen.lock().unwrap(),
            vec!["block 1", "block 2", "block 3", "block 4", "block 5"]
        );
    }

    #[tokio::test]
    async fn test_failure_does_not_break_chain() {
        let handler = Arc::new(RecordingHandler {
            fail_on: Some("bad"),
            ..Default::default()
        });
        let (channels, transcript) = Channels::capture();
        let sequencer = SubmissionSequencer::spawn(
            SubmitTarget::Custom(handler.clone()),
            channels,
            SequencerOptions::default(),
        );

        sequencer.submit(block("good", 1)).unwrap();
        sequencer.submit(block("bad", 2)).unwrap();
        sequencer.submit(block("after", 3)).unwrap();
        let outcomes = sequencer.shutdown().await.unwrap();

        let successes: Vec<bool> = outcomes.iter().map(|o| o.success).collect();
        assert_eq!(successes, vec![true, false, true]);
        assert!(outcomes[1].error.as_deref().unwrap().contains("rejected bad"));

        let primary = console::strip_ansi_codes(&transcript.text(ChannelKind::Primary)).to_string();
        assert!(primary.contains("Feedback #1 submitted"));
        assert!(primary.contains("Feedback #2 failed: rejected bad"));
        assert!(primary.contains("Feedback #3 submitted"));
    }

    #[tokio::test]
    async fn test_panicking_handler_is_reported_as_failure() {
        let handler = Arc::new(RecordingHandler {
            panic_on: Some("boom"),
            ..Default::default()
        });
        let (channels, _) = Channels::capture();
        let sequencer = SubmissionSequencer::spawn(
            SubmitTarget::Custom(handler),
            channels,
            SequencerOptions::default(),
        );
        sequencer.submit(block("boom", 1)).unwrap();
        sequencer.submit(block("fine", 2)).unwrap();
        let outcomes = sequencer.shutdown().await.unwrap();
        assert!(!outcomes[0].success);
        assert!(outcomes[1].success);
    }

    #[tokio::test]
    async fn test_empty_blocks_are_dropped_silently() {
        let handler = Arc::new(RecordingHandler::default());
        let (channels, transcript) = Channels::capture();
        let sequencer = SubmissionSequencer::spawn(
            SubmitTarget::Custom(handler),
            channels,
            SequencerOptions::default(),
        );
        assert_eq!(sequencer.submit(block("  \n\n", 1)).unwrap(), None);
        assert_eq!(sequencer.submit(block("real", 2)).unwrap(), Some(1));
        let outcomes = sequencer.shutdown().await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(!transcript.text(ChannelKind::Primary).contains("#2"));
    }

    #[tokio::test]
    async fn test_closed_sequencer_rejects_new_blocks() {
        let handler = Arc::new(RecordingHandler::default());
        let sequencer = SubmissionSequencer::spawn(
            SubmitTarget::Custom(handler),
            Channels::null(),
            SequencerOptions::default(),
        );
        sequencer.submit(block("queued", 1)).unwrap();
        sequencer.close();
        let err = sequencer.submit(block("late", 2)).unwrap_err();
        assert!(matches!(err, FeedbackError::SequencerClosed { block_index: 2 }));

        // The block queued before close still runs.
        let outcomes = sequencer.shutdown().await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(sequencer.shutdown().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_on_idle_fires_when_queue_drains() {
        let idle_calls = Arc::new(AtomicUsize::new(0));
        let counter = idle_calls.clone();
        let handler = Arc::new(RecordingHandler::default());
        let sequencer = SubmissionSequencer::spawn(
            SubmitTarget::Custom(handler),
            Channels::null(),
            SequencerOptions {
                verbose: false,
                on_idle: Some(Arc::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                })),
            },
        );
        sequencer.submit(block("a", 1)).unwrap();
        sequencer.submit(block("b", 2)).unwrap();
        assert!(sequencer.in_flight() >= 1);
        sequencer.shutdown().await.unwrap();

        assert_eq!(sequencer.in_flight(), 0);
        assert_eq!(sequencer.state(), SequencerState::Idle);
        // Both blocks were queued before the worker ran, so the queue
        // drained exactly once.
        assert_eq!(idle_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_idle_hook_never_sees_queued_work() {
        let slot: Arc<OnceLock<Weak<SubmissionSequencer>>> = Arc::new(OnceLock::new());
        let idle_calls = Arc::new(AtomicUsize::new(0));
        let stale_calls = Arc::new(AtomicUsize::new(0));
        let on_idle: IdleNotifier = {
            let slot = slot.clone();
            let idle_calls = idle_calls.clone();
            let stale_calls = stale_calls.clone();
            Arc::new(move || {
                idle_calls.fetch_add(1, Ordering::SeqCst);
                if let Some(sequencer) = slot.get().and_then(Weak::upgrade)
                    && sequencer.in_flight() != 0
                {
                    stale_calls.fetch_add(1, Ordering::SeqCst);
                }
            })
        };
        let sequencer = Arc::new(SubmissionSequencer::spawn(
            SubmitTarget::Custom(Arc::new(RecordingHandler::default())),
            Channels::null(),
            SequencerOptions {
                verbose: false,
                on_idle: Some(on_idle),
            },
        ));
        let _ = slot.set(Arc::downgrade(&sequencer));

        // Uneven gaps so the queue sometimes drains just as a block arrives.
        for i in 0..60u64 {
            sequencer.submit(block(&format!("block {}", i), i + 1)).unwrap();
            tokio::time::sleep(Duration::from_millis(i % 4 * 2)).await;
        }
        sequencer.shutdown().await.unwrap();

        assert!(idle_calls.load(Ordering::SeqCst) >= 1);
        assert_eq!(stale_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dropping_sequencer_stops_worker() {
        let handler = Arc::new(RecordingHandler::default());
        let sequencer = SubmissionSequencer::spawn(
            SubmitTarget::Custom(handler.clone()),
            Channels::null(),
            SequencerOptions::default(),
        );
        sequencer.submit(block("queued", 1)).unwrap();
        let worker = sequencer.worker.lock().unwrap().take().unwrap();
        drop(sequencer);

        let outcomes = tokio::time::timeout(Duration::from_secs(5), worker)
            .await
            .expect("worker finishes once the sequencer is dropped")
            .unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(handler.seen.lock().unwrap().as_slice(), ["queued"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_subprocess_target_success_and_failure() {
        let (channels, transcript) = Channels::capture();
        let sequencer = SubmissionSequencer::spawn(
            SubmitTarget::Subprocess(SubprocessCommand::new("sh").with_args([
                "-c",
                "read line; echo \"ack $line\"; [ \"$line\" != fail ]",
            ])),
            channels,
            SequencerOptions {
                verbose: true,
                on_idle: None,
            },
        );
        sequencer.submit(block("ok", 1)).unwrap();
        sequencer.submit(block("fail", 2)).unwrap();
        sequencer.submit(block("ok again", 3)).unwrap();
        let outcomes = sequencer.shutdown().await.unwrap();

        let successes: Vec<bool> = outcomes.iter().map(|o| o.success).collect();
        assert_eq!(successes, vec![true, false, true]);
        let telemetry = transcript.text(ChannelKind::Telemetry);
        assert!(telemetry.contains("ack ok"));
        assert!(telemetry.contains("ack fail"));
    }
}
