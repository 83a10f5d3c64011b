//! Wiring between operator input, the sequencer and feedback mode.
//!
//! Feedback mode is active while the operator has a partial block typed or
//! any submission is queued or running. The input side re-evaluates this
//! after every chunk; the sequencer worker re-evaluates it each time its
//! queue drains.

use super::collector::{FeedbackBlock, LineBlockCollector};
use super::mode::FeedbackMode;
use super::sequencer::{IdleNotifier, SequencerOptions, SubmissionOutcome, SubmissionSequencer};
use super::submit::SubmitTarget;
use crate::errors::FeedbackError;
use crate::ui::output::Channels;
use std::future::Future;
use std::io::Read;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;

const READ_CHUNK_SIZE: usize = 4096;

/// What a finished feedback session did.
#[derive(Debug, Default)]
pub struct FeedbackSummary {
    pub blocks_collected: u64,
    pub outcomes: Vec<SubmissionOutcome>,
}

impl FeedbackSummary {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.success).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

/// Collector, sequencer and feedback mode bound together for one command.
pub struct FeedbackSession {
    collector: LineBlockCollector,
    sequencer: SubmissionSequencer,
    mode: Arc<FeedbackMode>,
    typing: Arc<AtomicBool>,
}

impl FeedbackSession {
    /// Start a session; spawns the sequencer worker on the current runtime.
    pub fn start(
        target: SubmitTarget,
        channels: Channels,
        mode: Arc<FeedbackMode>,
        verbose: bool,
    ) -> Self {
        let typing = Arc::new(AtomicBool::new(false));
        let on_idle: IdleNotifier = {
            let mode = mode.clone();
            let typing = typing.clone();
            Arc::new(move || {
                if !typing.load(Ordering::SeqCst) {
                    mode.set_active(false);
                }
            })
        };
        let sequencer = SubmissionSequencer::spawn(
            target,
            channels,
            SequencerOptions {
                verbose,
                on_idle: Some(on_idle),
            },
        );
        Self {
            collector: LineBlockCollector::new(),
            sequencer,
            mode,
            typing,
        }
    }

    pub fn mode(&self) -> &Arc<FeedbackMode> {
        &self.mode
    }

    pub fn sequencer(&self) -> &SubmissionSequencer {
        &self.sequencer
    }

    /// Feed one chunk of raw input.
    pub fn process_chunk(&mut self, chunk: &[u8]) -> Vec<FeedbackBlock> {
        let blocks = self.collector.push_chunk(chunk);
        self.dispatch(&blocks);
        self.refresh_activity();
        blocks
    }

    /// Read `reader` until end of input or until `stop` resolves.
    pub async fn pump<R, S>(&mut self, mut reader: R, stop: S) -> Result<(), FeedbackError>
    where
        R: AsyncRead + Unpin,
        S: Future<Output = ()>,
    {
        tokio::pin!(stop);
        let mut buf = vec![0u8; READ_CHUNK_SIZE];
        loop {
            tokio::select! {
                read = reader.read(&mut buf) => {
                    let n = read.map_err(FeedbackError::InputRead)?;
                    if n == 0 {
                        tracing::debug!("feedback input reached end of stream");
                        return Ok(());
                    }
                    self.process_chunk(&buf[..n]);
                }
                _ = &mut stop => {
                    tracing::debug!("feedback input stopped by owner");
                    return Ok(());
                }
            }
        }
    }

    /// Like [`pump`](Self::pump), fed from a chunk channel such as the one
    /// returned by [`spawn_stdin_reader`].
    pub async fn pump_channel<S>(
        &mut self,
        mut chunks: mpsc::UnboundedReceiver<std::io::Result<Vec<u8>>>,
        stop: S,
    ) -> Result<(), FeedbackError>
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(stop);
        loop {
            tokio::select! {
                chunk = chunks.recv() => match chunk {
                    Some(Ok(bytes)) => {
                        self.process_chunk(&bytes);
                    }
                    Some(Err(err)) => return Err(FeedbackError::InputRead(err)),
                    None => {
                        tracing::debug!("feedback input reached end of stream");
                        return Ok(());
                    }
                },
                _ = &mut stop => {
                    tracing::debug!("feedback input stopped by owner");
                    return Ok(());
                }
            }
        }
    }

    /// Flush any partial block, drain the sequencer and settle feedback mode.
    ///
    /// Must be awaited before shutdown is considered complete, otherwise a
    /// trailing submission can be lost.
    pub async fn finish(mut self) -> Result<FeedbackSummary, FeedbackError> {
        if let Some(block) = self.collector.finish() {
            self.dispatch(std::slice::from_ref(&block));
        }
        self.typing.store(false, Ordering::SeqCst);

        let outcomes = self.sequencer.shutdown().await?;
        self.mode.set_active(false);
        self.mode.settle().await;

        Ok(FeedbackSummary {
            blocks_collected: self.collector.blocks_emitted(),
            outcomes,
        })
    }

    fn dispatch(&self, blocks: &[FeedbackBlock]) {
        for block in blocks {
            if !self.mode.is_active() {
                self.mode.set_active(true);
            }
            if let Err(err) = self.sequencer.submit(block.clone()) {
                tracing::warn!(error = %err, "feedback block not accepted");
            }
        }
    }

    fn refresh_activity(&self) {
        let typing = self.collector.has_pending_input();
        self.typing.store(typing, Ordering::SeqCst);
        let busy = typing || self.sequencer.in_flight() > 0;
        self.mode.set_active(busy);
    }
}

/// Read process stdin on a detached OS thread.
///
/// Blocking stdin reads cannot be cancelled and must stay off the runtime's
/// blocking pool. The thread ends at end of input or when the receiver drops.
pub fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<std::io::Result<Vec<u8>>> {
    let (tx, rx) = mpsc::unbounded_channel();
    let spawned = std::thread::Builder::new()
        .name("relay-stdin".into())
        .spawn(move || {
            let mut stdin = std::io::stdin().lock();
            let mut buf = vec![0u8; READ_CHUNK_SIZE];
            loop {
                match stdin.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.send(Ok(buf[..n].to_vec())).is_err() {
                            break;
                        }
                    }
                    Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(err) => {
                        let _ = tx.send(Err(err));
                        break;
                    }
                }
            }
        });
    if let Err(err) = spawned {
        tracing::warn!(error = %err, "could not start stdin reader; feedback input disabled");
    }
    rx
}
