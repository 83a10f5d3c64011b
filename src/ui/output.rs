//! Output channels.
//!
//! Relay writes to two physically distinct channels:
//! - the *primary* channel for human-facing lines (block echo, success and
//!   failure indicators, the redisplay newline)
//! - the *telemetry* channel for flushed progress events and verbose
//!   subprocess logs
//!
//! Keeping them separate is what makes the flush ordering observable: all
//! telemetry writes of a flush land before the primary-channel redisplay.

use std::io::Write;
use std::sync::{Arc, Mutex};

/// Which of the two channels a line was written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Primary,
    Telemetry,
}

/// A write-only text sink. Writes are best-effort and never fail the caller.
pub trait OutputSink: Send + Sync {
    /// Write `text` exactly as given.
    fn write(&self, text: &str);

    /// Write `line` followed by a newline.
    fn write_line(&self, line: &str) {
        self.write(&format!("{}\n", line));
    }
}

/// Sink writing to the process stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl OutputSink for StdoutSink {
    fn write(&self, text: &str) {
        let mut out = std::io::stdout().lock();
        let _ = out.write_all(text.as_bytes()).and_then(|_| out.flush());
    }
}

/// Sink writing to the process stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrSink;

impl OutputSink for StderrSink {
    fn write(&self, text: &str) {
        let mut err = std::io::stderr().lock();
        let _ = err.write_all(text.as_bytes()).and_then(|_| err.flush());
    }
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl OutputSink for NullSink {
    fn write(&self, _text: &str) {}
}

/// One write recorded by a [`CaptureSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    pub channel: ChannelKind,
    pub text: String,
}

/// Shared, ordered record of writes across both channels.
#[derive(Debug, Default, Clone)]
pub struct Transcript {
    entries: Arc<Mutex<Vec<TranscriptEntry>>>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, channel: ChannelKind, text: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(TranscriptEntry {
                channel,
                text: text.to_string(),
            });
        }
    }

    /// All writes so far, in global write order.
    pub fn entries(&self) -> Vec<TranscriptEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// Concatenated text written to one channel.
    pub fn text(&self, channel: ChannelKind) -> String {
        self.entries()
            .into_iter()
            .filter(|e| e.channel == channel)
            .map(|e| e.text)
            .collect()
    }
}

/// Sink recording writes into a shared [`Transcript`].
#[derive(Debug, Clone)]
pub struct CaptureSink {
    channel: ChannelKind,
    transcript: Transcript,
}

impl CaptureSink {
    pub fn new(channel: ChannelKind, transcript: Transcript) -> Self {
        Self {
            channel,
            transcript,
        }
    }
}

impl OutputSink for CaptureSink {
    fn write(&self, text: &str) {
        self.transcript.push(self.channel, text);
    }
}

/// The pair of output channels handed to the feedback subsystem.
#[derive(Clone)]
pub struct Channels {
    pub primary: Arc<dyn OutputSink>,
    pub telemetry: Arc<dyn OutputSink>,
}

impl Channels {
    pub fn new(primary: Arc<dyn OutputSink>, telemetry: Arc<dyn OutputSink>) -> Self {
        Self { primary, telemetry }
    }

    /// Primary on stdout, telemetry on stderr.
    pub fn stdio() -> Self {
        Self::new(Arc::new(StdoutSink), Arc::new(StderrSink))
    }

    /// Both channels discarded.
    pub fn null() -> Self {
        Self::new(Arc::new(NullSink), Arc::new(NullSink))
    }

    /// Both channels recorded into one transcript, for tests and dry runs.
    pub fn capture() -> (Self, Transcript) {
        let transcript = Transcript::new();
        let channels = Self::new(
            Arc::new(CaptureSink::new(ChannelKind::Primary, transcript.clone())),
            Arc::new(CaptureSink::new(ChannelKind::Telemetry, transcript.clone())),
        );
        (channels, transcript)
    }
}

impl std::fmt::Debug for Channels {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channels").finish_non_exhaustive()
    }
}
