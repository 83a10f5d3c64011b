//! Feedback-mode controller.
//!
//! While the operator is typing (or a feedback block is being submitted) the
//! agent's progress events are held back in a bounded [`EventBuffer`] instead
//! of being rendered. When feedback mode ends, the held events are flushed to
//! the telemetry channel oldest first, and only on a *later* scheduler turn is
//! the primary channel touched again (a newline plus the redisplay callback).
//! That deferral keeps telemetry writes from interleaving with the redraw of
//! a half-typed input line on terminals without raw-mode redraw.

use crate::progress::{DEFAULT_BUFFER_CAPACITY, EventBuffer, ProgressEvent};
use crate::ui::output::Channels;
use console::style;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;

/// Zero-argument hook invoked after a flush to redraw partial input.
pub type RedisplayCallback = Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

/// Redisplay hook that reprints `prompt` on the primary channel.
pub fn prompt_redisplay(channels: &Channels, prompt: impl Into<String>) -> RedisplayCallback {
    let primary = channels.primary.clone();
    let prompt = prompt.into();
    Arc::new(move || -> anyhow::Result<()> {
        primary.write(&prompt);
        Ok(())
    })
}

struct ModeState {
    active: bool,
    buffer: EventBuffer,
    redisplay: Option<RedisplayCallback>,
    pending_redisplays: Vec<JoinHandle<()>>,
}

/// Active/inactive state machine owning the progress event buffer.
///
/// One instance per command context, shared by `Arc` between the input
/// reader, the submission worker and the progress router. All state sits
/// behind one mutex that is never held across an await.
pub struct FeedbackMode {
    state: Mutex<ModeState>,
    channels: Channels,
}

impl FeedbackMode {
    pub fn new(channels: Channels) -> Self {
        Self::with_capacity(channels, DEFAULT_BUFFER_CAPACITY)
    }

    pub fn with_capacity(channels: Channels, capacity: usize) -> Self {
        Self {
            state: Mutex::new(ModeState {
                active: false,
                buffer: EventBuffer::new(capacity),
                redisplay: None,
                pending_redisplays: Vec::new(),
            }),
            channels,
        }
    }

    /// Builder form of [`Self::set_redisplay_callback`].
    pub fn with_redisplay(self, callback: RedisplayCallback) -> Self {
        self.set_redisplay_callback(Some(callback));
        self
    }

    pub fn set_redisplay_callback(&self, callback: Option<RedisplayCallback>) {
        self.lock().redisplay = callback;
    }

    pub fn is_active(&self) -> bool {
        self.lock().active
    }

    /// Transition feedback mode.
    ///
    /// Activating is idempotent. Deactivating runs the flush protocol before
    /// returning if any events were buffered; with an empty buffer nothing is
    /// written at all.
    pub fn set_active(&self, active: bool) {
        let mut state = self.lock();
        if active {
            if !state.active {
                tracing::debug!("feedback mode activated");
            }
            state.active = true;
            return;
        }

        if !state.active {
            return;
        }
        state.active = false;
        tracing::debug!(buffered = state.buffer.len(), "feedback mode deactivated");

        if state.buffer.is_empty() {
            return;
        }

        // Held under the lock so a concurrent pass-through event cannot be
        // rendered ahead of older buffered ones.
        let evicted = state.buffer.evicted_count();
        let events = state.buffer.drain();
        self.write_flush(&events, evicted);

        let callback = state.redisplay.clone();
        let primary = self.channels.primary.clone();
        let redisplay = move || {
            primary.write("\n");
            if let Some(callback) = callback {
                invoke_redisplay(&callback);
            }
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let task = handle.spawn(async move {
                    tokio::task::yield_now().await;
                    redisplay();
                });
                state.pending_redisplays.retain(|task| !task.is_finished());
                state.pending_redisplays.push(task);
            }
            Err(_) => redisplay(),
        }
    }

    /// Buffer `event` while active; hand it back for direct rendering otherwise.
    pub fn buffer_or_passthrough(&self, event: ProgressEvent) -> Option<ProgressEvent> {
        let mut state = self.lock();
        if !state.active {
            return Some(event);
        }
        if let Some(dropped) = state.buffer.push(event) {
            tracing::trace!(content = dropped.content(), "progress buffer full, evicted oldest");
        }
        None
    }

    pub fn buffered_len(&self) -> usize {
        self.lock().buffer.len()
    }

    /// Copy of the currently buffered events, oldest first.
    pub fn buffered_events(&self) -> Vec<ProgressEvent> {
        self.lock().buffer.iter().cloned().collect()
    }

    /// Wait for every deferred redisplay scheduled so far to finish.
    pub async fn settle(&self) {
        let pending = std::mem::take(&mut self.lock().pending_redisplays);
        for task in pending {
            if let Err(err) = task.await {
                tracing::warn!(error = %err, "redisplay task failed");
            }
        }
    }

    fn write_flush(&self, events: &[ProgressEvent], evicted: u64) {
        let telemetry = &self.channels.telemetry;
        let header = if evicted > 0 {
            format!(
                "── {} progress update(s) held during feedback ({} older dropped) ──",
                events.len(),
                evicted
            )
        } else {
            format!(
                "── {} progress update(s) held during feedback ──",
                events.len()
            )
        };
        telemetry.write_line(&style(header).dim().to_string());
        for event in events {
            telemetry.write_line(&event.render());
        }
        telemetry.write_line(&style("──").dim().to_string());
    }

    fn lock(&self) -> MutexGuard<'_, ModeState> {
        // A poisoned lock only means a writer panicked mid-update; the state
        // itself is always consistent between statements.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for FeedbackMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("FeedbackMode")
            .field("active", &state.active)
            .field("buffered", &state.buffer.len())
            .finish()
    }
}

fn invoke_redisplay(callback: &RedisplayCallback) {
    match catch_unwind(AssertUnwindSafe(|| callback())) {
        Ok(Ok(())) => {}
        Ok(Err(err)) => tracing::warn!(error = %err, "redisplay callback failed"),
        Err(_) => tracing::warn!("redisplay callback panicked"),
    }
}
