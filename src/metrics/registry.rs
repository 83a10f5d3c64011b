//! Per-session metrics and the hub that owns them.

use super::history::SnapshotHistory;
use super::resources::ResourceSampler;
use super::snapshot::{self, PerformanceSnapshot};
use super::timer::TimerRegistry;
use chrono::{DateTime, Utc};
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Counters, timers and custom metrics of one session.
#[derive(Debug)]
pub struct SessionMetrics {
    session_id: String,
    started_at: DateTime<Utc>,
    clock: Instant,
    frozen: Option<Duration>,
    timers: TimerRegistry,
    iterations: u64,
    successes: u64,
    response_times: Vec<u64>,
    custom_metrics: BTreeMap<String, f64>,
    sampler: Mutex<ResourceSampler>,
}

impl SessionMetrics {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            started_at: Utc::now(),
            clock: Instant::now(),
            frozen: None,
            timers: TimerRegistry::new(),
            iterations: 0,
            successes: 0,
            response_times: Vec::new(),
            custom_metrics: BTreeMap::new(),
            sampler: Mutex::new(ResourceSampler::new()),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn start_timer(&mut self, name: &str, metadata: Option<serde_json::Value>) {
        self.timers.start(name, metadata);
    }

    /// Milliseconds since `start_timer(name)`; 0 for an unknown timer.
    pub fn end_timer(&mut self, name: &str) -> u64 {
        self.timers.end(name)
    }

    pub fn timers(&self) -> &TimerRegistry {
        &self.timers
    }

    /// Record a custom metric; the last value per name wins.
    pub fn record_metric(&mut self, name: &str, value: f64) {
        self.custom_metrics.insert(name.to_string(), value);
    }

    pub fn record_iteration(&mut self, success: bool, response_time_ms: Option<u64>) {
        self.iterations += 1;
        if success {
            self.successes += 1;
        }
        if let Some(ms) = response_time_ms {
            self.response_times.push(ms);
        }
    }

    pub fn iteration_count(&self) -> u64 {
        self.iterations
    }

    fn elapsed(&self) -> Duration {
        self.frozen.unwrap_or_else(|| self.clock.elapsed())
    }

    /// Aggregate the current counters. Counters are left untouched.
    pub fn snapshot(&self) -> PerformanceSnapshot {
        let execution_time_ms = self.elapsed().as_millis() as u64;
        let resource_usage = self
            .sampler
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .sample();
        PerformanceSnapshot {
            session_id: self.session_id.clone(),
            timestamp: Utc::now(),
            execution_time_ms,
            iteration_count: self.iterations,
            iterations_per_second: snapshot::iterations_per_second(
                self.iterations,
                execution_time_ms,
            ),
            average_response_time_ms: snapshot::average(&self.response_times),
            success_rate: snapshot::success_rate(self.successes, self.iterations),
            resource_usage,
            timing_breakdown: self
                .timers
                .breakdown()
                .map(|(name, ms)| (name.to_string(), ms))
                .collect(),
            custom_metrics: self.custom_metrics.clone(),
        }
    }

    /// Freeze the end time, take a final snapshot and append it to `history`.
    pub fn complete(&mut self, history: &mut SnapshotHistory) -> PerformanceSnapshot {
        if self.frozen.is_none() {
            self.frozen = Some(self.clock.elapsed());
        }
        let snapshot = self.snapshot();
        history.push(snapshot.clone());
        tracing::info!(
            session = %self.session_id,
            iterations = self.iterations,
            execution_time_ms = snapshot.execution_time_ms,
            "session metrics completed"
        );
        snapshot
    }
}

/// Owns live session metrics keyed by session id and the completed history.
#[derive(Debug, Default)]
pub struct MetricsHub {
    sessions: HashMap<String, SessionMetrics>,
    history: SnapshotHistory,
}

impl MetricsHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history(history: SnapshotHistory) -> Self {
        Self {
            sessions: HashMap::new(),
            history,
        }
    }

    /// Start tracking `id`. An existing live session with the same id is
    /// replaced.
    pub fn start_session(&mut self, id: &str) -> &mut SessionMetrics {
        let metrics = SessionMetrics::new(id);
        match self.sessions.entry(id.to_string()) {
            Entry::Occupied(mut entry) => {
                tracing::debug!(session = id, "replacing live session metrics");
                entry.insert(metrics);
                entry.into_mut()
            }
            Entry::Vacant(entry) => entry.insert(metrics),
        }
    }

    pub fn session(&self, id: &str) -> Option<&SessionMetrics> {
        self.sessions.get(id)
    }

    pub fn session_mut(&mut self, id: &str) -> Option<&mut SessionMetrics> {
        self.sessions.get_mut(id)
    }

    /// Remove the session, freeze it and append its snapshot to the history.
    pub fn complete_session(&mut self, id: &str) -> Option<PerformanceSnapshot> {
        let mut session = self.sessions.remove(id)?;
        Some(session.complete(&mut self.history))
    }

    pub fn history(&self) -> &SnapshotHistory {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut SnapshotHistory {
        &mut self.history
    }

    pub fn into_history(self) -> SnapshotHistory {
        self.history
    }
}
