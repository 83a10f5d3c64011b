//! Named operation timers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;

/// One named timing, open until ended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationTimer {
    pub name: String,
    pub start: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    #[serde(skip, default = "Instant::now")]
    started: Instant,
}

impl OperationTimer {
    pub fn start(name: impl Into<String>, metadata: Option<serde_json::Value>) -> Self {
        Self {
            name: name.into(),
            start: Utc::now(),
            end: None,
            duration_ms: None,
            metadata,
            started: Instant::now(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.end.is_none()
    }

    /// Freeze the timer and return its duration. Ending twice keeps the
    /// first measurement.
    pub fn finish(&mut self) -> u64 {
        if let Some(ms) = self.duration_ms {
            return ms;
        }
        let ms = self.started.elapsed().as_millis() as u64;
        self.end = Some(Utc::now());
        self.duration_ms = Some(ms);
        ms
    }
}

/// String-keyed timer map.
#[derive(Debug, Clone, Default)]
pub struct TimerRegistry {
    timers: HashMap<String, OperationTimer>,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `name`. An unfinished timer of the same name is replaced.
    pub fn start(&mut self, name: &str, metadata: Option<serde_json::Value>) {
        if let Some(previous) = self.timers.get(name)
            && previous.is_running()
        {
            tracing::debug!(timer = name, "restarting unfinished timer");
        }
        self.timers
            .insert(name.to_string(), OperationTimer::start(name, metadata));
    }

    /// End `name` and return its duration in milliseconds; 0 when unknown.
    pub fn end(&mut self, name: &str) -> u64 {
        match self.timers.get_mut(name) {
            Some(timer) => timer.finish(),
            None => {
                tracing::warn!(timer = name, "end_timer called for a timer that was never started");
                0
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&OperationTimer> {
        self.timers.get(name)
    }

    /// Durations of all finished timers.
    pub fn breakdown(&self) -> impl Iterator<Item = (&str, u64)> {
        self.timers
            .values()
            .filter_map(|t| t.duration_ms.map(|ms| (t.name.as_str(), ms)))
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}
