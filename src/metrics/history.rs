//! Bounded snapshot history with JSON persistence.

use super::snapshot::PerformanceSnapshot;
use crate::errors::MetricsError;
use std::collections::VecDeque;
use std::path::Path;

pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Completed snapshots, oldest first. Never holds more than `capacity`.
#[derive(Debug, Clone)]
pub struct SnapshotHistory {
    snapshots: VecDeque<PerformanceSnapshot>,
    capacity: usize,
}

impl Default for SnapshotHistory {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }
}

impl SnapshotHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            snapshots: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append, evicting the oldest snapshot when full.
    pub fn push(&mut self, snapshot: PerformanceSnapshot) -> Option<PerformanceSnapshot> {
        let evicted = if self.snapshots.len() >= self.capacity {
            self.snapshots.pop_front()
        } else {
            None
        };
        self.snapshots.push_back(snapshot);
        evicted
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<&PerformanceSnapshot> {
        self.snapshots.back()
    }

    /// The most recent `n` snapshots, oldest first.
    pub fn last(&self, n: usize) -> Vec<&PerformanceSnapshot> {
        let skip = self.snapshots.len().saturating_sub(n);
        self.snapshots.iter().skip(skip).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PerformanceSnapshot> {
        self.snapshots.iter()
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
    }

    /// Load from `path`. A missing file is an empty history; a file longer
    /// than `capacity` keeps its newest entries.
    pub fn load(path: &Path, capacity: usize) -> Result<Self, MetricsError> {
        let mut history = Self::with_capacity(capacity);
        if !path.exists() {
            return Ok(history);
        }
        let content = std::fs::read_to_string(path).map_err(|source| MetricsError::HistoryRead {
            path: path.to_path_buf(),
            source,
        })?;
        if content.trim().is_empty() {
            return Ok(history);
        }
        let snapshots: Vec<PerformanceSnapshot> =
            serde_json::from_str(&content).map_err(|source| MetricsError::HistoryParse {
                path: path.to_path_buf(),
                source,
            })?;
        for snapshot in snapshots {
            history.push(snapshot);
        }
        Ok(history)
    }

    /// Write as a pretty JSON array, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), MetricsError> {
        let write_err = |source| MetricsError::HistoryWrite {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        let json = serde_json::to_string_pretty(&self.snapshots).map_err(MetricsError::Serialize)?;
        std::fs::write(path, json).map_err(write_err)
    }
}
