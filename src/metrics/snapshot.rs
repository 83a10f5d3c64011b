//! Point-in-time performance snapshots.

use super::resources::ResourceUsage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Aggregated metrics of one session at a moment in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSnapshot {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub execution_time_ms: u64,
    pub iteration_count: u64,
    pub iterations_per_second: f64,
    pub average_response_time_ms: f64,
    /// Percentage, 0-100.
    pub success_rate: f64,
    pub resource_usage: ResourceUsage,
    #[serde(default)]
    pub timing_breakdown: BTreeMap<String, u64>,
    #[serde(default)]
    pub custom_metrics: BTreeMap<String, f64>,
}

/// Iterations per second; 0 when nothing ran or no time elapsed.
pub fn iterations_per_second(iterations: u64, elapsed_ms: u64) -> f64 {
    if iterations == 0 || elapsed_ms == 0 {
        return 0.0;
    }
    iterations as f64 / (elapsed_ms as f64 / 1000.0)
}

/// Success percentage; 100 when nothing ran.
pub fn success_rate(successes: u64, iterations: u64) -> f64 {
    if iterations == 0 {
        return 100.0;
    }
    successes as f64 / iterations as f64 * 100.0
}

/// Mean of the samples; 0 when there are none.
pub fn average(samples: &[u64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().sum::<u64>() as f64 / samples.len() as f64
}
