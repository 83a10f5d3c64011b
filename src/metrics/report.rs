//! Aggregate reports over the snapshot history.
//!
//! [`MetricsReport::build`] averages the last N snapshots, optionally compares
//! the oldest and newest snapshot in that window, and derives
//! recommendations from fixed thresholds.

use super::history::SnapshotHistory;
use super::snapshot::PerformanceSnapshot;
use crate::stream::truncate_str;
use crate::ui::icons::{BULB, CLOCK, PROGRESS};
use chrono::{DateTime, Utc};
use console::style;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

pub const DEFAULT_REPORT_WINDOW: usize = 10;
const RECOMMENDATION_WIDTH: usize = 76;
const SESSION_COLUMN_WIDTH: usize = 24;

const MIN_SUCCESS_RATE: f64 = 90.0;
const MAX_RESPONSE_TIME_MS: f64 = 5000.0;
const MAX_MEMORY_MB: f64 = 500.0;
const MIN_ITERATIONS_PER_SECOND: f64 = 0.5;

/// Averages across the report window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub snapshot_count: usize,
    pub total_iterations: u64,
    pub avg_execution_time_ms: f64,
    pub avg_iterations_per_second: f64,
    pub avg_response_time_ms: f64,
    pub avg_success_rate: f64,
    pub avg_memory_mb: f64,
}

impl ReportSummary {
    pub fn from_snapshots(snapshots: &[&PerformanceSnapshot]) -> Self {
        if snapshots.is_empty() {
            return Self::default();
        }
        let n = snapshots.len() as f64;
        let mean = |f: fn(&PerformanceSnapshot) -> f64| -> f64 {
            snapshots.iter().map(|s| f(s)).sum::<f64>() / n
        };
        Self {
            snapshot_count: snapshots.len(),
            total_iterations: snapshots.iter().map(|s| s.iteration_count).sum(),
            avg_execution_time_ms: mean(|s| s.execution_time_ms as f64),
            avg_iterations_per_second: mean(|s| s.iterations_per_second),
            avg_response_time_ms: mean(|s| s.average_response_time_ms),
            avg_success_rate: mean(|s| s.success_rate),
            avg_memory_mb: mean(|s| s.resource_usage.memory_mb),
        }
    }
}

/// Percentage change from `before` to `after` per metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotComparison {
    pub before_session: String,
    pub after_session: String,
    pub execution_time_change_pct: f64,
    pub success_rate_change_pct: f64,
    pub response_time_change_pct: f64,
    pub memory_change_pct: f64,
}

impl SnapshotComparison {
    pub fn between(before: &PerformanceSnapshot, after: &PerformanceSnapshot) -> Self {
        Self {
            before_session: before.session_id.clone(),
            after_session: after.session_id.clone(),
            execution_time_change_pct: percent_change(
                before.execution_time_ms as f64,
                after.execution_time_ms as f64,
            ),
            success_rate_change_pct: percent_change(before.success_rate, after.success_rate),
            response_time_change_pct: percent_change(
                before.average_response_time_ms,
                after.average_response_time_ms,
            ),
            memory_change_pct: percent_change(
                before.resource_usage.memory_mb,
                after.resource_usage.memory_mb,
            ),
        }
    }
}

/// `(after - before) / before * 100`; 0 when `before` is 0.
pub fn percent_change(before: f64, after: f64) -> f64 {
    if before == 0.0 {
        return 0.0;
    }
    (after - before) / before * 100.0
}

/// Threshold-based advice for a summary.
pub fn recommendations(summary: &ReportSummary) -> Vec<String> {
    let mut out = Vec::new();
    if summary.snapshot_count == 0 {
        return out;
    }
    if summary.avg_success_rate < MIN_SUCCESS_RATE {
        out.push(format!(
            "Success rate is {:.1}% (below {:.0}%): review failing iterations and agent prompts",
            summary.avg_success_rate, MIN_SUCCESS_RATE
        ));
    }
    if summary.avg_response_time_ms > MAX_RESPONSE_TIME_MS {
        out.push(format!(
            "Average response time is {:.0}ms (above {:.0}ms): consider smaller prompts or fewer tools per iteration",
            summary.avg_response_time_ms, MAX_RESPONSE_TIME_MS
        ));
    }
    if summary.avg_memory_mb > MAX_MEMORY_MB {
        out.push(format!(
            "Memory usage is {:.0}MB (above {:.0}MB): check for unbounded buffers or long-lived sessions",
            summary.avg_memory_mb, MAX_MEMORY_MB
        ));
    }
    if summary.total_iterations > 0 && summary.avg_iterations_per_second < MIN_ITERATIONS_PER_SECOND
    {
        out.push(format!(
            "Throughput is {:.2} iterations/sec (below {}): iterations are spending most time waiting",
            summary.avg_iterations_per_second, MIN_ITERATIONS_PER_SECOND
        ));
    }
    out
}

/// A rendered view of recent history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsReport {
    pub generated_at: DateTime<Utc>,
    pub window: usize,
    pub summary: ReportSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comparison: Option<SnapshotComparison>,
    pub recommendations: Vec<String>,
    pub snapshots: Vec<PerformanceSnapshot>,
}

impl MetricsReport {
    /// Report over the last `window` snapshots. `compare` adds an
    /// oldest-vs-newest comparison when the window holds two or more.
    pub fn build(history: &SnapshotHistory, window: usize, compare: bool) -> Self {
        let recent = history.last(window);
        let summary = ReportSummary::from_snapshots(&recent);
        let comparison = match (compare, recent.first(), recent.last()) {
            (true, Some(before), Some(after)) if recent.len() >= 2 => {
                Some(SnapshotComparison::between(before, after))
            }
            _ => None,
        };
        Self {
            generated_at: Utc::now(),
            window,
            recommendations: recommendations(&summary),
            summary,
            comparison,
            snapshots: recent.into_iter().cloned().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.summary.snapshot_count == 0
    }

    pub fn to_json(&self) -> Result<String, crate::errors::MetricsError> {
        serde_json::to_string_pretty(self).map_err(crate::errors::MetricsError::Serialize)
    }

    /// Styled text for the terminal.
    pub fn render(&self) -> String {
        let mut out = String::new();
        if self.is_empty() {
            out.push_str("No metrics recorded yet.\n");
            return out;
        }

        let s = &self.summary;
        let _ = writeln!(
            out,
            "{}{} (last {} of window {})",
            PROGRESS,
            style("Performance report").bold(),
            s.snapshot_count,
            self.window
        );
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "{:<24} {:<12} {:<10} {:<12} {:<10} {:<10}",
            "Session", "Time", "Iter", "Iter/sec", "Success", "Memory"
        );
        let _ = writeln!(
            out,
            "{:<24} {:<12} {:<10} {:<12} {:<10} {:<10}",
            "------------------------", "------------", "----------", "------------",
            "----------", "----------"
        );
        for snap in &self.snapshots {
            let _ = writeln!(
                out,
                "{:<24} {:<12} {:<10} {:<12.2} {:<10} {:<10}",
                truncate_str(&snap.session_id, SESSION_COLUMN_WIDTH),
                format_ms(snap.execution_time_ms as f64),
                snap.iteration_count,
                snap.iterations_per_second,
                format!("{:.0}%", snap.success_rate),
                format!("{:.0}MB", snap.resource_usage.memory_mb),
            );
        }

        let _ = writeln!(out);
        let _ = writeln!(out, "{}{}", CLOCK, style("Averages").bold());
        let _ = writeln!(out, "  Execution time:  {}", format_ms(s.avg_execution_time_ms));
        let _ = writeln!(out, "  Response time:   {}", format_ms(s.avg_response_time_ms));
        let _ = writeln!(out, "  Iterations/sec:  {:.2}", s.avg_iterations_per_second);
        let _ = writeln!(out, "  Success rate:    {:.1}%", s.avg_success_rate);
        let _ = writeln!(out, "  Memory:          {:.1}MB", s.avg_memory_mb);
        let _ = writeln!(out, "  Iterations:      {}", s.total_iterations);

        if let Some(cmp) = &self.comparison {
            let _ = writeln!(out);
            let _ = writeln!(
                out,
                "{} {} -> {}",
                style("Comparison").bold(),
                cmp.before_session,
                cmp.after_session
            );
            let _ = writeln!(out, "  Execution time:  {}", signed_pct(cmp.execution_time_change_pct));
            let _ = writeln!(out, "  Success rate:    {}", signed_pct(cmp.success_rate_change_pct));
            let _ = writeln!(out, "  Response time:   {}", signed_pct(cmp.response_time_change_pct));
            let _ = writeln!(out, "  Memory:          {}", signed_pct(cmp.memory_change_pct));
        }

        if !self.recommendations.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "{}", style("Recommendations").bold());
            let options = textwrap::Options::new(RECOMMENDATION_WIDTH).subsequent_indent("     ");
            for rec in &self.recommendations {
                let _ = writeln!(out, "  {}{}", BULB, textwrap::fill(rec, &options));
            }
        }
        out
    }
}

fn format_ms(ms: f64) -> String {
    if ms >= 1000.0 {
        format!("{:.1}s", ms / 1000.0)
    } else {
        format!("{:.0}ms", ms)
    }
}

fn signed_pct(value: f64) -> String {
    format!("{:+.1}%", value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::history::tests::snapshot;

    fn summary_with(f: impl FnOnce(&mut ReportSummary)) -> ReportSummary {
        let mut summary = ReportSummary {
            snapshot_count: 1,
            total_iterations: 4,
            avg_execution_time_ms: 1000.0,
            avg_iterations_per_second: 4.0,
            avg_response_time_ms: 250.0,
            avg_success_rate: 100.0,
            avg_memory_mb: 50.0,
        };
        f(&mut summary);
        summary
    }

    #[test]
    fn test_healthy_summary_has_no_recommendations() {
        assert!(recommendations(&summary_with(|_| {})).is_empty());
    }

    #[test]
    fn test_each_threshold_triggers() {
        let low_success = recommendations(&summary_with(|s| s.avg_success_rate = 89.9));
        assert_eq!(low_success.len(), 1);
        assert!(low_success[0].contains("Success rate"));

        let slow = recommendations(&summary_with(|s| s.avg_response_time_ms = 5001.0));
        assert!(slow[0].contains("response time"));

        let heavy = recommendations(&summary_with(|s| s.avg_memory_mb = 512.0));
        assert!(heavy[0].contains("Memory"));

        let sluggish = recommendations(&summary_with(|s| s.avg_iterations_per_second = 0.2));
        assert!(sluggish[0].contains("Throughput"));
    }

    #[test]
    fn test_thresholds_are_strict() {
        let edge = summary_with(|s| {
            s.avg_success_rate = 90.0;
            s.avg_response_time_ms = 5000.0;
            s.avg_memory_mb = 500.0;
            s.avg_iterations_per_second = 0.5;
        });
        assert!(recommendations(&edge).is_empty());
    }

    #[test]
    fn test_throughput_ignored_without_iterations() {
        let idle = summary_with(|s| {
            s.total_iterations = 0;
            s.avg_iterations_per_second = 0.0;
        });
        assert!(recommendations(&idle).is_empty());
    }

    #[test]
    fn test_percent_change() {
        assert_eq!(percent_change(0.0, 50.0), 0.0);
        assert_eq!(percent_change(200.0, 100.0), -50.0);
        assert_eq!(percent_change(100.0, 150.0), 50.0);
    }

    #[test]
    fn test_build_uses_last_window() {
        let mut history = SnapshotHistory::new();
        for i in 0..15 {
            let mut snap = snapshot(&format!("s{}", i));
            snap.execution_time_ms = i * 100;
            history.push(snap);
        }
        let report = MetricsReport::build(&history, DEFAULT_REPORT_WINDOW, false);
        assert_eq!(report.summary.snapshot_count, 10);
        assert_eq!(report.snapshots[0].session_id, "s5");
        // Mean of 500..=1400 in steps of 100.
        assert_eq!(report.summary.avg_execution_time_ms, 950.0);
        assert!(report.comparison.is_none());
    }

    #[test]
    fn test_build_with_comparison() {
        let mut history = SnapshotHistory::new();
        let mut before = snapshot("before");
        before.execution_time_ms = 2000;
        before.resource_usage.memory_mb = 0.0;
        let mut after = snapshot("after");
        after.execution_time_ms = 1000;
        after.resource_usage.memory_mb = 80.0;
        history.push(before);
        history.push(after);

        let report = MetricsReport::build(&history, 10, true);
        let cmp = report.comparison.unwrap();
        assert_eq!(cmp.before_session, "before");
        assert_eq!(cmp.execution_time_change_pct, -50.0);
        assert_eq!(cmp.memory_change_pct, 0.0);
    }

    #[test]
    fn test_comparison_needs_two_snapshots() {
        let mut history = SnapshotHistory::new();
        history.push(snapshot("only"));
        assert!(MetricsReport::build(&history, 10, true).comparison.is_none());
    }

    #[test]
    fn test_render_empty_and_populated() {
        let empty = MetricsReport::build(&SnapshotHistory::new(), 10, false);
        assert!(empty.render().contains("No metrics recorded yet."));

        let mut history = SnapshotHistory::new();
        let mut slow = snapshot("slow-session");
        slow.average_response_time_ms = 9000.0;
        history.push(slow);
        let text = console::strip_ansi_codes(&MetricsReport::build(&history, 10, false).render())
            .to_string();
        assert!(text.contains("slow-session"));
        assert!(text.contains("Recommendations"));
        assert!(text.contains("9.0s"));
    }

    #[test]
    fn test_render_shortens_long_session_ids() {
        let mut history = SnapshotHistory::new();
        history.push(snapshot("0f3c9a2e-5b7d-4e61-9a8f-2c4d6e8f0a1b"));
        let text = console::strip_ansi_codes(&MetricsReport::build(&history, 10, false).render())
            .to_string();
        assert!(text.contains("0f3c9a2e-5b7d-4e61-9a..."));
        assert!(!text.contains("2c4d6e8f0a1b"));
    }

    #[test]
    fn test_json_has_summary_and_recommendations() {
        let mut history = SnapshotHistory::new();
        history.push(snapshot("s"));
        let json = MetricsReport::build(&history, 10, false).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["summary"]["snapshot_count"], 1);
        assert!(value["recommendations"].is_array());
        assert!(value.get("comparison").is_none());
    }
}
