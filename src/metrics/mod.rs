//! Session timing and performance metrics.
//!
//! | Module      | Role                                              |
//! |-------------|---------------------------------------------------|
//! | `timer`     | Named start/stop timers                           |
//! | `registry`  | `SessionMetrics` and the `MetricsHub` owning them |
//! | `snapshot`  | `PerformanceSnapshot` and the derived rates       |
//! | `history`   | Bounded snapshot history, JSON persistence        |
//! | `report`    | Averages, comparisons and recommendations         |
//! | `resources` | Process memory/CPU sampling                       |

pub mod history;
pub mod registry;
pub mod report;
pub mod resources;
pub mod snapshot;
pub mod timer;

pub use history::{DEFAULT_HISTORY_CAPACITY, SnapshotHistory};
pub use registry::{MetricsHub, SessionMetrics};
pub use report::{DEFAULT_REPORT_WINDOW, MetricsReport, ReportSummary, SnapshotComparison};
pub use resources::{ResourceSampler, ResourceUsage};
pub use snapshot::PerformanceSnapshot;
pub use timer::{OperationTimer, TimerRegistry};
