//! Best-effort resource sampling for the current process.

use serde::{Deserialize, Serialize};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Memory and CPU of this process at sampling time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub memory_mb: f64,
    pub cpu_percent: f64,
}

/// Keeps a `System` around so CPU usage has a previous sample to diff
/// against. The first sample always reports 0% CPU.
#[derive(Debug)]
pub struct ResourceSampler {
    system: System,
    pid: Option<Pid>,
}

impl ResourceSampler {
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(err) => {
                tracing::debug!(error = err, "current pid unavailable; resource usage disabled");
                None
            }
        };
        Self {
            system: System::new(),
            pid,
        }
    }

    /// Sample now. Any failure yields zeros.
    pub fn sample(&mut self) -> ResourceUsage {
        let Some(pid) = self.pid else {
            return ResourceUsage::default();
        };
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing().with_memory().with_cpu(),
        );
        match self.system.process(pid) {
            Some(process) => ResourceUsage {
                memory_mb: process.memory() as f64 / BYTES_PER_MB,
                cpu_percent: f64::from(process.cpu_usage()),
            },
            None => ResourceUsage::default(),
        }
    }
}

impl Default for ResourceSampler {
    fn default() -> Self {
        Self::new()
    }
}
