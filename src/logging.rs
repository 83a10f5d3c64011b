//! Tracing subscriber setup.
//!
//! Diagnostics go to stderr, filtered by `RELAY_LOG` (falls back to `warn`,
//! or `debug` with `--verbose`). With `[logging] file = true` a daily-rolling
//! log is also written under `.relay/logs/`, as JSON lines when
//! `[logging] json = true`.

use anyhow::{Context, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

pub const LOG_ENV: &str = "RELAY_LOG";
const LOG_FILE_PREFIX: &str = "relay.log";

/// Filter from `RELAY_LOG`, or the verbosity default.
pub fn env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("relay=debug,warn")
        } else {
            EnvFilter::new("warn")
        }
    })
}

/// Install the global subscriber.
///
/// Returns the file writer guard when file logging is on; keep it alive
/// until exit or buffered lines are lost. A second call is a no-op.
pub fn init(verbose: bool, log_dir: Option<&Path>, json: bool) -> Result<Option<WorkerGuard>> {
    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            let layer = if json { layer.json().boxed() } else { layer.boxed() };
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let installed = tracing_subscriber::registry()
        .with(env_filter(verbose))
        .with(stderr_layer)
        .with(file_layer)
        .try_init();
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_init_twice_is_harmless() {
        let dir = tempdir().unwrap();
        let logs = dir.path().join("logs");
        let guard = init(false, Some(&logs), true).unwrap();
        assert!(guard.is_some());
        assert!(logs.is_dir());
        assert!(init(true, None, false).unwrap().is_none());
    }

    #[test]
    fn test_verbose_filter_enables_debug() {
        let filter = env_filter(true).to_string();
        if std::env::var(LOG_ENV).is_err() {
            assert!(filter.contains("debug"));
        }
    }
}
