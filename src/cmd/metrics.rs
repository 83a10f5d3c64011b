//! Snapshot history commands (`relay metrics`).

use anyhow::{Context, Result};
use relay::config::RelayConfig;
use relay::metrics::{MetricsReport, SnapshotHistory};
use relay::ui::icons::CHECK;

use super::super::MetricsCommands;

pub fn cmd_metrics(config: &RelayConfig, command: MetricsCommands) -> Result<()> {
    let history_path = config.history_file();
    match command {
        MetricsCommands::Report {
            last,
            json,
            compare,
        } => {
            let history =
                SnapshotHistory::load(&history_path, config.toml.metrics.history_capacity)?;
            let window = last.unwrap_or(config.toml.metrics.report_window).max(1);
            let report = MetricsReport::build(&history, window, compare);
            if json {
                println!("{}", report.to_json()?);
            } else {
                print!("{}", report.render());
            }
        }
        MetricsCommands::Clear => {
            if history_path.exists() {
                std::fs::remove_file(&history_path).with_context(|| {
                    format!("Failed to remove {}", history_path.display())
                })?;
                println!("{}Cleared metrics history", CHECK);
            } else {
                println!("No metrics history at {}", history_path.display());
            }
        }
    }
    Ok(())
}
