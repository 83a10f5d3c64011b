//! CLI command implementations.
//!
//! | Module     | Commands handled |
//! |------------|------------------|
//! | `run`      | `Run`            |
//! | `feedback` | `Feedback`       |
//! | `metrics`  | `Metrics`        |
//! | `config`   | `Config`         |

pub mod config;
pub mod feedback;
pub mod metrics;
pub mod run;

pub use config::cmd_config;
pub use feedback::cmd_feedback;
pub use metrics::cmd_metrics;
pub use run::cmd_run;

use console::style;
use relay::config::RelayConfig;
use relay::feedback::{FeedbackSummary, FileAppendHandler, SubmitTarget, SubprocessCommand};
use relay::ui::icons::{CHECK, CROSS};

/// Submit target for this invocation: an explicit command, the configured
/// command, or appending to the feedback file.
pub(crate) fn feedback_target(
    config: &RelayConfig,
    command: Option<String>,
    args: Vec<String>,
) -> SubmitTarget {
    if let Some(command) = command {
        return SubmitTarget::Subprocess(
            SubprocessCommand::new(command)
                .with_args(args)
                .with_working_dir(&config.project_dir),
        );
    }
    match config.feedback_command() {
        Some(cmd) => SubmitTarget::Subprocess(cmd),
        None => SubmitTarget::custom(FileAppendHandler::new(config.feedback_file())),
    }
}

pub(crate) fn print_feedback_summary(summary: &FeedbackSummary) {
    if summary.outcomes.is_empty() {
        return;
    }
    let failed = summary.failed();
    let icon = if failed == 0 { CHECK } else { CROSS };
    println!(
        "{}Feedback: {} submitted, {} failed",
        icon,
        style(summary.succeeded()).green(),
        if failed == 0 {
            style(failed).dim()
        } else {
            style(failed).red()
        }
    );
}
