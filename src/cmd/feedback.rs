//! Standalone feedback collection (`relay feedback`).

use anyhow::Result;
use console::style;
use relay::config::RelayConfig;
use relay::feedback::{FeedbackMode, FeedbackSession};
use relay::ui::icons::INBOX;
use relay::ui::Channels;
use std::sync::Arc;

pub async fn cmd_feedback(
    config: &RelayConfig,
    command: Option<String>,
    args: Vec<String>,
) -> Result<()> {
    let target = super::feedback_target(config, command, args);
    let channels = Channels::stdio();
    let mode = Arc::new(FeedbackMode::with_capacity(
        channels.clone(),
        config.toml.feedback.buffer_capacity,
    ));

    eprintln!(
        "{}Submitting to {}. {}",
        INBOX,
        style(target.describe()).cyan(),
        style("A blank line sends the block; Ctrl-D ends input.").dim()
    );

    let verbose = config.verbose || config.toml.feedback.verbose;
    let mut session = FeedbackSession::start(target, channels, mode, verbose);
    let pumped = session
        .pump(tokio::io::stdin(), std::future::pending::<()>())
        .await;
    let summary = session.finish().await?;
    pumped?;

    super::print_feedback_summary(&summary);
    if summary.failed() > 0 {
        anyhow::bail!("{} feedback submission(s) failed", summary.failed());
    }
    Ok(())
}
