//! Agent session with live feedback (`relay run`).

use anyhow::{Context, Result};
use console::style;
use relay::config::RelayConfig;
use relay::feedback::{
    FeedbackMode, FeedbackSession, SubprocessCommand, prompt_redisplay, spawn_stdin_reader,
};
use relay::metrics::{MetricsHub, SnapshotHistory};
use relay::session::{IterationOutcome, SessionRunner, load_prompt};
use relay::ui::icons::{CLOCK, FEEDBACK, INBOX, SPARKLE, WARN};
use relay::ui::output::StdoutSink;
use relay::ui::{Channels, SessionUI};
use std::sync::Arc;
use tokio::sync::oneshot;

use super::super::RunArgs;

pub async fn cmd_run(config: &RelayConfig, args: RunArgs) -> Result<()> {
    let problems = config.validate();
    if !problems.is_empty() {
        anyhow::bail!("Invalid configuration:\n  {}", problems.join("\n  "));
    }

    let prompt = load_prompt(args.prompt, args.prompt_file.as_deref())?
        .context("A prompt is required: pass --prompt or --prompt-file")?;
    let iterations = args
        .iterations
        .unwrap_or(config.toml.agent.max_iterations)
        .max(1);

    let ui = Arc::new(SessionUI::new(iterations, config.verbose));
    let channels = Channels::new(Arc::new(StdoutSink), ui.clone());
    let mode = Arc::new(FeedbackMode::with_capacity(
        channels.clone(),
        config.toml.feedback.buffer_capacity,
    ));

    let agent = SubprocessCommand::new(config.agent_command())
        .with_args(config.agent_args().iter().cloned())
        .with_working_dir(&config.project_dir);
    let runner = SessionRunner::new(agent.clone(), iterations, mode.clone(), channels.clone())
        .with_ui(ui.clone());

    let history_path = config.history_file();
    let history = SnapshotHistory::load(&history_path, config.toml.metrics.history_capacity)?;
    let mut hub = MetricsHub::with_history(history);
    let session_id = uuid::Uuid::new_v4().to_string();
    hub.start_session(&session_id);

    println!();
    println!(
        "{}{} {} {}",
        SPARKLE,
        style("relay session").bold(),
        style(&session_id[..8]).dim(),
        style(format!("({} × {})", agent.display(), iterations)).dim()
    );

    let metrics = hub
        .session_mut(&session_id)
        .context("Session metrics missing after start")?;

    let (result, feedback_summary) = if args.no_feedback {
        (runner.run(&prompt, metrics).await, None)
    } else {
        let target = super::feedback_target(config, None, Vec::new());
        println!(
            "{}Type feedback at any time; a blank line sends it to {}",
            INBOX,
            style(target.describe()).cyan()
        );
        let prompt_line = style(format!("{}feedback> ", FEEDBACK)).dim().to_string();
        mode.set_redisplay_callback(Some(prompt_redisplay(&channels, prompt_line)));

        let verbose = config.verbose || config.toml.feedback.verbose;
        let mut feedback = FeedbackSession::start(target, channels.clone(), mode.clone(), verbose);
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let run = {
            let runner = &runner;
            let prompt = &prompt;
            async move {
                let result = runner.run(prompt, metrics).await;
                let _ = stop_tx.send(());
                result
            }
        };
        let stop = async {
            let _ = stop_rx.await;
        };
        let (result, pumped) = tokio::join!(
            run,
            feedback.pump_channel(spawn_stdin_reader(), stop)
        );
        if let Err(err) = pumped {
            tracing::warn!(error = %err, "feedback input ended early");
        }

        (result, Some(feedback.finish().await?))
    };
    ui.finish();
    if let Some(summary) = &feedback_summary {
        super::print_feedback_summary(summary);
    }
    let outcomes = result?;

    let snapshot = hub
        .complete_session(&session_id)
        .context("Session metrics missing at completion")?;
    hub.history().save(&history_path)?;

    print_session_summary(&outcomes);
    println!(
        "{}{:.1}s total, {:.2} iterations/sec, {:.0}% success",
        CLOCK,
        snapshot.execution_time_ms as f64 / 1000.0,
        snapshot.iterations_per_second,
        snapshot.success_rate
    );

    if outcomes.iter().all(|o| !o.success) {
        anyhow::bail!("All {} iterations failed", outcomes.len());
    }
    Ok(())
}

fn print_session_summary(outcomes: &[IterationOutcome]) {
    println!();
    let succeeded = outcomes.iter().filter(|o| o.success).count();
    println!(
        "Iterations: {}/{} succeeded",
        style(succeeded).green(),
        outcomes.len()
    );
    for outcome in outcomes.iter().filter(|o| !o.success) {
        println!(
            "  {}Iteration {}: {}",
            WARN,
            outcome.iteration,
            outcome.summary.as_deref().unwrap_or("no output")
        );
    }
}
