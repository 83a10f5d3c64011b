use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use relay::config::RelayConfig;
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "relay")]
#[command(version, about = "Drive AI agent sessions while feeding them live operator feedback")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the agent for a number of iterations, accepting feedback on stdin
    Run(RunArgs),
    /// Collect feedback blocks from stdin and submit them in order
    Feedback {
        /// Submit command; each block is written to its stdin
        #[arg(long)]
        command: Option<String>,
        /// Argument for the submit command (repeatable)
        #[arg(long = "arg", allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Inspect recorded performance snapshots
    Metrics {
        #[command(subcommand)]
        command: MetricsCommands,
    },
    /// View or initialize configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    /// Number of iterations (defaults to agent.max_iterations)
    #[arg(short, long)]
    pub iterations: Option<u32>,

    /// Prompt text sent to the agent on every iteration
    #[arg(long, conflicts_with = "prompt_file")]
    pub prompt: Option<String>,

    /// File holding the prompt
    #[arg(long)]
    pub prompt_file: Option<PathBuf>,

    /// Do not read feedback from stdin
    #[arg(long)]
    pub no_feedback: bool,
}

#[derive(Subcommand, Clone)]
pub enum MetricsCommands {
    /// Summarize recent sessions
    Report {
        /// Number of most recent snapshots to include
        #[arg(long)]
        last: Option<usize>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
        /// Compare the oldest and newest snapshot in the window
        #[arg(long)]
        compare: bool,
    },
    /// Delete the snapshot history
    Clear,
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Write a default relay.toml
    Init,
    /// Print the config file location
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };
    let config = RelayConfig::new(project_dir, cli.verbose)?;
    let log_dir = config.toml.logging.file.then(|| config.log_dir());
    let _log_guard = relay::logging::init(cli.verbose, log_dir.as_deref(), config.toml.logging.json)?;

    match &cli.command {
        Commands::Run(args) => cmd::cmd_run(&config, args.clone()).await?,
        Commands::Feedback { command, args } => {
            cmd::cmd_feedback(&config, command.clone(), args.clone()).await?
        }
        Commands::Metrics { command } => cmd::cmd_metrics(&config, command.clone())?,
        Commands::Config { command } => cmd::cmd_config(&config, command.clone())?,
    }

    Ok(())
}
