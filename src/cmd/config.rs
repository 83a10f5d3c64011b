//! Configuration view and initialization (`relay config`).

use anyhow::{Context, Result};
use console::style;
use relay::config::{RelayConfig, RelayToml};
use relay::ui::icons::{CHECK, WARN};

use super::super::ConfigCommands;

pub fn cmd_config(config: &RelayConfig, command: Option<ConfigCommands>) -> Result<()> {
    let config_path = config.config_file();

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Relay Configuration");
            println!("===================");
            println!();
            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!(
                    "No relay.toml found at {} (using defaults)",
                    config_path.display()
                );
            }
            println!();

            let rendered =
                toml::to_string_pretty(&config.toml).context("Failed to render configuration")?;
            println!("{}", rendered.trim_end());
            println!();

            println!("Effective values (with env overrides):");
            println!("  agent command    = \"{}\"", config.agent_command());
            match config.feedback_command() {
                Some(cmd) => println!("  feedback command = \"{}\"", cmd.display()),
                None => println!(
                    "  feedback file    = \"{}\"",
                    config.feedback_file().display()
                ),
            }
            println!("  metrics history  = \"{}\"", config.history_file().display());
            println!();

            let problems = config.validate();
            if !problems.is_empty() {
                for problem in problems {
                    println!("{}{}", WARN, style(problem).yellow());
                }
                println!();
            }
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                anyhow::bail!("relay.toml already exists at {}", config_path.display());
            }
            RelayToml::default().save(&config_path)?;
            println!("{}Created {}", CHECK, config_path.display());
        }
        Some(ConfigCommands::Path) => {
            println!("{}", config_path.display());
        }
    }
    Ok(())
}
