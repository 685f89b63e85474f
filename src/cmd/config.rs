//! Configuration view and validation commands (`boardroom config`).

use std::path::Path;

use anyhow::{Result, bail};
use boardroom::config::{BoardroomConfig, CONFIG_FILE};

use super::super::ConfigCommands;

fn describe_source(explicit: Option<&Path>) -> String {
    match explicit {
        Some(path) => path.display().to_string(),
        None if Path::new(CONFIG_FILE).exists() => CONFIG_FILE.to_string(),
        None => format!("none ({} not found, using defaults)", CONFIG_FILE),
    }
}

pub fn cmd_config(
    config: &BoardroomConfig,
    explicit: Option<&Path>,
    command: Option<ConfigCommands>,
) -> Result<()> {
    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Boardroom Configuration");
            println!("=======================");
            println!();
            println!("Config file: {}", describe_source(explicit));
            println!("Storage backend: {}", config.resolved_backend());
            println!();
            println!("Effective values (with env overrides, secrets masked):");
            println!();
            print!("{}", config.redacted().to_toml()?);
        }
        Some(ConfigCommands::Validate) => {
            let problems = config.problems();
            if problems.is_empty() {
                println!("Configuration is valid.");
                return Ok(());
            }
            for problem in &problems {
                println!("  - {}", problem);
            }
            bail!("Configuration has {} problem(s)", problems.len());
        }
    }
    Ok(())
}
