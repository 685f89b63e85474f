use anyhow::{Context, Result};
use boardroom::config::BoardroomConfig;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "boardroom")]
#[command(version, about = "A personal advisory board of AI personas")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to a config file. Defaults to ./boardroom.toml when present.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the REST server
    Serve {
        /// Port to serve on (overrides PORT and the config file)
        #[arg(short, long)]
        port: Option<u16>,

        /// Address to bind
        #[arg(long)]
        host: Option<String>,

        /// Enable dev mode (CORS permissive for a local frontend dev server)
        #[arg(long)]
        dev: bool,
    },
    /// Create the local SQLite schema
    InitDb {
        /// Database path (defaults to storage.db_path)
        #[arg(long)]
        db_path: Option<PathBuf>,
    },
    /// Manage the local picture catalogue
    Pictures {
        #[command(subcommand)]
        command: PicturesCommands,
    },
    /// Put a question to your board from the terminal
    Ask {
        /// Board owner
        #[arg(short, long)]
        user: String,

        /// Ask a single member instead of the whole board
        #[arg(short, long)]
        member: Option<String>,

        /// The question
        input: String,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum PicturesCommands {
    /// Add a picture URL members can use as their portrait
    Add { url: String },
    /// List every picture
    List,
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the effective configuration with secrets masked
    Show,
    /// Report every setting that would stop the server from working
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is normal outside development.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config =
        BoardroomConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let _log_guard = boardroom::logging::init(&config.logging, cli.verbose)?;

    match &cli.command {
        Commands::Serve { port, host, dev } => {
            cmd::cmd_serve(config, *port, host.clone(), *dev).await?;
        }
        Commands::InitDb { db_path } => cmd::cmd_init_db(&config, db_path.as_deref())?,
        Commands::Pictures { command } => cmd::cmd_pictures(&config, command.clone()).await?,
        Commands::Ask {
            user,
            member,
            input,
        } => {
            cmd::cmd_ask(&config, user, member.as_deref(), input).await?;
        }
        Commands::Config { command } => {
            cmd::cmd_config(&config, cli.config.as_deref(), command.clone())?
        }
    }

    Ok(())
}
