//! workflowd CLI
//!
//! `workflowd start` detaches a daemon that polls the workflow service;
//! `workflowd stop` asks it to shut down.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use workflowd::daemon;
use workflowd::PollConfig;

#[derive(Parser)]
#[command(name = "workflowd")]
#[command(about = "Poll a workflow service for waiting tasks in the background")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML configuration file (WORKFLOWD_* variables override its values)
    #[arg(short, long, global = true, env = "WORKFLOWD_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon in the background
    Start,

    /// Stop the running daemon
    Stop,

    /// Run the poll loop in the foreground (used by `start` and service managers)
    #[command(hide = true)]
    Run,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = PollConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Start => {
            daemon::log::init_cli_logging();
            let cwd = std::env::current_dir().context("cannot determine working directory")?;
            let config = config.absolutize(&cwd);
            daemon::start(&config).await?;
        }

        Commands::Stop => {
            daemon::log::init_cli_logging();
            let pid = daemon::stop(&config.pid_file_path)?;
            println!("workflowd stopped (sent SIGTERM to pid {})", pid);
        }

        Commands::Run => {
            daemon::run(config, true).await?;
        }
    }

    Ok(())
}
