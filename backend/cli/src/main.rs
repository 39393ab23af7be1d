mod config;
mod run_cmd;
mod status_cmd;

use anyhow::Result;
use clap::{Parser, Subcommand};

use config::Config;

#[derive(Parser)]
#[command(name = "lastseen")]
#[command(about = "Tracks when Discord members were last active")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to Discord and start tracking activity
    Run,
    /// Show the persisted sync state of a guild without connecting
    Status {
        /// Guild (server) id
        #[arg(long)]
        guild: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Commands::Run => {
            std::fs::create_dir_all(&config.working_dir)?;
            lastseen_logging::init_logger(&config.log_dir, &config.log_level)?;
            tracing::debug!(?config, "Configuration loaded");
            run_cmd::run(config).await?;
        }
        Commands::Status { guild } => {
            status_cmd::run(&config, guild).await?;
        }
    }

    Ok(())
}
