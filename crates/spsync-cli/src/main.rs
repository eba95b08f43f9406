//! spsync CLI - Command-line interface for spsync
//!
//! Provides commands for:
//! - Running sync jobs for one mapping, a tenant or everything configured
//! - Previewing a sync with `--dry-run`
//! - Inspecting the ledger: stats, recent jobs, failed files
//! - Clearing history and testing tenant credentials

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{
    auth::AuthCommand, clear_history::ClearHistoryCommand, failed::FailedCommand,
    jobs::JobsCommand, status::StatusCommand, sync::SyncCommand, AppContext,
};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(
    name = "spsync",
    version,
    about = "Incremental file sync into SharePoint document libraries"
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Upload new and changed files
    Sync(SyncCommand),
    /// Show ledger statistics for a tenant
    Status(StatusCommand),
    /// List recent sync jobs
    Jobs(JobsCommand),
    /// List files whose last upload failed
    Failed(FailedCommand),
    /// Forget synced files and jobs of a tenant or mapping
    ClearHistory(ClearHistoryCommand),
    /// Credential commands
    #[command(subcommand)]
    Auth(AuthCommand),
}

fn init_tracing(cli: &Cli, context: &AppContext) {
    let logging = &context.config().logging;
    let level = match cli.verbose {
        0 => logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let context = AppContext::load(cli.config.clone())?;
    init_tracing(&cli, &context);
    tracing::debug!(config = %context.config_path().display(), "Loaded configuration");

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };

    match &cli.command {
        Commands::Sync(cmd) => cmd.execute(&context, format).await,
        Commands::Status(cmd) => cmd.execute(&context, format).await,
        Commands::Jobs(cmd) => cmd.execute(&context, format).await,
        Commands::Failed(cmd) => cmd.execute(&context, format).await,
        Commands::ClearHistory(cmd) => cmd.execute(&context, format).await,
        Commands::Auth(cmd) => cmd.execute(&context, format).await,
    }
}
