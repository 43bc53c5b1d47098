//! deadlinks CLI
//!
//! Dead link monitoring with failure history.
//! A link is reported only after it has stayed dead past the grace period.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod check;
mod init;
mod show_history;

use check::{run_check, CheckArgs};
use init::{run_init, InitArgs};
use show_history::{run_history, HistoryArgs};

#[derive(Parser)]
#[command(name = "deadlinks")]
#[command(author = "RoyalBit Inc.")]
#[command(version)]
#[command(about = "Dead link monitor with failure history and archive lookup")]
#[command(long_about = "Checks links, remembers failures and reports links that stay dead past a grace period.\n\nCommands:\n  check     Check URLs found in documents\n  history   Show recorded failures\n  init      Create configuration templates")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check URLs found in documents, on the command line or on stdin
    Check(CheckArgs),
    /// Show recorded failures
    History(HistoryArgs),
    /// Create deadlinks.yaml and exclusions.yaml templates
    Init(InitArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // stdout carries JSON; logs go to stderr
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "deadlinks=info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Check(args) => run_check(args).await,
        Commands::History(args) => run_history(args).await,
        Commands::Init(args) => run_init(args).await,
    }
}
