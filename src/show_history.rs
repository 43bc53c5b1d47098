//! history command: print the persisted failure history
//!
//! LLM-optimized output - JSON compact only.

use anyhow::{bail, Result};
use clap::Args;
use deadlinks::{HistoryStore, MonitorConfig};
use std::path::PathBuf;

#[derive(Args)]
pub struct HistoryArgs {
    /// Show a single URL
    #[arg(long)]
    url: Option<String>,

    /// Configuration file (default: ./deadlinks.yaml if present)
    #[arg(short, long, env = "DEADLINKS_CONFIG")]
    config: Option<PathBuf>,

    /// History file (overrides the configuration)
    #[arg(long, env = "DEADLINKS_HISTORY")]
    history: Option<PathBuf>,
}

pub async fn run_history(args: HistoryArgs) -> Result<()> {
    let config = MonitorConfig::discover(args.config.as_deref())?;
    let path = args.history.unwrap_or(config.history_file.clone());
    let store = HistoryStore::load(&path, config.history_policy()).await;

    match &args.url {
        Some(url) => match store.get(url).await {
            Some(record) => println!("{}", serde_json::to_string(&record)?),
            None => bail!("Not tracked: {}", url),
        },
        None => println!("{}", serde_json::to_string(&store.snapshot().await)?),
    }

    Ok(())
}
