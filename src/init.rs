//! init command: Create deadlinks.yaml and exclusions.yaml templates

use anyhow::{bail, Result};
use chrono::Utc;
use clap::Args;
use deadlinks::config::DEFAULT_CONFIG_FILE;
use deadlinks::MonitorConfig;
use serde::Serialize;
use std::path::PathBuf;

const EXCLUSIONS_TEMPLATE: &str = "\
# Exclusion rules, first match wins.
#   host:<host>     host or any subdomain
#   path:<prefix>   path prefix on any host
#   glob:<pattern>  wildcard over the full URL (* and ?)
#   re:<regex>      regular expression over the full URL
version: 1
rules:
  - host:localhost
  - glob:*.archive.org/web/*
";

#[derive(Args)]
pub struct InitArgs {
    /// Output file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    pub output: PathBuf,

    /// Overwrite existing files
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
pub struct InitOutput {
    pub created: String,
    pub file: String,
    pub exclusions: String,
}

pub async fn run_init(args: InitArgs) -> Result<()> {
    if args.output.exists() && !args.force {
        let error = serde_json::json!({
            "error": "file_exists",
            "message": format!("{} already exists. Use --force to overwrite.", args.output.display()),
            "file": args.output.display().to_string()
        });
        println!("{}", serde_json::to_string(&error)?);
        bail!("File exists");
    }

    let exclusions = args.output.with_file_name("exclusions.yaml");
    let config = MonitorConfig {
        exclusions_file: Some(exclusions.clone()),
        ..MonitorConfig::default()
    };

    tokio::fs::write(&args.output, serde_yaml::to_string(&config)?).await?;
    if !exclusions.exists() || args.force {
        tokio::fs::write(&exclusions, EXCLUSIONS_TEMPLATE).await?;
    }

    let output = InitOutput {
        created: Utc::now().to_rfc3339(),
        file: args.output.display().to_string(),
        exclusions: exclusions.display().to_string(),
    };
    println!("{}", serde_json::to_string(&output)?);

    Ok(())
}
