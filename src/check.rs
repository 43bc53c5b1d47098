//! check command: probe every URL in the given documents
//!
//! Events (reportable / recovered) go to stdout as JSON lines, followed by a
//! summary line. Progress and per-link traces go to stderr.

use anyhow::{bail, Context, Result};
use clap::Args;
use deadlinks::extract::candidates;
use deadlinks::{
    ArchiveResolver, CandidateLink, ExclusionFilter, HistoryStore, JsonLinesSink, Monitor,
    MonitorConfig, ProbeConfig, Prober, RunSummary,
};
use serde::Serialize;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Args)]
pub struct CheckArgs {
    /// Documents to scan for URLs (files, directories or glob patterns)
    #[arg(value_name = "FILE")]
    files: Vec<PathBuf>,

    /// Check a single URL (repeatable)
    #[arg(long)]
    url: Vec<String>,

    /// Read URLs from stdin (one per line)
    #[arg(long)]
    stdin: bool,

    /// Configuration file (default: ./deadlinks.yaml if present)
    #[arg(short, long, env = "DEADLINKS_CONFIG")]
    config: Option<PathBuf>,

    /// History file (overrides the configuration)
    #[arg(long, env = "DEADLINKS_HISTORY")]
    history: Option<PathBuf>,

    /// Exclusion rules file (overrides the configuration)
    #[arg(long)]
    exclusions: Option<PathBuf>,

    /// Maximum parallel checks (1-1000)
    #[arg(short = 'j', long, value_parser = clap::value_parser!(u16).range(1..=1000))]
    concurrency: Option<u16>,

    /// Request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Skip archive snapshot lookups
    #[arg(long)]
    no_archive: bool,

    /// Don't write the history file
    #[arg(long)]
    dry_run: bool,
}

#[derive(Debug, Serialize)]
struct CheckOutput {
    event: &'static str,
    #[serde(flatten)]
    summary: RunSummary,
    tracked: usize,
    history_file: String,
    timestamp: String,
}

/// Run the check command
pub async fn run_check(args: CheckArgs) -> Result<()> {
    let config = resolve_config(&args)?;
    let links = get_candidates(&args).await?;

    if links.is_empty() {
        bail!("No URLs found.");
    }

    let filter = match &config.exclusions_file {
        Some(path) => ExclusionFilter::load(path)
            .with_context(|| format!("Failed to load exclusions: {}", path.display()))?,
        None => ExclusionFilter::default(),
    };

    let history = Arc::new(HistoryStore::load(&config.history_file, config.history_policy()).await);
    let prober = Prober::new(ProbeConfig::from(&config))?;
    let sink = Arc::new(JsonLinesSink::new(io::stdout()));

    let mut monitor = Monitor::new(prober, filter, Arc::clone(&history), sink)
        .with_max_concurrency(config.max_concurrency)
        .with_join_timeout(config.join_timeout());
    if config.archive.enabled && !args.no_archive {
        monitor = monitor.with_archive(ArchiveResolver::new(&config.archive, &config.user_agent)?);
    }

    info!(
        urls = links.len(),
        parallel = config.max_concurrency,
        "Checking links"
    );
    let summary = monitor.run(futures::stream::iter(links)).await;

    if args.dry_run {
        info!("Dry run - history not written");
    } else {
        history.save(&config.history_file).await.with_context(|| {
            format!("Failed to save history: {}", config.history_file.display())
        })?;
    }

    let output = CheckOutput {
        event: "summary",
        summary,
        tracked: history.len().await,
        history_file: config.history_file.display().to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    };
    println!("{}", serde_json::to_string(&output)?);

    Ok(())
}

fn resolve_config(args: &CheckArgs) -> Result<MonitorConfig> {
    let mut config = MonitorConfig::discover(args.config.as_deref())?;
    if let Some(history) = &args.history {
        config.history_file = history.clone();
    }
    if let Some(exclusions) = &args.exclusions {
        config.exclusions_file = Some(exclusions.clone());
    }
    if let Some(concurrency) = args.concurrency {
        config.max_concurrency = usize::from(concurrency);
    }
    if let Some(timeout) = args.timeout {
        config.request_timeout_seconds = timeout;
    }
    config.validate()?;
    Ok(config)
}

/// Gather candidates from --url, stdin and documents
async fn get_candidates(args: &CheckArgs) -> Result<Vec<CandidateLink>> {
    if args.url.is_empty() && !args.stdin && args.files.is_empty() {
        bail!(
            "Usage:\n  deadlinks check <FILE>...       Check URLs in documents\n  deadlinks check --url <URL>     Check a single URL\n  deadlinks check --stdin         Read URLs from stdin"
        );
    }

    let mut links: Vec<CandidateLink> = args
        .url
        .iter()
        .map(|url| CandidateLink::new(url.clone(), "(command line)"))
        .collect();

    if args.stdin {
        let stdin = io::stdin();
        links.extend(
            stdin
                .lock()
                .lines()
                .map_while(std::result::Result::ok)
                .map(|line| line.trim().to_string())
                .filter(|line| line.starts_with("http"))
                .map(|url| CandidateLink::new(url, "(stdin)")),
        );
    }

    for file in expand_files(&args.files).await? {
        let content = tokio::fs::read_to_string(&file)
            .await
            .with_context(|| format!("Failed to read file: {}", file.display()))?;
        links.extend(candidates(&file.display().to_string(), &content));
    }

    Ok(links)
}

/// Expand file patterns to document paths
async fn expand_files(patterns: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for pattern in patterns {
        let pattern_str = pattern.to_string_lossy();

        if pattern_str.contains('*') {
            for entry in glob::glob(&pattern_str)? {
                let path = entry?;
                if path.is_file() {
                    files.push(path);
                }
            }
        } else if pattern.is_dir() {
            let mut entries = tokio::fs::read_dir(pattern).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if is_document(&path) {
                    files.push(path);
                }
            }
        } else {
            // missing files surface as read errors
            files.push(pattern.clone());
        }
    }

    Ok(files)
}

fn is_document(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| matches!(e, "md" | "markdown" | "txt" | "wiki" | "html"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_document() {
        let dir = tempfile::tempdir().unwrap();
        let md = dir.path().join("page.md");
        let bin = dir.path().join("image.png");
        std::fs::write(&md, "x").unwrap();
        std::fs::write(&bin, "x").unwrap();
        assert!(is_document(&md));
        assert!(!is_document(&bin));
        assert!(!is_document(&dir.path().join("missing.md")));
    }

    #[tokio::test]
    async fn test_expand_files_directory_and_glob() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.md"), "https://a.com").unwrap();
        std::fs::write(dir.path().join("b.txt"), "https://b.com").unwrap();
        std::fs::write(dir.path().join("c.png"), "").unwrap();

        let from_dir = expand_files(&[dir.path().to_path_buf()]).await.unwrap();
        assert_eq!(from_dir.len(), 2);

        let pattern = dir.path().join("*.md");
        let from_glob = expand_files(&[pattern]).await.unwrap();
        assert_eq!(from_glob.len(), 1);
    }
}
