//! deadlinks.yaml configuration
//!
//! Every field is optional; missing fields take the defaults below.

use crate::error::{Error, Result};
use crate::history::HistoryPolicy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "deadlinks.yaml";
pub const DEFAULT_USER_AGENT: &str = concat!("deadlinks/", env!("CARGO_PKG_VERSION"));

/// Root configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Maximum checks in flight
    pub max_concurrency: usize,
    /// Days a link must stay dead before it is reported
    pub grace_period_days: u32,
    /// Minimum spacing between recorded failures for one URL
    pub debounce_seconds: u64,
    /// Statuses outside 4xx that count as dead
    pub ignored_status_codes: BTreeSet<u16>,
    /// Redirects followed before giving up
    pub redirect_hop_limit: usize,
    /// Per-request timeout
    pub request_timeout_seconds: u64,
    /// How long to wait for in-flight checks once input is exhausted
    pub join_timeout_seconds: u64,
    pub user_agent: String,
    /// Persisted failure history (JSON)
    pub history_file: PathBuf,
    /// Versioned exclusion rules (YAML)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclusions_file: Option<PathBuf>,
    pub archive: ArchiveConfig,
}

/// Snapshot lookup services
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub enabled: bool,
    /// Wayback Machine availability API
    pub primary_endpoint: String,
    /// Memento TimeTravel JSON API
    pub fallback_endpoint: String,
    /// Extra attempts per service after the first
    pub retries: u32,
    pub retry_wait_seconds: u64,
    pub timeout_seconds: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 50,
            grace_period_days: 7,
            debounce_seconds: 3600,
            ignored_status_codes: BTreeSet::new(),
            redirect_hop_limit: 19,
            request_timeout_seconds: 30,
            join_timeout_seconds: 30,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            history_file: PathBuf::from("deadlinks-history.json"),
            exclusions_file: None,
            archive: ArchiveConfig::default(),
        }
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            primary_endpoint: "https://archive.org/wayback/available".to_string(),
            fallback_endpoint: "https://timetravel.mementoweb.org/api/json".to_string(),
            retries: 2,
            retry_wait_seconds: 5,
            timeout_seconds: 30,
        }
    }
}

impl MonitorConfig {
    /// Load and validate a YAML config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| Error::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: MonitorConfig =
            serde_yaml::from_str(&content).map_err(|source| Error::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, else `./deadlinks.yaml` if present, else defaults
    pub fn discover(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => {
                let local = Path::new(DEFAULT_CONFIG_FILE);
                if local.is_file() {
                    Self::load(local)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn history_policy(&self) -> HistoryPolicy {
        HistoryPolicy {
            debounce: self.debounce(),
            grace_period: self.grace_period(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            return Err(Error::InvalidConfig(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.redirect_hop_limit == 0 {
            return Err(Error::InvalidConfig(
                "redirect_hop_limit must be at least 1".to_string(),
            ));
        }
        if self.request_timeout_seconds == 0 {
            return Err(Error::InvalidConfig(
                "request_timeout_seconds must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn grace_period(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.grace_period_days))
    }

    pub fn debounce(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.debounce_seconds).unwrap_or(i64::MAX))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_secs(self.join_timeout_seconds)
    }
}
