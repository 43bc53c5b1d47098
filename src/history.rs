//! Dead link history: URL -> failure observations
//!
//! The map is only reachable through `record_dead` / `record_alive`, each of
//! which runs its whole read-modify-write under one lock. The file is read
//! once at startup and written once at the end of a run.

use crate::error::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// One recorded failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    /// Title of the document the link was found in
    pub document: String,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,
    pub error: String,
}

/// Snapshot of one URL's failure history
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkHistoryRecord {
    pub url: String,
    pub observations: Vec<Observation>,
}

impl LinkHistoryRecord {
    pub fn first_seen(&self) -> Option<DateTime<Utc>> {
        self.observations.first().map(|o| o.timestamp)
    }

    pub fn last_seen(&self) -> Option<DateTime<Utc>> {
        self.observations.last().map(|o| o.timestamp)
    }
}

/// Debounce and grace-period settings
#[derive(Debug, Clone, Copy)]
pub struct HistoryPolicy {
    pub debounce: Duration,
    pub grace_period: Duration,
}

impl Default for HistoryPolicy {
    fn default() -> Self {
        Self {
            debounce: Duration::hours(1),
            grace_period: Duration::days(7),
        }
    }
}

/// What `record_dead` decided
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadOutcome {
    /// A new observation was appended (or the record was created)
    pub recorded: bool,
    /// Set once the link has been dead longer than the grace period
    pub reportable: Option<LinkHistoryRecord>,
}

type HistoryMap = HashMap<String, Vec<Observation>>;

/// Lock-guarded failure history
pub struct HistoryStore {
    records: Mutex<HistoryMap>,
    policy: HistoryPolicy,
}

impl HistoryStore {
    pub fn new(policy: HistoryPolicy) -> Self {
        Self::with_records(HashMap::new(), policy)
    }

    fn with_records(mut records: HistoryMap, policy: HistoryPolicy) -> Self {
        records.retain(|_, observations| !observations.is_empty());
        for observations in records.values_mut() {
            observations.sort_by_key(|o| o.timestamp);
        }
        Self {
            records: Mutex::new(records),
            policy,
        }
    }

    /// Load from `path`. A missing, empty or unreadable file yields an empty
    /// history so the grace-period clock restarts rather than the run failing.
    pub async fn load(path: &Path, policy: HistoryPolicy) -> Self {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No history file, starting empty");
                return Self::new(policy);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot read history, starting empty");
                return Self::new(policy);
            }
        };

        if content.trim().is_empty() {
            return Self::new(policy);
        }

        match serde_json::from_str::<HistoryMap>(&content) {
            Ok(records) => {
                info!(path = %path.display(), links = records.len(), "Loaded history");
                Self::with_records(records, policy)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Corrupt history, starting empty");
                Self::new(policy)
            }
        }
    }

    /// Write the whole map, keys sorted, via a temporary sibling file
    pub async fn save(&self, path: &Path) -> Result<()> {
        let json = {
            let records = self.records.lock().await;
            let sorted: BTreeMap<&String, &Vec<Observation>> = records.iter().collect();
            serde_json::to_string_pretty(&sorted)?
        };

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|source| Error::Write {
                path: tmp.clone(),
                source,
            })?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|source| Error::Write {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(())
    }

    /// Record a failed check observed at `now`
    pub async fn record_dead(
        &self,
        url: &str,
        document: &str,
        error: &str,
        now: DateTime<Utc>,
    ) -> DeadOutcome {
        let mut records = self.records.lock().await;
        let observation = Observation {
            document: document.to_string(),
            timestamp: now,
            error: error.to_string(),
        };

        let observations = records.entry(url.to_string()).or_default();
        let recorded = match observations.last().map(|o| o.timestamp) {
            None => {
                observations.push(observation);
                true
            }
            Some(last) if now - last > self.policy.debounce => {
                observations.push(observation);
                true
            }
            Some(_) => {
                debug!(url, "Failure within debounce interval, not recorded");
                false
            }
        };

        let reportable = observations
            .first()
            .filter(|first| now - first.timestamp > self.policy.grace_period)
            .map(|_| LinkHistoryRecord {
                url: url.to_string(),
                observations: observations.clone(),
            });

        DeadOutcome {
            recorded,
            reportable,
        }
    }

    /// Forget a URL that answered. Returns whether it had a history.
    pub async fn record_alive(&self, url: &str) -> bool {
        self.records.lock().await.remove(url).is_some()
    }

    pub async fn get(&self, url: &str) -> Option<LinkHistoryRecord> {
        self.records
            .lock()
            .await
            .get(url)
            .map(|observations| LinkHistoryRecord {
                url: url.to_string(),
                observations: observations.clone(),
            })
    }

    /// All records, sorted by URL
    pub async fn snapshot(&self) -> Vec<LinkHistoryRecord> {
        let records = self.records.lock().await;
        let mut all: Vec<LinkHistoryRecord> = records
            .iter()
            .map(|(url, observations)| LinkHistoryRecord {
                url: url.clone(),
                observations: observations.clone(),
            })
            .collect();
        all.sort_by(|a, b| a.url.cmp(&b.url));
        all
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}
