//! Archive snapshot lookup for links confirmed dead
//!
//! Primary: Wayback Machine availability API. Fallback: Memento TimeTravel.
//! Transport and HTTP errors are retried; a clean "not archived" answer
//! moves straight on. Nothing here ever fails the caller.

use crate::config::ArchiveConfig;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

#[derive(Debug, Deserialize)]
struct WaybackResponse {
    #[serde(default)]
    archived_snapshots: WaybackSnapshots,
}

#[derive(Debug, Default, Deserialize)]
struct WaybackSnapshots {
    closest: Option<WaybackSnapshot>,
}

#[derive(Debug, Deserialize)]
struct WaybackSnapshot {
    #[serde(default)]
    available: bool,
    url: String,
}

#[derive(Debug, Deserialize)]
struct TimeTravelResponse {
    mementos: TimeTravelMementos,
}

#[derive(Debug, Deserialize)]
struct TimeTravelMementos {
    closest: Option<TimeTravelMemento>,
}

#[derive(Debug, Deserialize)]
struct TimeTravelMemento {
    #[serde(default)]
    uri: Vec<String>,
}

/// Best-effort snapshot resolver
pub struct ArchiveResolver {
    client: Client,
    primary_endpoint: String,
    fallback_endpoint: Url,
    retries: u32,
    retry_wait: Duration,
}

impl ArchiveResolver {
    pub fn new(config: &ArchiveConfig, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        let fallback_endpoint = Url::parse(&config.fallback_endpoint)
            .ok()
            .filter(|u| !u.cannot_be_a_base())
            .ok_or_else(|| {
                Error::InvalidConfig(format!(
                    "archive.fallback_endpoint is not a usable URL: {}",
                    config.fallback_endpoint
                ))
            })?;
        Ok(Self {
            client,
            primary_endpoint: config.primary_endpoint.clone(),
            fallback_endpoint,
            retries: config.retries,
            retry_wait: Duration::from_secs(config.retry_wait_seconds),
        })
    }

    /// Closest snapshot of `url` as of `as_of`, if either service has one
    pub async fn resolve(&self, url: &str, as_of: DateTime<Utc>) -> Option<String> {
        let timestamp = as_of.format("%Y%m%d%H%M%S").to_string();

        if let Some(found) = self
            .with_retries("wayback", || self.query_wayback(url, &timestamp))
            .await
        {
            return Some(found);
        }

        let found = self
            .with_retries("timetravel", || self.query_timetravel(url, &timestamp))
            .await;
        if found.is_none() {
            debug!(url, "No archive snapshot found");
        }
        found
    }

    async fn with_retries<F, Fut>(&self, service: &str, query: F) -> Option<String>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = reqwest::Result<Option<String>>>,
    {
        for attempt in 0..=self.retries {
            match query().await {
                Ok(found) => return found,
                Err(e) => {
                    warn!(service, attempt = attempt + 1, error = %e, "Archive lookup failed");
                    if attempt < self.retries {
                        tokio::time::sleep(self.retry_wait).await;
                    }
                }
            }
        }
        None
    }

    async fn query_wayback(&self, url: &str, timestamp: &str) -> reqwest::Result<Option<String>> {
        let response: WaybackResponse = self
            .client
            .get(&self.primary_endpoint)
            .query(&[("url", url), ("timestamp", timestamp)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response
            .archived_snapshots
            .closest
            .filter(|s| s.available)
            .map(|s| s.url))
    }

    async fn query_timetravel(
        &self,
        url: &str,
        timestamp: &str,
    ) -> reqwest::Result<Option<String>> {
        let endpoint = timetravel_endpoint(&self.fallback_endpoint, timestamp, url);
        let response = self.client.get(endpoint).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body: TimeTravelResponse = response.error_for_status()?.json().await?;
        Ok(body
            .mementos
            .closest
            .and_then(|m| m.uri.into_iter().next()))
    }
}

/// `{base}/{timestamp}/{url}` with `url` kept as a single encoded segment
fn timetravel_endpoint(base: &Url, timestamp: &str, url: &str) -> Url {
    let mut endpoint = base.clone();
    if let Ok(mut segments) = endpoint.path_segments_mut() {
        segments.pop_if_empty().push(timestamp).push(url);
    }
    endpoint
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timetravel_endpoint_keeps_query_and_fragment() {
        let base = Url::parse("https://timetravel.example/api/json/").unwrap();
        let endpoint = timetravel_endpoint(
            &base,
            "20250301120000",
            "https://dead.example/page?id=7&lang=en#intro",
        );
        assert!(endpoint.query().is_none());
        assert!(endpoint.fragment().is_none());
        let segments: Vec<&str> = endpoint.path_segments().unwrap().collect();
        assert_eq!(segments.len(), 4);
        assert_eq!(segments[..3], ["api", "json", "20250301120000"]);
        assert!(segments[3].contains("%3Fid=7&lang=en%23intro"));
    }

    #[test]
    fn test_unusable_fallback_endpoint_is_rejected() {
        let config = ArchiveConfig {
            fallback_endpoint: "not a url".to_string(),
            ..ArchiveConfig::default()
        };
        assert!(matches!(
            ArchiveResolver::new(&config, "deadlinks-test"),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_parse_wayback_response() {
        let json = r#"{"url": "example.com", "archived_snapshots": {"closest": {
            "status": "200", "available": true,
            "url": "http://web.archive.org/web/20130919044612/http://example.com/",
            "timestamp": "20130919044612"}}}"#;
        let parsed: WaybackResponse = serde_json::from_str(json).unwrap();
        let closest = parsed.archived_snapshots.closest.unwrap();
        assert!(closest.available);
        assert!(closest.url.contains("20130919044612"));

        let empty: WaybackResponse =
            serde_json::from_str(r#"{"url": "x", "archived_snapshots": {}}"#).unwrap();
        assert!(empty.archived_snapshots.closest.is_none());
    }

    #[test]
    fn test_parse_timetravel_response() {
        let json = r#"{"original_uri": "http://example.com/", "mementos": {
            "closest": {"datetime": "2013-09-19T04:46:12Z",
            "uri": ["http://web.archive.org/web/20130919044612/http://example.com/"]}}}"#;
        let parsed: TimeTravelResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.mementos.closest.unwrap().uri.len(), 1);
    }
}
