//! Monitor: filter -> probe -> record, under a bounded worker pool
//!
//! Each candidate gets a one-shot task that holds a semaphore permit for its
//! whole lifetime. When the input stream ends, in-flight tasks get
//! `join_timeout` to finish; the rest are detached, not cancelled.

use crate::archive::ArchiveResolver;
use crate::exclusion::ExclusionFilter;
use crate::history::HistoryStore;
use crate::probe::{CheckResult, LinkProbe};
use crate::report::{ReportSink, ReportableEvent};
use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, Stream, StreamExt};
use futures::FutureExt;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tracing::{debug, info, warn};

/// A URL found in a document, ready to be checked
#[derive(Debug, Clone)]
pub struct CandidateLink {
    pub url: String,
    pub document: String,
    pub discovered_at: DateTime<Utc>,
}

impl CandidateLink {
    pub fn new(url: impl Into<String>, document: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            document: document.into(),
            discovered_at: Utc::now(),
        }
    }
}

/// Counts for one run
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Checks that completed
    pub checked: usize,
    pub alive: usize,
    pub dead: usize,
    pub excluded: usize,
    /// Previously dead links that answered again
    pub recovered: usize,
    pub reported: usize,
    /// Checks still running when the join timeout expired
    pub abandoned: usize,
}

impl RunSummary {
    fn tally(&mut self, done: Result<Outcome, JoinError>) {
        let outcome = match done {
            Ok(o) => o,
            Err(e) => {
                warn!(error = %e, "Check task failed");
                return;
            }
        };
        match outcome {
            Outcome::Excluded => {
                self.excluded += 1;
                return;
            }
            Outcome::Alive => self.alive += 1,
            Outcome::Recovered => {
                self.alive += 1;
                self.recovered += 1;
            }
            Outcome::Dead { reported } => {
                self.dead += 1;
                if reported {
                    self.reported += 1;
                }
            }
        }
        self.checked += 1;
    }
}

#[derive(Debug, Clone, Copy)]
enum Outcome {
    Excluded,
    Alive,
    Recovered,
    Dead { reported: bool },
}

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Everything a worker needs; cloned into each task
struct Pipeline<P> {
    probe: Arc<P>,
    history: Arc<HistoryStore>,
    archive: Option<Arc<ArchiveResolver>>,
    sink: Arc<dyn ReportSink>,
    clock: Clock,
}

impl<P> Clone for Pipeline<P> {
    fn clone(&self) -> Self {
        Self {
            probe: Arc::clone(&self.probe),
            history: Arc::clone(&self.history),
            archive: self.archive.clone(),
            sink: Arc::clone(&self.sink),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<P: LinkProbe> Pipeline<P> {
    async fn process(&self, candidate: CandidateLink) -> Outcome {
        let url = candidate.url.as_str();
        debug!(url, discovered = %candidate.discovered_at, "checking");
        let result = self.probe.check(url).await;

        if result.alive {
            info!(url, status = %result.status_summary, hops = result.redirect_chain.len(), "alive");
            if self.history.record_alive(url).await {
                info!(url, "recovered");
                self.sink.on_recovered(url);
                return Outcome::Recovered;
            }
            return Outcome::Alive;
        }

        let kind = result
            .error_kind()
            .map(|k| k.to_string())
            .unwrap_or_default();
        let now = (self.clock)();
        let outcome = self
            .history
            .record_dead(url, &candidate.document, &result.status_summary, now)
            .await;

        info!(
            url,
            document = %candidate.document,
            kind = %kind,
            error = %result.status_summary,
            recorded = outcome.recorded,
            "dead"
        );

        let Some(history) = outcome.reportable else {
            return Outcome::Dead { reported: false };
        };

        let archive_url = match &self.archive {
            Some(archive) => archive.resolve(url, now).await,
            None => None,
        };

        info!(
            url,
            since = %history.first_seen().unwrap_or(now),
            archived = archive_url.is_some(),
            "reportable"
        );

        self.sink.on_reportable(&ReportableEvent {
            url: candidate.url.clone(),
            document: candidate.document.clone(),
            error: result.status_summary,
            history,
            archive_url,
        });
        Outcome::Dead { reported: true }
    }
}

/// Concurrency controller
pub struct Monitor<P> {
    filter: ExclusionFilter,
    pipeline: Pipeline<P>,
    max_concurrency: usize,
    join_timeout: Duration,
}

impl<P: LinkProbe> Monitor<P> {
    pub fn new(
        probe: P,
        filter: ExclusionFilter,
        history: Arc<HistoryStore>,
        sink: Arc<dyn ReportSink>,
    ) -> Self {
        Self {
            filter,
            pipeline: Pipeline {
                probe: Arc::new(probe),
                history,
                archive: None,
                sink,
                clock: Arc::new(Utc::now),
            },
            max_concurrency: 50,
            join_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn with_join_timeout(mut self, join_timeout: Duration) -> Self {
        self.join_timeout = join_timeout;
        self
    }

    pub fn with_archive(mut self, archive: ArchiveResolver) -> Self {
        self.pipeline.archive = Some(Arc::new(archive));
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.pipeline.clock = clock;
        self
    }

    /// Check every candidate in `candidates`, returning once all checks
    /// finished or the join timeout expired.
    pub async fn run<S>(&self, candidates: S) -> RunSummary
    where
        S: Stream<Item = CandidateLink>,
    {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut workers = FuturesUnordered::new();
        let mut summary = RunSummary::default();
        let mut candidates = std::pin::pin!(candidates);

        while let Some(candidate) = candidates.next().await {
            if let Some(rule) = self.filter.first_match(&candidate.url) {
                info!(url = %candidate.url, rule = rule.as_str(), "excluded");
                let skipped = CheckResult::excluded(&candidate.url, rule.as_str());
                self.pipeline.sink.on_excluded(&skipped);
                summary.tally(Ok(Outcome::Excluded));
                continue;
            }

            // waits here while the pool is saturated
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };
            let pipeline = self.pipeline.clone();
            workers.push(tokio::spawn(async move {
                let _permit = permit;
                pipeline.process(candidate).await
            }));

            while let Some(Some(done)) = workers.next().now_or_never() {
                summary.tally(done);
            }
        }

        let deadline = tokio::time::Instant::now() + self.join_timeout;
        loop {
            match tokio::time::timeout_at(deadline, workers.next()).await {
                Ok(Some(done)) => summary.tally(done),
                Ok(None) => break,
                Err(_) => {
                    summary.abandoned = workers.len();
                    warn!(
                        abandoned = summary.abandoned,
                        "Join timeout expired, abandoning in-flight checks"
                    );
                    break;
                }
            }
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::history::HistoryPolicy;
    use chrono::TimeZone;
    use reqwest::StatusCode;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Answers from a fixed set of dead URLs and tracks concurrency
    #[derive(Default)]
    struct FakeProbe {
        dead: HashSet<String>,
        delay: Duration,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        calls: Mutex<Vec<String>>,
    }

    impl FakeProbe {
        fn with_dead(urls: &[&str]) -> Self {
            Self {
                dead: urls.iter().map(|u| u.to_string()).collect(),
                ..Self::default()
            }
        }
    }

    impl LinkProbe for Arc<FakeProbe> {
        async fn check(&self, url: &str) -> CheckResult {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            self.calls.lock().unwrap().push(url.to_string());
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.dead.contains(url) {
                CheckResult::dead(
                    url,
                    ErrorKind::HttpClientError,
                    "404 Not Found",
                    Some(404),
                    vec![],
                )
            } else {
                CheckResult::alive(url, StatusCode::OK, vec![])
            }
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        reported: Mutex<Vec<ReportableEvent>>,
        recovered: Mutex<Vec<String>>,
        excluded: Mutex<Vec<CheckResult>>,
    }

    impl ReportSink for RecordingSink {
        fn on_reportable(&self, event: &ReportableEvent) {
            self.reported.lock().unwrap().push(event.clone());
        }

        fn on_recovered(&self, url: &str) {
            self.recovered.lock().unwrap().push(url.to_string());
        }

        fn on_excluded(&self, result: &CheckResult) {
            self.excluded.lock().unwrap().push(result.clone());
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn links(urls: &[&str]) -> impl Stream<Item = CandidateLink> {
        let links: Vec<_> = urls.iter().map(|u| CandidateLink::new(*u, "Doc")).collect();
        futures::stream::iter(links)
    }

    #[tokio::test]
    async fn test_never_exceeds_max_concurrency() {
        let probe = Arc::new(FakeProbe {
            delay: Duration::from_millis(20),
            ..FakeProbe::default()
        });
        let history = Arc::new(HistoryStore::new(HistoryPolicy::default()));
        let sink = Arc::new(RecordingSink::default());
        let monitor = Monitor::new(
            Arc::clone(&probe),
            ExclusionFilter::default(),
            history,
            sink,
        )
        .with_max_concurrency(2);

        let urls: Vec<String> = (0..10).map(|i| format!("https://site{}.com/", i)).collect();
        let refs: Vec<&str> = urls.iter().map(String::as_str).collect();
        let summary = monitor.run(links(&refs)).await;

        assert_eq!(summary.checked, 10);
        assert_eq!(summary.alive, 10);
        assert!(probe.max_in_flight.load(Ordering::SeqCst) <= 2);
        assert_eq!(probe.calls.lock().unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_excluded_links_are_never_probed() {
        let probe = Arc::new(FakeProbe::with_dead(&["https://blocked.example.org/x"]));
        let history = Arc::new(HistoryStore::new(HistoryPolicy::default()));
        let sink = Arc::new(RecordingSink::default());
        let filter = ExclusionFilter::new(&["host:example.org"]).unwrap();
        let monitor = Monitor::new(
            Arc::clone(&probe),
            filter,
            Arc::clone(&history),
            Arc::clone(&sink) as Arc<dyn ReportSink>,
        );

        let summary = monitor
            .run(links(&["https://blocked.example.org/x", "https://ok.com/"]))
            .await;

        assert_eq!(summary.excluded, 1);
        assert_eq!(summary.checked, 1);
        assert_eq!(*probe.calls.lock().unwrap(), vec!["https://ok.com/".to_string()]);
        assert!(history.is_empty().await);

        let excluded = sink.excluded.lock().unwrap();
        assert_eq!(excluded.len(), 1);
        assert_eq!(excluded[0].url, "https://blocked.example.org/x");
        assert_eq!(excluded[0].error_kind(), Some(ErrorKind::Excluded));
        assert!(excluded[0].status.is_none());
    }

    #[tokio::test]
    async fn test_alive_link_clears_history() {
        let url = "https://back.com/";
        let probe = Arc::new(FakeProbe::default());
        let history = Arc::new(HistoryStore::new(HistoryPolicy::default()));
        history.record_dead(url, "Doc", "timeout", t0()).await;
        let sink = Arc::new(RecordingSink::default());
        let monitor = Monitor::new(
            probe,
            ExclusionFilter::default(),
            Arc::clone(&history),
            Arc::clone(&sink) as Arc<dyn ReportSink>,
        );

        let summary = monitor.run(links(&[url])).await;

        assert_eq!(summary.recovered, 1);
        assert!(history.get(url).await.is_none());
        assert_eq!(*sink.recovered.lock().unwrap(), vec![url.to_string()]);
        assert!(sink.reported.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reports_after_grace_period() {
        let url = "https://gone.com/";
        let probe = Arc::new(FakeProbe::with_dead(&[url]));
        let history = Arc::new(HistoryStore::new(HistoryPolicy::default()));
        history.record_dead(url, "Doc", "404 Not Found", t0()).await;
        let sink = Arc::new(RecordingSink::default());
        let monitor = Monitor::new(
            probe,
            ExclusionFilter::default(),
            Arc::clone(&history),
            Arc::clone(&sink) as Arc<dyn ReportSink>,
        )
        .with_clock(Arc::new(|| t0() + chrono::Duration::days(8)));

        let summary = monitor.run(links(&[url])).await;

        assert_eq!(summary.dead, 1);
        assert_eq!(summary.reported, 1);
        let reported = sink.reported.lock().unwrap();
        assert_eq!(reported.len(), 1);
        assert_eq!(reported[0].url, url);
        assert_eq!(reported[0].history.observations.len(), 2);
        assert!(reported[0].archive_url.is_none());
    }

    #[tokio::test]
    async fn test_first_failure_is_recorded_not_reported() {
        let url = "https://new-dead.com/";
        let probe = Arc::new(FakeProbe::with_dead(&[url]));
        let history = Arc::new(HistoryStore::new(HistoryPolicy::default()));
        let sink = Arc::new(RecordingSink::default());
        let monitor = Monitor::new(
            probe,
            ExclusionFilter::default(),
            Arc::clone(&history),
            Arc::clone(&sink) as Arc<dyn ReportSink>,
        );

        let summary = monitor.run(links(&[url])).await;

        assert_eq!(summary.dead, 1);
        assert_eq!(summary.reported, 0);
        let record = history.get(url).await.unwrap();
        assert_eq!(record.observations[0].error, "404 Not Found");
        assert_eq!(record.observations[0].document, "Doc");
    }

    #[tokio::test]
    async fn test_stragglers_are_abandoned_after_join_timeout() {
        let probe = Arc::new(FakeProbe {
            delay: Duration::from_secs(10),
            ..FakeProbe::default()
        });
        let history = Arc::new(HistoryStore::new(HistoryPolicy::default()));
        let sink = Arc::new(RecordingSink::default());
        let monitor = Monitor::new(probe, ExclusionFilter::default(), history, sink)
            .with_join_timeout(Duration::from_millis(50));

        let started = std::time::Instant::now();
        let summary = monitor.run(links(&["https://slow.com/"])).await;

        assert_eq!(summary.abandoned, 1);
        assert_eq!(summary.checked, 0);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
