//! Report emitter interface
//!
//! The monitor hands reportable and recovered links to a `ReportSink`.
//! Delivery is at-least-once: a link still dead past its grace period is
//! reported again on every run that checks it.

use crate::history::LinkHistoryRecord;
use crate::probe::{CheckError, CheckResult};
use serde::Serialize;
use std::io::Write;
use std::sync::Mutex;
use tracing::warn;

/// A link that has been dead longer than the grace period
#[derive(Debug, Clone, Serialize)]
pub struct ReportableEvent {
    pub url: String,
    /// Document the link was found in on this check
    pub document: String,
    /// Error from the check that triggered the report
    pub error: String,
    pub history: LinkHistoryRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_url: Option<String>,
}

/// Receiver of monitor events
pub trait ReportSink: Send + Sync {
    fn on_reportable(&self, event: &ReportableEvent);

    fn on_recovered(&self, _url: &str) {}

    /// A candidate matched an exclusion rule and was not checked
    fn on_excluded(&self, _result: &CheckResult) {}
}

#[derive(Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum Line<'a> {
    Reportable(&'a ReportableEvent),
    Recovered { url: &'a str },
    Excluded { url: &'a str, reason: &'a CheckError },
}

/// Writes one compact JSON object per event
pub struct JsonLinesSink<W> {
    out: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok(w) => w,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn emit(&self, line: &Line<'_>) {
        let mut out = match self.out.lock() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        };
        let written = serde_json::to_writer(&mut *out, line)
            .map_err(std::io::Error::from)
            .and_then(|()| {
                writeln!(out)?;
                out.flush()
            });
        if let Err(e) = written {
            warn!(error = %e, "Failed to write event");
        }
    }
}

impl<W: Write + Send> ReportSink for JsonLinesSink<W> {
    fn on_reportable(&self, event: &ReportableEvent) {
        self.emit(&Line::Reportable(event));
    }

    fn on_recovered(&self, url: &str) {
        self.emit(&Line::Recovered { url });
    }

    fn on_excluded(&self, result: &CheckResult) {
        if let Some(reason) = &result.error {
            self.emit(&Line::Excluded {
                url: &result.url,
                reason,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::Observation;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_json_lines_output() {
        let sink = JsonLinesSink::new(Vec::new());
        let event = ReportableEvent {
            url: "https://gone.example/".to_string(),
            document: "Rust (programming language)".to_string(),
            error: "404 Not Found".to_string(),
            history: LinkHistoryRecord {
                url: "https://gone.example/".to_string(),
                observations: vec![Observation {
                    document: "Rust (programming language)".to_string(),
                    timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
                    error: "404 Not Found".to_string(),
                }],
            },
            archive_url: None,
        };

        sink.on_reportable(&event);
        sink.on_recovered("https://back.example/");
        sink.on_excluded(&CheckResult::excluded("https://skip.example/", "host:skip.example"));

        let output = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 3);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["event"], "reportable");
        assert_eq!(first["url"], "https://gone.example/");
        assert_eq!(first["history"]["observations"][0]["timestamp"], 1_700_000_000);
        assert!(first.get("archive_url").is_none());

        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["event"], "recovered");
        assert_eq!(second["url"], "https://back.example/");

        let third: serde_json::Value = serde_json::from_str(lines[2]).unwrap();
        assert_eq!(third["event"], "excluded");
        assert_eq!(third["reason"]["kind"], "excluded");
        assert_eq!(third["reason"]["message"], "Excluded by rule host:skip.example");
    }
}
