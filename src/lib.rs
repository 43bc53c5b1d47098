//! deadlinks: dead link monitoring
//!
//! Pipeline:
//! - exclusion: skip rules over candidate URLs
//! - probe: redirect-aware reachability check
//! - monitor: bounded worker pool tying the stages together
//! - history: failure history with debounce and grace period
//! - archive: snapshot lookup for links confirmed dead
//! - report: sink for reportable and recovered links

pub mod archive;
pub mod config;
pub mod error;
pub mod exclusion;
pub mod extract;
pub mod history;
pub mod monitor;
pub mod probe;
pub mod report;

pub use archive::ArchiveResolver;
pub use config::{ArchiveConfig, MonitorConfig};
pub use error::{Error, ErrorKind, Result};
pub use exclusion::ExclusionFilter;
pub use history::{HistoryPolicy, HistoryStore, LinkHistoryRecord, Observation};
pub use monitor::{CandidateLink, Monitor, RunSummary};
pub use probe::{CheckResult, LinkProbe, ProbeConfig, Prober};
pub use report::{JsonLinesSink, ReportSink, ReportableEvent};
