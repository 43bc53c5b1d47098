//! Error types
//!
//! `ErrorKind` classifies per-URL check failures; it never propagates as an
//! `Err`. `Error` covers the fallible library operations around a run
//! (configuration, exclusion rules, history persistence).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Classification of a failed (or skipped) link check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// DNS, connect, TLS or timeout failure
    Network,
    /// Malformed response or unsupported scheme
    Protocol,
    /// URL or redirect target could not be encoded for the request line
    Encoding,
    /// Redirect target already visited in this chain
    RedirectLoop,
    /// Redirect chain longer than the hop limit
    RedirectChainTooLong,
    /// 4xx response
    HttpClientError,
    /// Response status configured as dead
    HttpStatus,
    /// Filtered by an exclusion rule, not a failure
    Excluded,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Network => write!(f, "network"),
            ErrorKind::Protocol => write!(f, "protocol"),
            ErrorKind::Encoding => write!(f, "encoding"),
            ErrorKind::RedirectLoop => write!(f, "redirect_loop"),
            ErrorKind::RedirectChainTooLong => write!(f, "redirect_chain_too_long"),
            ErrorKind::HttpClientError => write!(f, "http_client_error"),
            ErrorKind::HttpStatus => write!(f, "http_status"),
            ErrorKind::Excluded => write!(f, "excluded"),
        }
    }
}

/// Errors from configuration, rule compilation and history persistence
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration in {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid exclusion rule #{index} `{rule}`: {source}")]
    InvalidRule {
        index: usize,
        rule: String,
        #[source]
        source: regex::Error,
    },

    #[error("unsupported exclusion rules version {0} (expected 1)")]
    RulesVersion(u32),

    #[error("failed to serialize history: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
