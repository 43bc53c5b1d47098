//! Connectivity prober: one URL in, one classified `CheckResult` out
//!
//! Redirects are followed by hand so the chain can be inspected. A HEAD
//! request is tried first; servers that answer HEAD with garbage, 405/501,
//! or a redirect loop get a second full resolution with GET from the
//! original URL before anything is classified as failed.

use crate::config::MonitorConfig;
use crate::error::{ErrorKind, Result};
use reqwest::header::LOCATION;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Classified failure attached to a dead result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckError {
    pub kind: ErrorKind,
    pub message: String,
}

/// Outcome of probing one URL
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub url: String,
    pub alive: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub status_summary: String,
    /// Redirect targets in the order they were followed
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub redirect_chain: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<CheckError>,
}

impl CheckResult {
    pub fn alive(url: &str, status: StatusCode, redirect_chain: Vec<String>) -> Self {
        Self {
            url: url.to_string(),
            alive: true,
            status: Some(status.as_u16()),
            status_summary: status_summary(status),
            redirect_chain,
            error: None,
        }
    }

    pub fn dead(
        url: &str,
        kind: ErrorKind,
        message: impl Into<String>,
        status: Option<u16>,
        redirect_chain: Vec<String>,
    ) -> Self {
        let message = message.into();
        Self {
            url: url.to_string(),
            alive: false,
            status,
            status_summary: message.clone(),
            redirect_chain,
            error: Some(CheckError { kind, message }),
        }
    }

    /// A candidate skipped by an exclusion rule, never sent over the wire
    pub fn excluded(url: &str, rule: &str) -> Self {
        Self::dead(
            url,
            ErrorKind::Excluded,
            format!("Excluded by rule {}", rule),
            None,
            Vec::new(),
        )
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    /// Where the chain ended, or the URL itself without redirects
    pub fn final_url(&self) -> &str {
        self.redirect_chain.last().map(String::as_str).unwrap_or(&self.url)
    }
}

/// Anything that can check a URL. The controller is generic over this.
pub trait LinkProbe: Send + Sync + 'static {
    fn check(&self, url: &str) -> impl Future<Output = CheckResult> + Send;
}

/// Prober settings
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub hop_limit: usize,
    pub ignored_status_codes: BTreeSet<u16>,
    pub timeout: Duration,
    pub user_agent: String,
}

impl From<&MonitorConfig> for ProbeConfig {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            hop_limit: config.redirect_hop_limit,
            ignored_status_codes: config.ignored_status_codes.clone(),
            timeout: config.request_timeout(),
            user_agent: config.user_agent.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Method {
    Head,
    Get,
}

/// Where one pass of redirect resolution ended
enum Resolution {
    Response {
        status: StatusCode,
        chain: Vec<String>,
    },
    Failed {
        kind: ErrorKind,
        message: String,
        chain: Vec<String>,
    },
    /// HEAD was mishandled; start over with GET
    RetryWithGet(String),
}

/// HTTP prober with manual redirect handling
pub struct Prober {
    client: Client,
    config: ProbeConfig,
}

impl Prober {
    pub fn new(config: ProbeConfig) -> Result<Self> {
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { client, config })
    }

    /// Check a URL. Never fails; every outcome is classified.
    pub async fn check_url(&self, url: &str) -> CheckResult {
        let start = match Url::parse(url) {
            Ok(u) => u,
            Err(e) => {
                return CheckResult::dead(
                    url,
                    ErrorKind::Encoding,
                    format!("Invalid URL: {}", e),
                    None,
                    vec![],
                )
            }
        };

        if !matches!(start.scheme(), "http" | "https") {
            return CheckResult::dead(
                url,
                ErrorKind::Protocol,
                format!("Unsupported scheme: {}", start.scheme()),
                None,
                vec![],
            );
        }

        let resolution = match self.resolve(&start, Method::Head).await {
            Resolution::RetryWithGet(reason) => {
                debug!(url, reason = %reason, "HEAD mishandled, retrying with GET");
                self.resolve(&start, Method::Get).await
            }
            other => other,
        };

        match resolution {
            Resolution::Response { status, chain } => self.classify_status(url, status, chain),
            Resolution::Failed {
                kind,
                message,
                chain,
            } => CheckResult::dead(url, kind, message, None, chain),
            // resolve() only asks for a retry while on HEAD
            Resolution::RetryWithGet(reason) => {
                CheckResult::dead(url, ErrorKind::Protocol, reason, None, vec![])
            }
        }
    }

    async fn resolve(&self, start: &Url, method: Method) -> Resolution {
        let mut current = start.clone();
        let mut chain: Vec<String> = Vec::new();

        loop {
            let request = match method {
                Method::Head => self.client.head(current.clone()),
                Method::Get => self.client.get(current.clone()),
            };

            let response = match request.send().await {
                Ok(r) => r,
                Err(e) => {
                    let kind = classify_transport_error(&e);
                    if kind == ErrorKind::Protocol && method == Method::Head {
                        return Resolution::RetryWithGet(e.to_string());
                    }
                    return Resolution::Failed {
                        kind,
                        message: describe_transport_error(kind, &e),
                        chain,
                    };
                }
            };

            let status = response.status();
            if method == Method::Head
                && matches!(
                    status,
                    StatusCode::METHOD_NOT_ALLOWED | StatusCode::NOT_IMPLEMENTED
                )
            {
                return Resolution::RetryWithGet(format!("HEAD answered {}", status));
            }

            if !status.is_redirection() {
                return Resolution::Response { status, chain };
            }

            let Some(location) = response.headers().get(LOCATION) else {
                return Resolution::Response { status, chain };
            };

            let location = match std::str::from_utf8(location.as_bytes()) {
                Ok(l) => l.trim(),
                Err(_) => {
                    return Resolution::Failed {
                        kind: ErrorKind::Encoding,
                        message: "Redirect target is not valid UTF-8".to_string(),
                        chain,
                    }
                }
            };

            let Some(next) = resolve_redirect_target(&current, location) else {
                return Resolution::Failed {
                    kind: ErrorKind::Protocol,
                    message: format!("Invalid redirect target: {}", location),
                    chain,
                };
            };

            let next_str = next.to_string();
            let revisited = next_str == start.as_str() || chain.contains(&next_str);
            chain.push(next_str);

            if revisited {
                if method == Method::Head {
                    return Resolution::RetryWithGet("redirect loop on HEAD".to_string());
                }
                return Resolution::Failed {
                    kind: ErrorKind::RedirectLoop,
                    message: format!("Redirect loop: {}", chain.join(" -> ")),
                    chain,
                };
            }

            if chain.len() > self.config.hop_limit {
                if method == Method::Head {
                    return Resolution::RetryWithGet("redirect chain too long on HEAD".to_string());
                }
                return Resolution::Failed {
                    kind: ErrorKind::RedirectChainTooLong,
                    message: format!(
                        "Redirect chain exceeds {} hops",
                        self.config.hop_limit
                    ),
                    chain,
                };
            }

            current = next;
        }
    }

    fn classify_status(&self, url: &str, status: StatusCode, chain: Vec<String>) -> CheckResult {
        let code = status.as_u16();
        if status.is_client_error() {
            CheckResult::dead(
                url,
                ErrorKind::HttpClientError,
                status_summary(status),
                Some(code),
                chain,
            )
        } else if self.config.ignored_status_codes.contains(&code) {
            CheckResult::dead(
                url,
                ErrorKind::HttpStatus,
                status_summary(status),
                Some(code),
                chain,
            )
        } else {
            CheckResult::alive(url, status, chain)
        }
    }
}

impl LinkProbe for Prober {
    async fn check(&self, url: &str) -> CheckResult {
        self.check_url(url).await
    }
}

fn status_summary(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {}", status.as_u16(), reason),
        None => status.as_u16().to_string(),
    }
}

/// Resolve a `Location` header value against the URL that produced it.
///
/// Absolute targets are taken as-is. Targets led by `./` or `../` start from
/// the directory of `current`, dropping one segment per `../` without going
/// above the root. Everything else (root-relative, scheme-relative, bare
/// file names, query-only and fragment-only) follows RFC 3986 via `Url::join`.
pub fn resolve_redirect_target(current: &Url, location: &str) -> Option<Url> {
    let location = location.trim();
    if location.is_empty() {
        return None;
    }

    match Url::parse(location) {
        Ok(url) => return Some(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => {}
        Err(_) => return None,
    }

    let dot_led = location == "."
        || location == ".."
        || location.starts_with("./")
        || location.starts_with("../");
    if !dot_led {
        return current.join(location).ok();
    }

    let mut directory: Vec<&str> = current
        .path_segments()
        .map(|segments| segments.collect())
        .unwrap_or_default();
    directory.pop();

    let mut rest = location;
    loop {
        if let Some(r) = rest.strip_prefix("../") {
            directory.pop();
            rest = r;
        } else if let Some(r) = rest.strip_prefix("./") {
            rest = r;
        } else if rest == ".." {
            directory.pop();
            rest = "";
        } else if rest == "." {
            rest = "";
        } else {
            break;
        }
    }

    let mut path = String::from("/");
    for segment in directory {
        path.push_str(segment);
        path.push('/');
    }
    path.push_str(rest);

    current.join(&path).ok()
}

/// Map a reqwest failure onto the error taxonomy
fn classify_transport_error(err: &reqwest::Error) -> ErrorKind {
    if err.is_timeout() || err.is_connect() {
        return ErrorKind::Network;
    }
    if err.is_builder() {
        return ErrorKind::Encoding;
    }
    if err.is_decode() || err.is_body() {
        return ErrorKind::Protocol;
    }

    // hyper reports malformed status lines and headers as parse errors
    let mut source = std::error::Error::source(err);
    while let Some(e) = source {
        let text = e.to_string().to_ascii_lowercase();
        if text.contains("parse")
            || text.contains("invalid")
            || text.contains("closed before message completed")
        {
            return ErrorKind::Protocol;
        }
        source = e.source();
    }
    ErrorKind::Network
}

fn describe_transport_error(kind: ErrorKind, err: &reqwest::Error) -> String {
    if err.is_timeout() {
        return "Request timed out".to_string();
    }
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(e) = source {
        message.push_str(": ");
        message.push_str(&e.to_string());
        source = e.source();
    }
    match kind {
        ErrorKind::Protocol => format!("Malformed response: {}", message),
        _ => message,
    }
}
