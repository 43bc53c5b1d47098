//! Exclusion filter: ordered skip rules over candidate URLs
//!
//! Rules are configuration data, loaded once from a versioned YAML document:
//!
//! ```yaml
//! version: 1
//! rules:
//!   - host:example.org          # host or any subdomain
//!   - path:/w/index.php         # path prefix on any host
//!   - glob:*.archive.org/web/*  # wildcard over the full URL
//!   - re:^https?://[^/]*\.local # regex over the full URL
//! ```
//!
//! A rule without a prefix is a regex. First match wins.

use crate::error::{Error, Result};
use regex::Regex;
use serde::Deserialize;
use std::path::Path;

const RULES_VERSION: u32 = 1;

/// Scheme, optional userinfo, then the host
const URL_PREFIX: &str = r"^[a-zA-Z][a-zA-Z0-9+.\-]*://(?:[^/?#@]*@)?";

#[derive(Debug, Deserialize)]
struct RulesFile {
    version: u32,
    #[serde(default)]
    rules: Vec<String>,
}

/// A single compiled rule
#[derive(Debug, Clone)]
pub struct ExclusionRule {
    source: String,
    regex: Regex,
}

impl ExclusionRule {
    /// Compile a rule string. `index` only feeds the error message.
    pub fn parse(index: usize, rule: &str) -> Result<Self> {
        let rule = rule.trim();
        let pattern = if let Some(host) = rule.strip_prefix("host:") {
            host_pattern(host)
        } else if let Some(prefix) = rule.strip_prefix("path:") {
            path_pattern(prefix)
        } else if let Some(glob) = rule.strip_prefix("glob:") {
            glob_pattern(glob)
        } else if let Some(re) = rule.strip_prefix("re:") {
            re.to_string()
        } else {
            rule.to_string()
        };

        let regex = Regex::new(&pattern).map_err(|source| Error::InvalidRule {
            index,
            rule: rule.to_string(),
            source,
        })?;

        Ok(Self {
            source: rule.to_string(),
            regex,
        })
    }

    /// The rule as written in configuration
    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, url: &str) -> bool {
        self.regex.is_match(url)
    }
}

fn host_pattern(host: &str) -> String {
    let host = host.trim().trim_start_matches("*.").trim_end_matches('/');
    format!(
        r"(?i){}(?:[^/?#:]*\.)?{}(?::\d+)?(?:[/?#]|$)",
        URL_PREFIX,
        regex::escape(host)
    )
}

fn path_pattern(prefix: &str) -> String {
    format!(r"{}[^/?#]*{}", URL_PREFIX, regex::escape(prefix.trim()))
}

fn glob_pattern(glob: &str) -> String {
    let escaped = regex::escape(glob.trim())
        .replace(r"\*", ".*")
        .replace(r"\?", ".");
    format!("(?i)^{}$", escaped)
}

/// Ordered, immutable set of skip rules
#[derive(Debug, Clone, Default)]
pub struct ExclusionFilter {
    rules: Vec<ExclusionRule>,
}

impl ExclusionFilter {
    pub fn new<S: AsRef<str>>(rules: &[S]) -> Result<Self> {
        let rules = rules
            .iter()
            .enumerate()
            .map(|(i, r)| ExclusionRule::parse(i, r.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// Parse a versioned rules document
    pub fn from_yaml_str(content: &str, origin: &Path) -> Result<Self> {
        let file: RulesFile =
            serde_yaml::from_str(content).map_err(|source| Error::ConfigParse {
                path: origin.to_path_buf(),
                source,
            })?;
        if file.version != RULES_VERSION {
            return Err(Error::RulesVersion(file.version));
        }
        Self::new(file.rules.as_slice())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| Error::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&content, path)
    }

    /// First rule matching `url`, if any
    pub fn first_match(&self, url: &str) -> Option<&ExclusionRule> {
        self.rules.iter().find(|r| r.is_match(url))
    }

    pub fn should_skip(&self, url: &str) -> bool {
        self.first_match(url).is_some()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
