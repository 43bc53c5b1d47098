//! Candidate URL extraction from plain-text documents
//!
//! Deliberately simple: absolute http(s) URLs, trailing punctuation trimmed,
//! deduplicated per document. Markup-aware extraction belongs to the caller.

use crate::monitor::CandidateLink;
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s\)>\]\|\}"'`<]+"#).expect("valid URL pattern"));

/// Extract unique URLs from text content, in order of first appearance
pub fn extract_urls(content: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut urls = Vec::new();

    for mat in URL_RE.find_iter(content) {
        // Clean trailing punctuation
        let url = mat
            .as_str()
            .trim_end_matches(|c| matches!(c, ',' | '.' | ')' | ']' | ';' | ':' | '!' | '?'));

        if seen.insert(url.to_string()) {
            urls.push(url.to_string());
        }
    }

    urls
}

/// Candidate links for every URL in `content`, attributed to `document`
pub fn candidates(document: &str, content: &str) -> Vec<CandidateLink> {
    extract_urls(content)
        .into_iter()
        .map(|url| CandidateLink::new(url, document))
        .collect()
}
