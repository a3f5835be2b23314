use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

/// Normalize a URL for equality/dedup purposes: lowercase scheme+host, strip
/// the default port for that scheme, drop the fragment, strip a trailing
/// slash from non-root paths.
pub fn normalize_url(url: &Url) -> String {
    let mut normalized = url.clone();
    let _ = normalized.set_scheme(&url.scheme().to_lowercase());
    if let Some(host) = url.host_str() {
        let _ = normalized.set_host(Some(&host.to_lowercase()));
    }
    normalized.set_fragment(None);

    let default_port = match normalized.scheme() {
        "http" => Some(80),
        "https" => Some(443),
        _ => None,
    };
    if normalized.port() == default_port {
        let _ = normalized.set_port(None);
    }

    let path = normalized.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        normalized.set_path(&path[..path.len() - 1]);
    }

    normalized.to_string()
}

/// Case-insensitive host component of a URL.
pub fn domain_of(url: &Url) -> String {
    url.host_str().unwrap_or("").to_lowercase()
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub timeout: Duration,
    pub max_body_size: usize,
    pub follow_redirects: bool,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_body_size: 500_000,
            follow_redirects: true,
            user_agent: "Mozilla/5.0 (compatible; WebSearchBot/1.0)".to_string(),
        }
    }
}

/// Outcome of one fetch. A non-2xx status is not an error — it carries no
/// content and the pipeline proceeds with an empty page record.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub url: Url,
    pub final_url: Url,
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    pub fetched_at: chrono::DateTime<chrono::Utc>,
    pub response_time_ms: u64,
}

impl FetchResponse {
    pub fn has_content(&self) -> bool {
        (200..300).contains(&self.status) && !self.body.is_empty()
    }
}

/// What the parser extracts from one page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageRecord {
    pub title: String,
    pub meta_description: String,
    pub headers: Vec<String>,
    pub body_text: String,
    pub raw_html: String,
}

impl PageRecord {
    pub fn empty() -> Self {
        Self {
            title: "Untitled".to_string(),
            meta_description: String::new(),
            headers: Vec::new(),
            body_text: String::new(),
            raw_html: String::new(),
        }
    }
}

/// A single occurrence of the query in a page's body text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Match {
    pub position: usize,
    pub context: String,
    pub local_score: f64,
}

/// One per URL that had at least one match, ready to be ranked and returned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    pub url: String,
    pub title: String,
    pub context: String,
    pub count: usize,
    pub relevance: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SearchStatus {
    Waiting,
    Searching,
    Completed,
    Error,
}

impl SearchStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, SearchStatus::Completed | SearchStatus::Error)
    }
}

/// Per-search progress record. `start_time`/`last_update` are Unix seconds
/// (not monotonic `Instant`s) so the record can round-trip through the
/// backing store between processes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchState {
    pub total_urls: usize,
    pub processed_urls: usize,
    pub found_results: usize,
    pub status: SearchStatus,
    pub start_time: f64,
    pub last_update: f64,
    pub error: Option<String>,
}

impl SearchState {
    pub fn new(now: f64) -> Self {
        Self {
            total_urls: 0,
            processed_urls: 0,
            found_results: 0,
            status: SearchStatus::Waiting,
            start_time: now,
            last_update: now,
            error: None,
        }
    }

    pub fn progress_pct(&self) -> f64 {
        if self.total_urls == 0 {
            0.0
        } else {
            (self.processed_urls as f64 / self.total_urls as f64) * 100.0
        }
    }

    pub fn elapsed_s(&self, now: f64) -> f64 {
        now - self.start_time
    }
}

/// A cached `(url, query)` lookup outcome. `None` is a legitimate cached
/// "no match" result, distinct from the key being entirely absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub value: Option<SearchResult>,
}

/// Per-domain token bucket state.
#[derive(Debug, Clone, Copy)]
pub struct Bucket {
    pub tokens: f64,
    pub burst: f64,
}

impl Bucket {
    pub fn full(burst: f64) -> Self {
        Self { tokens: burst, burst }
    }

    pub fn refill(&mut self, elapsed_secs: f64, rate: f64) {
        self.tokens = (self.tokens + elapsed_secs * rate).min(self.burst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_default_port_and_fragment() {
        let a = Url::parse("https://Example.test:443/path/#frag").unwrap();
        let b = Url::parse("https://example.test/path").unwrap();
        assert_eq!(normalize_url(&a), normalize_url(&b));
    }

    #[test]
    fn normalize_strips_trailing_slash_but_keeps_root() {
        let a = Url::parse("https://example.test/path/").unwrap();
        let b = Url::parse("https://example.test/path").unwrap();
        assert_eq!(normalize_url(&a), normalize_url(&b));

        let root = Url::parse("https://example.test/").unwrap();
        assert_eq!(normalize_url(&root), "https://example.test/");
    }

    #[test]
    fn normalize_keeps_non_default_port() {
        let a = Url::parse("https://example.test:8443/").unwrap();
        assert!(normalize_url(&a).contains(":8443"));
    }

    #[test]
    fn search_state_progress_is_zero_when_total_unset() {
        let state = SearchState::new(0.0);
        assert_eq!(state.progress_pct(), 0.0);
    }

    #[test]
    fn search_state_progress_reflects_processed_ratio() {
        let mut state = SearchState::new(0.0);
        state.total_urls = 4;
        state.processed_urls = 1;
        assert_eq!(state.progress_pct(), 25.0);
    }

    #[test]
    fn bucket_refill_caps_at_burst() {
        let mut bucket = Bucket::full(5.0);
        bucket.tokens = 1.0;
        bucket.refill(100.0, 2.0);
        assert_eq!(bucket.tokens, 5.0);
    }
}
