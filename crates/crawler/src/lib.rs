use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use url::Url;

use websearch_client::HttpClientPool;
use websearch_core::{domain_of, normalize_url, FetchConfig};
use websearch_parser::Parser;
use websearch_ratelimit::RateLimiter;

/// Per-request timeout used by the crawler's own fetches — distinct from
/// (and shorter than) the pool's general-purpose default.
const CRAWL_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Rate-limited access to one URL's body. Kept as a trait so the crawler
/// (and the orchestrator above it) can be exercised against a fake in tests
/// without a real socket or a running rate limiter.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Returns `None` on a non-2xx status or transport failure.
    async fn fetch(&self, url: &Url) -> Option<Vec<u8>>;
}

/// Production `Fetcher`: acquires a rate-limit token, issues the GET through
/// the shared pool, and releases the token exactly once regardless of outcome.
/// Holds `Arc`s rather than borrows so one fetcher can be shared across the
/// spawned tasks of a long-lived server process.
pub struct PoolFetcher {
    client: Arc<HttpClientPool>,
    limiter: Arc<RateLimiter>,
}

impl PoolFetcher {
    pub fn new(client: Arc<HttpClientPool>, limiter: Arc<RateLimiter>) -> Self {
        Self { client, limiter }
    }
}

#[async_trait]
impl Fetcher for PoolFetcher {
    async fn fetch(&self, url: &Url) -> Option<Vec<u8>> {
        let domain = domain_of(url);
        self.limiter.acquire(&domain).await;

        let config = FetchConfig {
            timeout: CRAWL_FETCH_TIMEOUT,
            ..self.client.default_config()
        };
        let result = self.client.get(url, &config).await;
        self.limiter.release(&domain).await;

        match result {
            Ok(resp) if resp.has_content() => {
                debug!(url = %url, status = resp.status, "fetched");
                Some(resp.body)
            }
            Ok(resp) => {
                debug!(url = %url, status = resp.status, "no content");
                None
            }
            Err(err) => {
                debug!(url = %url, error = %err, "fetch failed");
                None
            }
        }
    }
}

/// Bounded, domain-scoped BFS discovery. One `Crawler` call owns no state
/// across invocations — `discover` builds its own pending/visited sets, so
/// concurrent calls never interfere.
pub struct Crawler<'a, F: Fetcher> {
    fetcher: &'a F,
    parser: &'a Parser,
}

impl<'a, F: Fetcher> Crawler<'a, F> {
    pub fn new(fetcher: &'a F, parser: &'a Parser) -> Self {
        Self { fetcher, parser }
    }

    /// Discover up to `max_pages` same-domain URLs reachable from `seed`.
    pub async fn discover(&self, seed: &Url, max_pages: usize) -> HashSet<Url> {
        let domain = domain_of(seed);
        let mut pending: VecDeque<Url> = VecDeque::from([seed.clone()]);
        let mut visited_keys: HashSet<String> = HashSet::new();
        let mut visited: HashSet<Url> = HashSet::new();

        while let Some(url) = pending.pop_front() {
            if visited.len() >= max_pages {
                break;
            }
            let key = normalize_url(&url);
            if visited_keys.contains(&key) {
                continue;
            }
            visited_keys.insert(key);
            visited.insert(url.clone());

            if let Some(body) = self.fetcher.fetch(&url).await {
                for link in self.parser.links(&body, &url) {
                    if domain_of(&link) != domain {
                        continue;
                    }
                    let link_key = normalize_url(&link);
                    if !visited_keys.contains(&link_key) {
                        pending.push_back(link);
                    }
                }
            }
        }

        visited
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct FakeFetcher {
        pages: HashMap<String, Vec<u8>>,
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl Fetcher for FakeFetcher {
        async fn fetch(&self, url: &Url) -> Option<Vec<u8>> {
            *self.calls.lock().unwrap() += 1;
            self.pages.get(url.as_str()).cloned()
        }
    }

    #[test]
    fn fetch_timeout_is_shorter_than_pool_default() {
        assert!(CRAWL_FETCH_TIMEOUT < FetchConfig::default().timeout);
    }

    #[tokio::test]
    async fn discover_stays_within_domain_and_respects_max_pages() {
        let mut pages = HashMap::new();
        pages.insert(
            "https://ex.test/".to_string(),
            br#"<a href="/a">a</a><a href="https://other.test/b">b</a>"#.to_vec(),
        );
        pages.insert(
            "https://ex.test/a".to_string(),
            br#"<a href="/c">c</a>"#.to_vec(),
        );
        pages.insert("https://ex.test/c".to_string(), b"no links".to_vec());

        let fetcher = FakeFetcher {
            pages,
            calls: Mutex::new(0),
        };
        let parser = Parser::new();
        let crawler = Crawler::new(&fetcher, &parser);

        let seed = Url::parse("https://ex.test/").unwrap();
        let visited = crawler.discover(&seed, 10).await;

        assert!(visited.iter().all(|u| domain_of(u) == "ex.test"));
        assert!(visited.len() <= 3);
        assert!(visited.iter().any(|u| u.as_str() == "https://ex.test/"));
    }

    #[tokio::test]
    async fn discover_caps_visited_set_at_max_pages() {
        let mut pages = HashMap::new();
        pages.insert(
            "https://ex.test/".to_string(),
            br#"<a href="/a">a</a><a href="/b">b</a><a href="/c">c</a>"#.to_vec(),
        );
        for p in ["a", "b", "c"] {
            pages.insert(format!("https://ex.test/{p}"), b"leaf".to_vec());
        }

        let fetcher = FakeFetcher {
            pages,
            calls: Mutex::new(0),
        };
        let parser = Parser::new();
        let crawler = Crawler::new(&fetcher, &parser);

        let seed = Url::parse("https://ex.test/").unwrap();
        let visited = crawler.discover(&seed, 2).await;
        assert_eq!(visited.len(), 2);
    }
}
