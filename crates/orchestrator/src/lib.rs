pub mod progress;
pub mod results;

use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;

use websearch_cache::Cache;
use websearch_core::{normalize_url, CrawlError, PageRecord, SearchResult};
use websearch_crawler::{Crawler, Fetcher};
use websearch_matcher::{rank_page, rank_results};
use websearch_parser::Parser;
use websearch_state::StateStore;

pub use results::ResultStore;

/// Wires the crawler, parser, matcher/ranker, cache, and state tracker into
/// the pipeline for one search (spec §4.8). Every field is `Arc`-owned so an
/// `Orchestrator` can be cheaply cloned into a spawned task — `search()`
/// itself owns no state across calls.
pub struct Orchestrator<F: Fetcher> {
    fetcher: Arc<F>,
    parser: Arc<Parser>,
    cache: Arc<Cache>,
    state: Arc<StateStore>,
    results: Arc<ResultStore>,
    concurrency: usize,
}

impl<F: Fetcher> Clone for Orchestrator<F> {
    fn clone(&self) -> Self {
        Self {
            fetcher: Arc::clone(&self.fetcher),
            parser: Arc::clone(&self.parser),
            cache: Arc::clone(&self.cache),
            state: Arc::clone(&self.state),
            results: Arc::clone(&self.results),
            concurrency: self.concurrency,
        }
    }
}

impl<F: Fetcher> Orchestrator<F> {
    pub fn new(
        fetcher: Arc<F>,
        parser: Arc<Parser>,
        cache: Arc<Cache>,
        state: Arc<StateStore>,
        results: Arc<ResultStore>,
        concurrency: usize,
    ) -> Self {
        Self {
            fetcher,
            parser,
            cache,
            state,
            results,
            concurrency: concurrency.max(1),
        }
    }

    /// Run one search to completion: discover, fetch/parse/match/rank
    /// concurrently, publish progress as it goes, and return ranked results.
    ///
    /// Per spec §4.8 step 5: any error bubbling out of discovery or the fan-out
    /// transitions the search to `error` and is re-raised; per-URL errors never
    /// escape `process_url`.
    pub async fn search(
        &self,
        id: &str,
        seed: &Url,
        query: &str,
        max_pages: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchResult>, CrawlError> {
        self.state.init_search(id).await?;

        match self.run(id, seed, query, max_pages, cancel).await {
            Ok(results) => Ok(results),
            Err(err) => {
                if let Err(fail_err) = self.state.fail(id, &err.to_string()).await {
                    warn!(search_id = id, error = %fail_err, "failed to record search failure");
                }
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        id: &str,
        seed: &Url,
        query: &str,
        max_pages: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchResult>, CrawlError> {
        let crawler = Crawler::new(self.fetcher.as_ref(), self.parser.as_ref());
        let urls = tokio::select! {
            urls = crawler.discover(seed, max_pages) => urls,
            _ = cancel.cancelled() => return Err(CrawlError::Other(anyhow::anyhow!("search cancelled"))),
        };
        info!(search_id = id, count = urls.len(), "discovery complete");
        self.state.set_total(id, urls.len()).await?;

        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut pending = FuturesUnordered::new();
        for url in urls {
            let permits = Arc::clone(&permits);
            pending.push(async move {
                let _permit = permits.acquire_owned().await.ok();
                self.process_url(id, url, query).await
            });
        }

        let mut results = Vec::new();
        loop {
            tokio::select! {
                next = pending.next() => {
                    match next {
                        Some(Some(result)) => results.push(result),
                        Some(None) => {}
                        None => break,
                    }
                }
                _ = cancel.cancelled() => {
                    return Err(CrawlError::Other(anyhow::anyhow!("search cancelled")));
                }
            }
        }

        let ranked = rank_results(results);
        self.results.store(id, ranked.clone());
        self.state.complete(id).await?;
        Ok(ranked)
    }

    /// Cache lookup (including a cached "no match"), else
    /// fetch → parse → match/rank → cache store. Always bumps `processed`;
    /// bumps `found` only when a `SearchResult` is produced.
    async fn process_url(&self, id: &str, url: Url, query: &str) -> Option<SearchResult> {
        let key = normalize_url(&url);

        let result = match self.cache.get(&key, query).await {
            websearch_cache::CacheLookup::Hit(value) => value,
            websearch_cache::CacheLookup::Miss => {
                let record = self
                    .fetcher
                    .fetch(&url)
                    .await
                    .and_then(|body| self.parser.parse(&body))
                    .unwrap_or_else(PageRecord::empty);

                let result = rank_page(
                    &key,
                    &record.title,
                    &record.meta_description,
                    &record.headers,
                    &record.body_text,
                    query,
                );
                self.cache.put(&key, query, &result).await;
                result
            }
        };

        if let Err(err) = self.state.inc_processed(id).await {
            warn!(search_id = id, url = %url, error = %err, "failed to record processed URL");
        }
        if result.is_some() {
            if let Err(err) = self.state.inc_found(id).await {
                warn!(search_id = id, url = %url, error = %err, "failed to record found result");
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct FakeFetcher {
        pages: HashMap<String, Vec<u8>>,
    }

    #[async_trait]
    impl Fetcher for FakeFetcher {
        async fn fetch(&self, url: &Url) -> Option<Vec<u8>> {
            self.pages.get(url.as_str()).cloned()
        }
    }

    #[test]
    fn concurrency_is_never_zero() {
        // Guards the `.max(1)` clamp in `new` — a zero-width semaphore would
        // deadlock every `process_url` call forever.
        let permits = Semaphore::new(0usize.max(1));
        assert_eq!(permits.available_permits(), 1);
    }

    #[tokio::test]
    async fn fake_fetcher_returns_none_for_unknown_url() {
        let fetcher = FakeFetcher {
            pages: HashMap::new(),
        };
        let url = Url::parse("https://ex.test/").unwrap();
        assert!(fetcher.fetch(&url).await.is_none());
    }
}
