pub mod search;
pub mod serve;

use std::sync::Arc;

use websearch_cache::Cache;
use websearch_client::HttpClientPool;
use websearch_core::AppConfig;
use websearch_crawler::PoolFetcher;
use websearch_orchestrator::{Orchestrator, ResultStore};
use websearch_parser::Parser;
use websearch_ratelimit::RateLimiter;
use websearch_state::StateStore;

/// Everything a search needs, built once from config and shared across every
/// `search_id` — the process-wide singletons of spec.md §9.
pub struct Pipeline {
    pub orchestrator: Orchestrator<PoolFetcher>,
    pub cache: Arc<Cache>,
    pub state: Arc<StateStore>,
    pub results: Arc<ResultStore>,
    pub config: AppConfig,
}

impl Pipeline {
    pub async fn connect(config: AppConfig) -> anyhow::Result<Self> {
        let client = Arc::new(HttpClientPool::new(
            config.general.max_connections,
            "Mozilla/5.0 (compatible; WebSearchBot/1.0)",
            std::time::Duration::from_secs(config.general.request_timeout_secs),
            config.general.max_content_size,
        )?);
        let limiter = Arc::new(RateLimiter::new(
            config.rate_limit.requests_per_second,
            config.rate_limit.burst,
        ));
        let fetcher = Arc::new(PoolFetcher::new(client, limiter));
        let parser = Arc::new(Parser::new());
        let cache = Arc::new(
            Cache::connect_with_ttl(&config.redis.url(), config.general.cache_ttl_secs).await?,
        );
        let state = Arc::new(
            StateStore::connect_with_ttl(&config.redis.url(), config.general.state_ttl_secs).await?,
        );
        let results = Arc::new(ResultStore::new());

        let orchestrator = Orchestrator::new(
            fetcher,
            parser,
            Arc::clone(&cache),
            Arc::clone(&state),
            Arc::clone(&results),
            config.general.concurrency,
        );

        Ok(Self {
            orchestrator,
            cache,
            state,
            results,
            config,
        })
    }
}
