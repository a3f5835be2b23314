use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use tracing::{debug, warn};
use url::Url;

use websearch_core::{CrawlError, FetchConfig, FetchResponse};

/// A single shared, long-lived HTTP client. Construct one per process and
/// hand out `&HttpClientPool` references — `reqwest::Client` is internally
/// connection-pooled and safe to share across tasks without extra locking.
pub struct HttpClientPool {
    client: reqwest::Client,
    default_config: FetchConfig,
}

impl HttpClientPool {
    /// `default_timeout`/`max_body_size` become the pool's `default_config()`
    /// — the general-purpose timeout and size cap from §6's config table.
    /// Callers with a stricter per-call budget (e.g. the crawler's 10s fetch
    /// timeout) build their own `FetchConfig` instead of using the default.
    pub fn new(
        max_connections: usize,
        user_agent: &str,
        default_timeout: Duration,
        max_body_size: usize,
    ) -> Result<Self, CrawlError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(user_agent)
            .pool_max_idle_per_host(max_connections)
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .map_err(|e| CrawlError::Network(e.to_string()))?;

        let default_config = FetchConfig {
            timeout: default_timeout,
            max_body_size,
            user_agent: user_agent.to_string(),
            ..FetchConfig::default()
        };

        Ok(Self { client, default_config })
    }

    /// The pool-level default fetch budget, built from config at construction.
    /// Crawler fetches override `timeout` with their own tighter deadline.
    pub fn default_config(&self) -> FetchConfig {
        self.default_config.clone()
    }

    /// Fetch an absolute URL. A non-2xx response is a normal outcome (empty
    /// body, `status` set) rather than an `Err` — only transport-level
    /// failures (connect/read/TLS/timeout) surface as `CrawlError::Network`
    /// or `CrawlError::Timeout`.
    pub async fn get(&self, url: &Url, config: &FetchConfig) -> Result<FetchResponse, CrawlError> {
        let start = Instant::now();
        debug!(url = %url, "fetching");

        let resp = self
            .client
            .get(url.as_str())
            .timeout(config.timeout)
            .send()
            .await
            .map_err(|e| {
                warn!(url = %url, error = %e, "fetch failed");
                if e.is_timeout() {
                    CrawlError::Timeout(config.timeout.as_secs())
                } else {
                    CrawlError::Network(e.to_string())
                }
            })?;

        let status = resp.status().as_u16();
        let final_url = resp.url().clone();

        let mut headers = std::collections::HashMap::new();
        for (k, v) in resp.headers() {
            if let Ok(val) = v.to_str() {
                headers.insert(k.as_str().to_string(), val.to_string());
            }
        }
        let content_type = headers.get("content-type").cloned();

        let body = if (200..300).contains(&status) {
            resp.bytes()
                .await
                .map_err(|e| CrawlError::Network(e.to_string()))?
        } else {
            // Non-2xx: drain nothing, proceed with an empty body per §4.1.
            Default::default()
        };

        if body.len() > config.max_body_size {
            return Err(CrawlError::BodyTooLarge {
                size: body.len(),
                max: config.max_body_size,
            });
        }

        Ok(FetchResponse {
            url: url.clone(),
            final_url,
            status,
            headers,
            body: body.to_vec(),
            content_type,
            fetched_at: chrono::Utc::now(),
            response_time_ms: start.elapsed().as_millis() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_construction_succeeds_with_sane_defaults() {
        let pool = HttpClientPool::new(
            100,
            "Mozilla/5.0 (compatible; WebSearchBot/1.0)",
            Duration::from_secs(30),
            500_000,
        );
        assert!(pool.is_ok());
    }

    #[test]
    fn default_config_carries_the_configured_timeout_and_body_cap() {
        let pool = HttpClientPool::new(
            100,
            "Mozilla/5.0 (compatible; WebSearchBot/1.0)",
            Duration::from_secs(60),
            250_000,
        )
        .unwrap();
        let config = pool.default_config();
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.max_body_size, 250_000);
    }
}
