use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::trace;

use websearch_core::Bucket;

struct DomainBucket {
    bucket: Bucket,
    last_refill: Instant,
}

impl DomainBucket {
    fn new(burst: f64) -> Self {
        Self {
            bucket: Bucket::full(burst),
            last_refill: Instant::now(),
        }
    }
}

/// Per-domain token bucket. Each domain gets its own mutex so unrelated
/// domains never serialize against each other.
pub struct RateLimiter {
    rate: f64,
    burst: f64,
    domains: DashMap<String, Arc<Mutex<DomainBucket>>>,
}

impl RateLimiter {
    pub fn new(rate: f64, burst: f64) -> Self {
        Self {
            rate,
            burst,
            domains: DashMap::new(),
        }
    }

    fn bucket_for(&self, domain: &str) -> Arc<Mutex<DomainBucket>> {
        self.domains
            .entry(domain.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(DomainBucket::new(self.burst))))
            .clone()
    }

    /// Block until at least one token exists for `domain`, then atomically
    /// decrement it. The sleep between retries is a plain `tokio::time::sleep`
    /// so it is cancel-safe when this future is dropped under `select!`.
    pub async fn acquire(&self, domain: &str) {
        let cell = self.bucket_for(domain);
        loop {
            {
                let mut state = cell.lock().await;
                let now = Instant::now();
                let elapsed = now.duration_since(state.last_refill).as_secs_f64();
                state.bucket.refill(elapsed, self.rate);
                state.last_refill = now;

                if state.bucket.tokens >= 1.0 {
                    state.bucket.tokens -= 1.0;
                    trace!(domain, tokens = state.bucket.tokens, "acquired token");
                    return;
                }
            }
            sleep(Duration::from_secs_f64(1.0 / self.rate)).await;
        }
    }

    /// Refund a token (e.g. the fetch never reached the remote). Never pushes
    /// a domain above its burst cap.
    pub async fn release(&self, domain: &str) {
        let cell = self.bucket_for(domain);
        let mut state = cell.lock().await;
        state.bucket.tokens = (state.bucket.tokens + 1.0).min(state.bucket.burst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn acquire_never_blocks_within_burst() {
        let limiter = RateLimiter::new(2.0, 5.0);
        let start = Instant::now();
        for _ in 0..5 {
            limiter.acquire("example.test").await;
        }
        assert!(start.elapsed() < Duration::from_millis(200));
    }

    #[tokio::test]
    async fn distinct_domains_do_not_share_a_bucket() {
        let limiter = RateLimiter::new(1.0, 1.0);
        limiter.acquire("a.test").await;
        let start = Instant::now();
        limiter.acquire("b.test").await;
        assert!(start.elapsed() < Duration::from_millis(200));
    }

    #[tokio::test]
    async fn release_refunds_up_to_burst_cap() {
        let limiter = RateLimiter::new(1.0, 2.0);
        limiter.acquire("example.test").await;
        limiter.acquire("example.test").await;
        limiter.release("example.test").await;
        limiter.release("example.test").await;
        limiter.release("example.test").await;

        let cell = limiter.bucket_for("example.test");
        let state = cell.lock().await;
        assert_eq!(state.bucket.tokens, 2.0);
    }
}
