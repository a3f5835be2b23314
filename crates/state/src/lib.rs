use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use tracing::warn;

use websearch_core::{SearchState, SearchStatus};

const KEY_PREFIX: &str = "search_state:";
const DEFAULT_TTL_SECS: u64 = 3600;

/// Per-search progress tracker over a Redis hash. Counters are stored as
/// separate hash fields and mutated with `HINCRBY`/`HSET`, which Redis
/// executes atomically — this gives linearizable per-id mutations without a
/// client-side lock, unlike a read-modify-write over a single JSON blob.
pub struct StateStore {
    conn: MultiplexedConnection,
    ttl_secs: u64,
}

impl StateStore {
    pub async fn connect(redis_url: &str) -> anyhow::Result<Self> {
        Self::connect_with_ttl(redis_url, DEFAULT_TTL_SECS).await
    }

    pub async fn connect_with_ttl(redis_url: &str, ttl_secs: u64) -> anyhow::Result<Self> {
        let client = Client::open(redis_url)?;
        let conn = client.get_multiplexed_tokio_connection().await?;
        Ok(Self { conn, ttl_secs })
    }

    fn key(id: &str) -> String {
        format!("{KEY_PREFIX}{id}")
    }

    fn now() -> f64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64()
    }

    pub async fn init_search(&self, id: &str) -> Result<(), websearch_core::CrawlError> {
        let mut conn = self.conn.clone();
        let key = Self::key(id);
        let now = Self::now();

        redis::pipe()
            .atomic()
            .hset(&key, "total_urls", 0)
            .hset(&key, "processed_urls", 0)
            .hset(&key, "found_results", 0)
            .hset(&key, "status", status_str(SearchStatus::Waiting))
            .hset(&key, "start_time", now)
            .hset(&key, "last_update", now)
            .expire(&key, self.ttl_secs as i64)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| websearch_core::CrawlError::StateStore(e.to_string()))
    }

    pub async fn set_total(&self, id: &str, n: usize) -> Result<(), websearch_core::CrawlError> {
        let mut conn = self.conn.clone();
        let key = Self::key(id);

        redis::pipe()
            .atomic()
            .hset(&key, "total_urls", n)
            .hset(&key, "status", status_str(SearchStatus::Searching))
            .hset(&key, "last_update", Self::now())
            .expire(&key, self.ttl_secs as i64)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| websearch_core::CrawlError::StateStore(e.to_string()))
    }

    pub async fn inc_processed(&self, id: &str) -> Result<(), websearch_core::CrawlError> {
        self.increment(id, "processed_urls").await
    }

    pub async fn inc_found(&self, id: &str) -> Result<(), websearch_core::CrawlError> {
        self.increment(id, "found_results").await
    }

    async fn increment(&self, id: &str, field: &str) -> Result<(), websearch_core::CrawlError> {
        let mut conn = self.conn.clone();
        let key = Self::key(id);

        redis::pipe()
            .atomic()
            .hincr(&key, field, 1)
            .hset(&key, "last_update", Self::now())
            .expire(&key, self.ttl_secs as i64)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| websearch_core::CrawlError::StateStore(e.to_string()))
    }

    pub async fn complete(&self, id: &str) -> Result<(), websearch_core::CrawlError> {
        let mut conn = self.conn.clone();
        let key = Self::key(id);

        redis::pipe()
            .atomic()
            .hset(&key, "status", status_str(SearchStatus::Completed))
            .hset(&key, "last_update", Self::now())
            .expire(&key, self.ttl_secs as i64)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| websearch_core::CrawlError::StateStore(e.to_string()))
    }

    pub async fn fail(&self, id: &str, err: &str) -> Result<(), websearch_core::CrawlError> {
        let mut conn = self.conn.clone();
        let key = Self::key(id);

        redis::pipe()
            .atomic()
            .hset(&key, "status", status_str(SearchStatus::Error))
            .hset(&key, "error", err)
            .hset(&key, "last_update", Self::now())
            .expire(&key, self.ttl_secs as i64)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| websearch_core::CrawlError::StateStore(e.to_string()))
    }

    pub async fn get(&self, id: &str) -> Result<Option<SearchState>, websearch_core::CrawlError> {
        let mut conn = self.conn.clone();
        let key = Self::key(id);

        let fields: Vec<(String, String)> = conn
            .hgetall(&key)
            .await
            .map_err(|e| websearch_core::CrawlError::StateStore(e.to_string()))?;

        if fields.is_empty() {
            return Ok(None);
        }

        let get = |name: &str| fields.iter().find(|(k, _)| k == name).map(|(_, v)| v.clone());

        let total_urls = get("total_urls").and_then(|v| v.parse().ok()).unwrap_or(0);
        let processed_urls = get("processed_urls").and_then(|v| v.parse().ok()).unwrap_or(0);
        let found_results = get("found_results").and_then(|v| v.parse().ok()).unwrap_or(0);
        let status = get("status").map(parse_status).unwrap_or(SearchStatus::Waiting);
        let start_time = get("start_time").and_then(|v| v.parse().ok()).unwrap_or(0.0);
        let last_update = get("last_update").and_then(|v| v.parse().ok()).unwrap_or(0.0);
        let error = get("error");

        Ok(Some(SearchState {
            total_urls,
            processed_urls,
            found_results,
            status,
            start_time,
            last_update,
            error,
        }))
    }

    /// Deletes any state whose `last_update` is older than `max_age_secs`
    /// (spec default: 3600s). Intended to run on an interval in the background.
    pub async fn sweep_expired(&self, max_age_secs: f64) -> usize {
        let mut conn = self.conn.clone();
        let now = Self::now();
        let mut cursor: u64 = 0;
        let mut removed = 0usize;

        loop {
            let (next, keys): (u64, Vec<String>) = match redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(format!("{KEY_PREFIX}*"))
                .arg("COUNT")
                .arg(200)
                .query_async(&mut conn)
                .await
            {
                Ok(v) => v,
                Err(err) => {
                    warn!(error = %err, "state sweep scan failed");
                    break;
                }
            };

            for key in keys {
                let last_update: Option<f64> = conn
                    .hget(&key, "last_update")
                    .await
                    .ok()
                    .and_then(|v: Option<String>| v.and_then(|s| s.parse().ok()));
                if let Some(last) = last_update {
                    if now - last > max_age_secs {
                        if conn.del::<_, ()>(&key).await.is_ok() {
                            removed += 1;
                        }
                    }
                }
            }

            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        removed
    }
}

fn status_str(status: SearchStatus) -> &'static str {
    match status {
        SearchStatus::Waiting => "waiting",
        SearchStatus::Searching => "searching",
        SearchStatus::Completed => "completed",
        SearchStatus::Error => "error",
    }
}

fn parse_status(s: String) -> SearchStatus {
    match s.as_str() {
        "searching" => SearchStatus::Searching,
        "completed" => SearchStatus::Completed,
        "error" => SearchStatus::Error,
        _ => SearchStatus::Waiting,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_its_string_form() {
        for status in [
            SearchStatus::Waiting,
            SearchStatus::Searching,
            SearchStatus::Completed,
            SearchStatus::Error,
        ] {
            assert_eq!(parse_status(status_str(status).to_string()), status);
        }
    }
}
