use std::sync::atomic::{AtomicU64, Ordering};

use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use tracing::{debug, warn};

use websearch_core::SearchResult;

/// Keys live under this namespace so `cleanup_expired`/`clear_all`/`monitor_size`
/// can prefix-scan without touching unrelated keys in the same Redis database.
const KEY_PREFIX: &str = "search_cache:";

const DEFAULT_TTL_SECS: u64 = 24 * 3600;

/// Outcome of a cache lookup. `Miss` means the key was never written (or the
/// store was unreachable); `Hit(None)` means a prior search determined this
/// page has no match for the query — a cached negative, not an absence.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    Hit(Option<SearchResult>),
    Miss,
}

impl CacheLookup {
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheLookup::Hit(_))
    }
}

#[derive(Debug, Default, Clone)]
pub struct CacheStats {
    pub entries: usize,
    pub bytes: usize,
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub batch_writes: u64,
    pub invalidations: u64,
    pub clears: u64,
    pub hit_rate: f64,
}

/// Best-effort `(url, query) -> SearchResult | null` cache over Redis. Every
/// operation swallows backing-store errors and degrades to a miss/no-op —
/// callers never see a `CacheError` from here, only absence.
pub struct Cache {
    client: Client,
    conn: MultiplexedConnection,
    ttl_secs: u64,
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    batch_writes: AtomicU64,
    invalidations: AtomicU64,
    clears: AtomicU64,
}

impl Cache {
    pub async fn connect(redis_url: &str) -> anyhow::Result<Self> {
        Self::connect_with_ttl(redis_url, DEFAULT_TTL_SECS).await
    }

    pub async fn connect_with_ttl(redis_url: &str, ttl_secs: u64) -> anyhow::Result<Self> {
        let client = Client::open(redis_url)?;
        let conn = client.get_multiplexed_tokio_connection().await?;
        Ok(Self {
            client,
            conn,
            ttl_secs,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            batch_writes: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
            clears: AtomicU64::new(0),
        })
    }

    fn key(url: &str, query: &str) -> String {
        format!("{KEY_PREFIX}{url}:{query}")
    }

    pub async fn get(&self, url: &str, query: &str) -> CacheLookup {
        let mut conn = self.conn.clone();
        let key = Self::key(url, query);

        let raw: Option<String> = match conn.get(&key).await {
            Ok(v) => v,
            Err(err) => {
                warn!(%key, error = %err, "cache get failed, treating as miss");
                self.misses.fetch_add(1, Ordering::Relaxed);
                return CacheLookup::Miss;
            }
        };

        match raw.and_then(|s| serde_json::from_str::<Option<SearchResult>>(&s).ok()) {
            Some(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                CacheLookup::Hit(value)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                CacheLookup::Miss
            }
        }
    }

    pub async fn put(&self, url: &str, query: &str, value: &Option<SearchResult>) {
        let mut conn = self.conn.clone();
        let key = Self::key(url, query);
        let Ok(payload) = serde_json::to_string(value) else {
            return;
        };

        if let Err(err) = conn.set_ex::<_, _, ()>(&key, payload, self.ttl_secs).await {
            warn!(%key, error = %err, "cache put failed");
            return;
        }
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub async fn invalidate(&self, url: &str, query: &str) {
        let mut conn = self.conn.clone();
        let key = Self::key(url, query);
        if conn.del::<_, ()>(&key).await.is_ok() {
            self.invalidations.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub async fn clear_all(&self) {
        let deleted = self.scan_delete(&format!("{KEY_PREFIX}*")).await;
        debug!(deleted, "cleared cache namespace");
        self.clears.fetch_add(1, Ordering::Relaxed);
    }

    /// Single pipelined `MGET` over `(url, query)` pairs.
    pub async fn get_many(&self, urls: &[String], query: &str) -> Vec<(String, CacheLookup)> {
        if urls.is_empty() {
            return Vec::new();
        }
        let mut conn = self.conn.clone();
        let keys: Vec<String> = urls.iter().map(|u| Self::key(u, query)).collect();

        let raw: Vec<Option<String>> = match conn.get(&keys).await {
            Ok(v) => v,
            Err(err) => {
                warn!(error = %err, "batch cache get failed, treating all as miss");
                self.misses.fetch_add(urls.len() as u64, Ordering::Relaxed);
                return urls.iter().cloned().map(|u| (u, CacheLookup::Miss)).collect();
            }
        };

        urls.iter()
            .cloned()
            .zip(raw)
            .map(|(url, entry)| {
                let lookup = match entry.and_then(|s| serde_json::from_str::<Option<SearchResult>>(&s).ok()) {
                    Some(value) => {
                        self.hits.fetch_add(1, Ordering::Relaxed);
                        CacheLookup::Hit(value)
                    }
                    None => {
                        self.misses.fetch_add(1, Ordering::Relaxed);
                        CacheLookup::Miss
                    }
                };
                (url, lookup)
            })
            .collect()
    }

    /// Single pipelined `SETEX` batch for `(url -> value)` at a fixed query.
    pub async fn put_many(&self, items: &[(String, Option<SearchResult>)], query: &str) {
        if items.is_empty() {
            return;
        }
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic();

        for (url, value) in items {
            let Ok(payload) = serde_json::to_string(value) else {
                continue;
            };
            pipe.set_ex(Self::key(url, query), payload, self.ttl_secs);
        }

        if let Err(err) = pipe.query_async::<_, ()>(&mut conn).await {
            warn!(error = %err, count = items.len(), "batch cache put failed");
            return;
        }
        self.batch_writes.fetch_add(1, Ordering::Relaxed);
        self.writes.fetch_add(items.len() as u64, Ordering::Relaxed);
    }

    pub async fn set_ttl(&self, url: &str, query: &str, ttl_secs: u64) {
        let mut conn = self.conn.clone();
        let key = Self::key(url, query);
        let _: Result<bool, _> = conn.expire(&key, ttl_secs as i64).await;
    }

    pub async fn get_ttl(&self, url: &str, query: &str) -> Option<i64> {
        let mut conn = self.conn.clone();
        let key = Self::key(url, query);
        match conn.ttl::<_, i64>(&key).await {
            Ok(secs) if secs > 0 => Some(secs),
            _ => None,
        }
    }

    /// Sweeps the namespace and deletes keys with non-positive residual TTL.
    /// Returns the number of keys removed.
    pub async fn cleanup_expired(&self) -> usize {
        let mut conn = self.conn.clone();
        let keys = self.scan_keys(&format!("{KEY_PREFIX}*")).await;
        let mut removed = 0usize;

        for key in keys {
            let ttl: i64 = conn.ttl(&key).await.unwrap_or(-2);
            if ttl <= 0 {
                if conn.del::<_, ()>(&key).await.is_ok() {
                    removed += 1;
                }
            }
        }
        removed
    }

    /// Returns current namespace usage in bytes. If over `limit_mb`, evicts
    /// keys in ascending residual-TTL order until usage is back at or under
    /// the limit.
    pub async fn monitor_size(&self, limit_mb: u64) -> usize {
        let mut conn = self.conn.clone();
        let keys = self.scan_keys(&format!("{KEY_PREFIX}*")).await;

        let mut sized: Vec<(String, usize, i64)> = Vec::with_capacity(keys.len());
        let mut total_bytes = 0usize;
        for key in keys {
            let len: usize = conn.strlen(&key).await.unwrap_or(0);
            let ttl: i64 = conn.ttl(&key).await.unwrap_or(-1);
            total_bytes += len;
            sized.push((key, len, ttl));
        }

        let limit_bytes = (limit_mb as usize) * 1024 * 1024;
        if total_bytes <= limit_bytes {
            return total_bytes;
        }

        sized.sort_by_key(|(_, _, ttl)| *ttl);
        let mut remaining = total_bytes;
        for (key, len, _) in sized {
            if remaining <= limit_bytes {
                break;
            }
            if conn.del::<_, ()>(&key).await.is_ok() {
                remaining -= len;
            }
        }
        remaining
    }

    pub async fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let denom = hits + misses;
        let hit_rate = if denom == 0 {
            0.0
        } else {
            ((hits as f64 / denom as f64) * 100.0 * 100.0).round() / 100.0
        };

        let keys = self.scan_keys(&format!("{KEY_PREFIX}*")).await;
        let mut conn = self.conn.clone();
        let mut bytes = 0usize;
        for key in &keys {
            bytes += conn.strlen::<_, usize>(key).await.unwrap_or(0);
        }

        CacheStats {
            entries: keys.len(),
            bytes,
            hits,
            misses,
            writes: self.writes.load(Ordering::Relaxed),
            batch_writes: self.batch_writes.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            clears: self.clears.load(Ordering::Relaxed),
            hit_rate,
        }
    }

    async fn scan_keys(&self, pattern: &str) -> Vec<String> {
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = match redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(200)
                .query_async(&mut conn)
                .await
            {
                Ok(v) => v,
                Err(err) => {
                    warn!(error = %err, "cache scan failed");
                    break;
                }
            };
            keys.extend(batch);
            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        keys
    }

    async fn scan_delete(&self, pattern: &str) -> usize {
        let keys = self.scan_keys(pattern).await;
        if keys.is_empty() {
            return 0;
        }
        let mut conn = self.conn.clone();
        conn.del::<_, usize>(&keys).await.unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_format_matches_external_contract() {
        assert_eq!(Cache::key("https://ex.test/", "foo"), "search_cache:https://ex.test/:foo");
    }

    #[test]
    fn hit_rate_is_zero_with_no_samples() {
        let stats = CacheStats::default();
        assert_eq!(stats.hit_rate, 0.0);
    }
}
