use std::time::{Duration, Instant};

use dashmap::DashMap;

use websearch_core::SearchResult;

/// Holds the ranked results of a completed search in memory, keyed by
/// `search_id`, for the same lifetime as its `SearchState` (spec §9,
/// "Result retrieval" open question — the source has no `get_results` of its
/// own to mirror, so results live here rather than in the state store).
#[derive(Default)]
pub struct ResultStore {
    entries: DashMap<String, (Vec<SearchResult>, Instant)>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, id: &str, results: Vec<SearchResult>) {
        self.entries.insert(id.to_string(), (results, Instant::now()));
    }

    pub fn get(&self, id: &str) -> Option<Vec<SearchResult>> {
        self.entries.get(id).map(|entry| entry.0.clone())
    }

    /// Drops entries older than `max_age`, mirroring the state tracker's TTL
    /// sweep so results never outlive the state they were computed for.
    pub fn sweep_expired(&self, max_age: Duration) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, (_, stored_at)| stored_at.elapsed() < max_age);
        before - self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_results_round_trip() {
        let store = ResultStore::new();
        let result = SearchResult {
            url: "https://ex.test/".into(),
            title: "Hi".into(),
            context: "ctx".into(),
            count: 1,
            relevance: 1.0,
        };
        store.store("abc", vec![result.clone()]);
        assert_eq!(store.get("abc"), Some(vec![result]));
        assert_eq!(store.get("missing"), None);
    }

    #[test]
    fn sweep_drops_only_stale_entries() {
        let store = ResultStore::new();
        store.store("fresh", vec![]);
        std::thread::sleep(Duration::from_millis(10));
        let removed = store.sweep_expired(Duration::from_millis(1));
        assert_eq!(removed, 1);
        assert!(store.get("fresh").is_none());
    }
}
