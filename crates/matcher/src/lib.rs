use std::cmp::Ordering;
use std::collections::HashSet;

use websearch_core::{Match, SearchResult};

const CONTEXT_RADIUS: usize = 100;

const WEIGHT_TITLE: f64 = 3.0;
const WEIGHT_META: f64 = 2.0;
const WEIGHT_HEADERS: f64 = 1.5;
const WEIGHT_CONTENT: f64 = 1.0;
const WEIGHT_POSITION: f64 = 0.5;

/// Every non-overlapping occurrence of `query` in `body_text`, case-folded.
/// `headers` boosts a match's `local_score` when the query also shows up
/// in one of them.
pub fn find_matches(body_text: &str, query: &str, headers: &[String]) -> Vec<Match> {
    let query_lower = query.to_lowercase();
    if query_lower.is_empty() || body_text.is_empty() {
        return Vec::new();
    }
    let body_lower = body_text.to_lowercase();
    let headers_lower: Vec<String> = headers.iter().map(|h| h.to_lowercase()).collect();
    let body_len = body_lower.len().max(1) as f64;

    let mut matches = Vec::new();
    let mut cursor = 0usize;
    while let Some(offset) = body_lower[cursor..].find(&query_lower) {
        let pos = cursor + offset;
        let start = floor_boundary(&body_lower, pos.saturating_sub(CONTEXT_RADIUS));
        let end = ceil_boundary(&body_lower, (pos + query_lower.len() + CONTEXT_RADIUS).min(body_lower.len()));
        // Sliced from `body_lower`, not `body_text`: `start`/`end` are byte
        // offsets computed against the lowercased copy, and case-folding can
        // change a character's UTF-8 byte length (e.g. `İ` -> `i̇`), so they
        // are not guaranteed to land on `body_text`'s char boundaries.
        let context = safe_slice(&body_lower, start, end);

        let position_factor = 1.0 - (pos as f64 / body_len);
        let header_factor = if headers_lower.iter().any(|h| h.contains(query_lower.as_str())) {
            1.5
        } else {
            1.0
        };

        matches.push(Match {
            position: pos,
            context,
            local_score: (1.0 + position_factor) * header_factor,
        });
        cursor = pos + query_lower.len();
        if cursor > body_lower.len() {
            break;
        }
    }
    matches
}

/// Page-level relevance from matches plus title/meta/headers, per the
/// weighted five-component model. `None` if there were no matches.
pub fn rank_page(
    url: &str,
    title: &str,
    meta_description: &str,
    headers: &[String],
    body_text: &str,
    query: &str,
) -> Option<SearchResult> {
    let matches = find_matches(body_text, query, headers);
    if matches.is_empty() {
        return None;
    }

    let query_lower = query.to_lowercase();
    let query_words: HashSet<&str> = query_lower.split_whitespace().collect();

    let title_score = field_score(&title.to_lowercase(), &query_lower, &query_words);
    let meta_score = field_score(&meta_description.to_lowercase(), &query_lower, &query_words);
    let headers_score = headers
        .iter()
        .map(|h| field_score(&h.to_lowercase(), &query_lower, &query_words))
        .fold(0.0f64, f64::max);

    let content_score = {
        let total: f64 = matches
            .iter()
            .map(|m| field_score(&m.context.to_lowercase(), &query_lower, &query_words))
            .sum();
        (total / matches.len() as f64).min(1.0)
    };

    let position_score = {
        let total: f64 = (0..matches.len()).map(|i| 1.0 / (i as f64 + 1.0)).sum();
        total / matches.len() as f64
    };

    let relevance = title_score * WEIGHT_TITLE
        + meta_score * WEIGHT_META
        + headers_score * WEIGHT_HEADERS
        + content_score * WEIGHT_CONTENT
        + position_score * WEIGHT_POSITION;

    let best = matches
        .iter()
        .max_by(|a, b| a.local_score.partial_cmp(&b.local_score).unwrap_or(Ordering::Equal))
        .expect("non-empty matches");

    Some(SearchResult {
        url: url.to_string(),
        title: title.to_string(),
        context: best.context.clone(),
        count: matches.len(),
        relevance,
    })
}

/// Sort results by relevance descending; break ties on URL for a
/// deterministic order given identical inputs.
pub fn rank_results(mut results: Vec<SearchResult>) -> Vec<SearchResult> {
    results.sort_by(|a, b| {
        b.relevance
            .partial_cmp(&a.relevance)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.url.cmp(&b.url))
    });
    results
}

/// `1.0` if the full (case-folded) query is a substring of `field`, else the
/// fraction of query words also present in `field`, tokenized on whitespace.
fn field_score(field_lower: &str, query_lower: &str, query_words: &HashSet<&str>) -> f64 {
    if field_lower.is_empty() || query_words.is_empty() {
        return 0.0;
    }
    if field_lower.contains(query_lower) {
        return 1.0;
    }
    let field_words: HashSet<&str> = field_lower.split_whitespace().collect();
    query_words.intersection(&field_words).count() as f64 / query_words.len() as f64
}

fn floor_boundary(s: &str, mut idx: usize) -> usize {
    idx = idx.min(s.len());
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn ceil_boundary(s: &str, mut idx: usize) -> usize {
    idx = idx.min(s.len());
    while idx < s.len() && !s.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}

fn safe_slice(s: &str, start: usize, end: usize) -> String {
    s[start.min(end)..end.max(start)].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_matches_when_query_absent() {
        assert!(find_matches("nothing relevant here", "foo", &[]).is_empty());
        assert!(rank_page("u", "t", "m", &[], "nothing relevant here", "foo").is_none());
    }

    #[test]
    fn matches_are_non_overlapping_and_in_position_order() {
        let matches = find_matches("foo bar foo baz foo", "foo", &[]);
        assert_eq!(matches.len(), 3);
        assert!(matches.windows(2).all(|w| w[0].position < w[1].position));
    }

    #[test]
    fn header_presence_boosts_local_score() {
        let boosted = find_matches("the word appears here", "word", &["Word heading".to_string()]);
        let plain = find_matches("the word appears here", "word", &[]);
        assert!(boosted[0].local_score > plain[0].local_score);
    }

    #[test]
    fn title_exact_substring_scores_full_marks() {
        let result = rank_page("u", "All About Foo", "", &[], "foo appears once", "foo").unwrap();
        assert!(result.relevance > 0.0);
    }

    #[test]
    fn context_slicing_does_not_panic_when_lowercasing_changes_byte_length() {
        // 'İ' (U+0130) lowercases to the two-codepoint "i̇", which is longer
        // in UTF-8 than the original single character. Padding the match with
        // enough of these before/after it shifts `body_lower`'s byte offsets
        // out of step with `body_text`'s, which used to panic when the
        // context was sliced from the original-case string.
        let padding: String = std::iter::repeat('İ').take(60).collect();
        let body = format!("{padding} needle {padding}");
        let matches = find_matches(&body, "needle", &[]);
        assert_eq!(matches.len(), 1);
        assert!(matches[0].context.contains("needle"));
    }

    #[test]
    fn rank_results_orders_by_relevance_then_url() {
        let a = SearchResult { url: "b.test".into(), title: "".into(), context: "".into(), count: 1, relevance: 1.0 };
        let b = SearchResult { url: "a.test".into(), title: "".into(), context: "".into(), count: 1, relevance: 1.0 };
        let c = SearchResult { url: "c.test".into(), title: "".into(), context: "".into(), count: 1, relevance: 2.0 };
        let ranked = rank_results(vec![a, b, c]);
        assert_eq!(ranked[0].url, "c.test");
        assert_eq!(ranked[1].url, "a.test");
        assert_eq!(ranked[2].url, "b.test");
    }
}
