pub mod html;

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tracing::trace;
use url::Url;

use websearch_core::PageRecord;

/// Bytes larger than this are truncated before parsing; guards against
/// pathological documents blowing up the HTML parser.
const MAX_PARSE_SIZE: usize = 5 * 1024 * 1024;

/// Stable, non-randomized fingerprint of the raw page bytes. Used as the
/// parser's memo key — `std`'s hasher is randomized per process and unsuitable.
pub fn fingerprint(raw: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw);
    format!("{:x}", hasher.finalize())
}

/// Memoizing HTML parser. The memo table is a plain concurrent map keyed by
/// content fingerprint — last-writer-wins on a race is fine since two writers
/// only happen when two fetches produced byte-identical bodies.
#[derive(Default)]
pub struct Parser {
    memo: DashMap<String, PageRecord>,
}

impl Parser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `raw` HTML bytes fetched from `url`. Returns `None` only when
    /// the bytes are not valid enough to decode as text at all (never for
    /// merely-empty/malformed markup — `scraper` degrades gracefully).
    pub fn parse(&self, raw: &[u8]) -> Option<PageRecord> {
        let key = fingerprint(raw);
        if let Some(cached) = self.memo.get(&key) {
            trace!(fingerprint = %key, "parser memo hit");
            return Some(cached.clone());
        }

        let body = if raw.len() > MAX_PARSE_SIZE {
            &raw[..MAX_PARSE_SIZE]
        } else {
            raw
        };
        let body_str = String::from_utf8_lossy(body);
        let parsed = html::parse(&body_str);

        let record = PageRecord {
            title: parsed.title,
            meta_description: parsed.meta_description,
            headers: parsed.headers,
            body_text: parsed.body_text,
            raw_html: body_str.into_owned(),
        };

        self.memo.insert(key, record.clone());
        Some(record)
    }

    /// Outbound same-domain links, used by the crawler to expand its frontier.
    /// Not memoized — link sets are consumed once per fetch, not re-read.
    pub fn links(&self, raw: &[u8], base_url: &Url) -> Vec<Url> {
        let body_str = String::from_utf8_lossy(raw);
        html::extract_same_domain_links(&body_str, base_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_memoized_by_content_fingerprint() {
        let parser = Parser::new();
        let raw = b"<html><head><title>Hi</title></head><body><p>hello</p></body></html>";
        let first = parser.parse(raw).unwrap();
        let second = parser.parse(raw).unwrap();
        assert_eq!(first.title, second.title);
        assert_eq!(parser.memo.len(), 1);
    }

    #[test]
    fn fingerprint_is_stable_across_calls() {
        let raw = b"same bytes";
        assert_eq!(fingerprint(raw), fingerprint(raw));
    }

    #[test]
    fn empty_title_falls_back_to_untitled() {
        let parser = Parser::new();
        let record = parser.parse(b"<html><body><p>no headings</p></body></html>").unwrap();
        assert_eq!(record.title, "Untitled");
    }
}
