use scraper::{ElementRef, Html, Selector};
use url::Url;

const EXCLUDED_TAGS: [&str; 4] = ["script", "style", "iframe", "noscript"];

pub struct ParsedHtml {
    pub title: String,
    pub meta_description: String,
    pub headers: Vec<String>,
    pub body_text: String,
}

pub fn parse(html_str: &str) -> ParsedHtml {
    let document = Html::parse_document(html_str);

    ParsedHtml {
        title: extract_title(&document),
        meta_description: extract_meta_description(&document),
        headers: extract_headers(&document),
        body_text: extract_body_text(&document),
    }
}

/// Outbound `<a href>` targets resolved against `base_url`, same-host only.
/// Host comparison is case-insensitive; scheme-relative and relative hrefs
/// are resolved through `Url::join`.
pub fn extract_same_domain_links(html_str: &str, base_url: &Url) -> Vec<Url> {
    let document = Html::parse_document(html_str);
    let domain = base_url.host_str().unwrap_or("").to_lowercase();

    let Some(sel) = selector("a[href]") else {
        return Vec::new();
    };

    document
        .select(&sel)
        .filter_map(|el| {
            let href = el.value().attr("href")?;
            if href.starts_with('#')
                || href.starts_with("javascript:")
                || href.starts_with("mailto:")
                || href.starts_with("tel:")
                || href.starts_with("data:")
            {
                return None;
            }
            let resolved = base_url.join(href).ok()?;
            let host = resolved.host_str().unwrap_or("").to_lowercase();
            (host == domain).then_some(resolved)
        })
        .collect()
}

fn selector(s: &str) -> Option<Selector> {
    Selector::parse(s).ok()
}

/// Text content of `el` and its descendants, with `script`/`style`/`iframe`/
/// `noscript` subtrees skipped entirely.
fn clean_text(el: ElementRef) -> String {
    let mut out = String::new();
    collect_clean_text(el, &mut out);
    out
}

fn collect_clean_text(el: ElementRef, out: &mut String) {
    for child in el.children() {
        if let Some(child_el) = ElementRef::wrap(child) {
            if EXCLUDED_TAGS.contains(&child_el.value().name()) {
                continue;
            }
            collect_clean_text(child_el, out);
        } else if let Some(text) = child.value().as_text() {
            out.push_str(text);
            out.push(' ');
        }
    }
}

fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn extract_title(document: &Html) -> String {
    if let Some(sel) = selector("title") {
        if let Some(el) = document.select(&sel).next() {
            let text = normalize_whitespace(&clean_text(el));
            if !text.is_empty() {
                return text;
            }
        }
    }
    if let Some(sel) = selector("h1") {
        if let Some(el) = document.select(&sel).next() {
            let text = normalize_whitespace(&clean_text(el));
            if !text.is_empty() {
                return text;
            }
        }
    }
    "Untitled".to_string()
}

fn extract_meta_description(document: &Html) -> String {
    selector("meta[name='description'], meta[name='Description']")
        .and_then(|s| document.select(&s).next())
        .and_then(|el| el.value().attr("content"))
        .unwrap_or("")
        .trim()
        .to_string()
}

fn extract_headers(document: &Html) -> Vec<String> {
    let Some(sel) = selector("h1, h2, h3") else {
        return Vec::new();
    };
    document
        .select(&sel)
        .map(|el| normalize_whitespace(&clean_text(el)))
        .filter(|t| !t.is_empty())
        .collect()
}

fn extract_body_text(document: &Html) -> String {
    let Some(sel) = selector("p, div, article, section") else {
        return String::new();
    };
    let joined = document
        .select(&sel)
        .map(clean_text)
        .collect::<Vec<_>>()
        .join(" ");
    normalize_whitespace(&joined)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_script_and_style_before_extracting_text() {
        let html = r#"<html><body><p>hello <script>evil()</script>world</p><style>.x{color:red}</style></body></html>"#;
        let parsed = parse(html);
        assert_eq!(parsed.body_text, "hello world");
    }

    #[test]
    fn title_falls_back_to_first_h1_then_untitled() {
        let with_title = parse("<html><head><title> My Page </title></head></html>");
        assert_eq!(with_title.title, "My Page");

        let with_h1 = parse("<html><body><h1>Heading Only</h1></body></html>");
        assert_eq!(with_h1.title, "Heading Only");

        let bare = parse("<html><body><p>no headings here</p></body></html>");
        assert_eq!(bare.title, "Untitled");
    }

    #[test]
    fn headers_collect_h1_h2_h3_in_document_order() {
        let parsed = parse("<html><body><h2>second</h2><h1>first</h1><h3>third</h3></body></html>");
        assert_eq!(parsed.headers, vec!["second", "first", "third"]);
    }

    #[test]
    fn same_domain_links_only() {
        let html = r#"<a href="/a">a</a><a href="https://other.test/b">b</a><a href="#frag">c</a>"#;
        let base = Url::parse("https://example.test/").unwrap();
        let links = extract_same_domain_links(html, &base);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].as_str(), "https://example.test/a");
    }
}
