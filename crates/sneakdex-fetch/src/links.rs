//! Minimal `<a href>` extraction (§4.5 "On Link extraction").
//!
//! Full HTML parsing is out of scope for the crawler core; this is a
//! single-pass regex scan sufficient to discover outbound links without
//! pulling in a DOM parser.

use once_cell::sync::Lazy;
use regex::Regex;

static HREF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)<a\s+[^>]*href\s*=\s*["']([^"']*)["']"#).unwrap());

/// Fast rejections from §4.5: empty, too long, fragment-only, or a
/// scheme this crawler never follows.
pub fn fast_reject(href: &str) -> bool {
    if href.is_empty() || href.len() > 2000 {
        return true;
    }
    let first = href.chars().next().unwrap_or('\0');
    if first == '#' || first == '?' {
        return true;
    }
    if href.starts_with("javascript:") || href.starts_with("mailto:") || href.starts_with("tel:")
    {
        return true;
    }
    if href.contains('#') {
        return true;
    }
    false
}

/// Extracts raw `href` values from an HTML body, already filtered
/// through [`fast_reject`].
pub fn extract_hrefs(body: &str) -> Vec<String> {
    HREF_RE
        .captures_iter(body)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .filter(|href| !fast_reject(href))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_simple_links() {
        let html = r#"<a href="/page1">one</a><a href='https://x.test/page2'>two</a>"#;
        let links = extract_hrefs(html);
        assert_eq!(links, vec!["/page1", "https://x.test/page2"]);
    }

    #[test]
    fn rejects_fragment_only_and_script_schemes() {
        let html = r#"<a href="#top">t</a><a href="javascript:void(0)">j</a><a href="mailto:a@b.com">m</a>"#;
        assert!(extract_hrefs(html).is_empty());
    }

    #[test]
    fn rejects_links_with_fragments() {
        assert!(fast_reject("/page#section"));
        assert!(!fast_reject("/page"));
    }

    #[test]
    fn rejects_overlong_href() {
        let long = format!("/{}", "a".repeat(3000));
        assert!(fast_reject(&long));
    }
}
