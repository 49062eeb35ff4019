//! URL Normalizer (§4.2).
//!
//! A pure function: lowercases scheme and host, strips fragment and raw
//! query, and trims a trailing `/` unless the path is exactly `/`.
//! Applied once at link-extraction time, never again during dedup
//! lookups — dedup always compares already-canonical strings.

use url::Url;

/// Canonicalizes `raw` per §4.2. Returns `None` if `raw` does not parse
/// as a URL at all; callers should treat that as a validation failure
/// rather than call `normalize` speculatively.
pub fn normalize(raw: &str) -> Option<String> {
    let mut url = Url::parse(raw).ok()?;

    let scheme = url.scheme().to_lowercase();
    url.set_scheme(&scheme).ok()?;

    if let Some(host) = url.host_str() {
        let lowered = host.to_lowercase();
        url.set_host(Some(&lowered)).ok()?;
    }

    url.set_fragment(None);
    url.set_query(None);

    let mut result = url.to_string();
    if url.path() != "/" && result.ends_with('/') {
        result.pop();
    }
    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_scheme_and_host() {
        assert_eq!(
            normalize("HTTPS://Example.COM/Path").unwrap(),
            "https://example.com/Path"
        );
    }

    #[test]
    fn strips_fragment_and_query() {
        assert_eq!(
            normalize("https://example.com/path?x=1#frag").unwrap(),
            "https://example.com/path"
        );
    }

    #[test]
    fn trims_trailing_slash_unless_root() {
        assert_eq!(
            normalize("https://example.com/path/").unwrap(),
            "https://example.com/path"
        );
        assert_eq!(
            normalize("https://example.com/").unwrap(),
            "https://example.com/"
        );
    }

    #[test]
    fn is_idempotent() {
        let cases = [
            "HTTPS://Example.COM/Path/?q=1#f",
            "http://a.test/",
            "http://a.test/x/y/",
        ];
        for raw in cases {
            let once = normalize(raw).unwrap();
            let twice = normalize(&once).unwrap();
            assert_eq!(once, twice, "normalize should be idempotent for {raw}");
        }
    }

    #[test]
    fn rejects_unparseable_input() {
        assert_eq!(normalize("not a url"), None);
    }
}
