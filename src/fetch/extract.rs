//! Response inspection helpers: page title and stored-header allowlist.

use regex::Regex;
use reqwest::header::HeaderMap;
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Response headers kept in a [`FetchOutcome`](crate::types::FetchOutcome)
///
/// Everything else is dropped to bound the size of stored results.
pub const STORED_HEADERS: &[&str] = &[
    "server",
    "content-type",
    "content-length",
    "date",
    "via",
    "x-powered-by",
    "set-cookie",
    // ray / tracing identifiers
    "cf-ray",
    "x-request-id",
    "x-amz-cf-id",
    "x-trace-id",
    "traceparent",
];

static TITLE_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?is)<title(?:\s[^>]*)?>(.*?)</title\s*>").ok());

/// Extract the page title from an HTML body
///
/// Case-insensitive and non-greedy across newlines. Inner whitespace is
/// collapsed. A missing or unterminated `<title>` yields an empty string.
pub fn extract_title(body: &str) -> String {
    let Some(re) = TITLE_RE.as_ref() else {
        return String::new();
    };
    re.captures(body)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().split_whitespace().collect::<Vec<_>>().join(" "))
        .unwrap_or_default()
}

/// Keep only allowlisted headers, keyed by lowercase name
///
/// Repeated headers are joined with `", "`, except `set-cookie` which is
/// joined with newlines since cookie values may contain commas.
pub fn filter_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut stored = BTreeMap::new();
    for name in STORED_HEADERS {
        let values: Vec<&str> = headers
            .get_all(*name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        if values.is_empty() {
            continue;
        }
        let separator = if *name == "set-cookie" { "\n" } else { ", " };
        stored.insert((*name).to_string(), values.join(separator));
    }
    stored
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn title_is_case_insensitive_and_spans_lines() {
        let html = "<html><HEAD><TiTlE>\n  Example\n   Domain \n</tItLe></HEAD></html>";
        assert_eq!(extract_title(html), "Example Domain");
    }

    #[test]
    fn title_is_non_greedy() {
        let html = "<title>First</title><p>x</p><title>Second</title>";
        assert_eq!(extract_title(html), "First");
    }

    #[test]
    fn title_with_attributes() {
        let html = r#"<title data-react="true">Dashboard</title>"#;
        assert_eq!(extract_title(html), "Dashboard");
    }

    #[test]
    fn missing_or_malformed_title_is_empty() {
        assert_eq!(extract_title("<html><body>no title</body></html>"), "");
        assert_eq!(extract_title("<title>never closed"), "");
        assert_eq!(extract_title(""), "");
        // <titles> is not a title element
        assert_eq!(extract_title("<titles>nope</titles>"), "");
    }

    #[test]
    fn filter_keeps_only_allowlisted_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("server", HeaderValue::from_static("nginx"));
        headers.insert("content-type", HeaderValue::from_static("text/html"));
        headers.insert("cf-ray", HeaderValue::from_static("8a1b2c3d-AMS"));
        headers.insert("x-secret", HeaderValue::from_static("dropped"));
        headers.insert("cache-control", HeaderValue::from_static("no-cache"));

        let stored = filter_headers(&headers);
        assert_eq!(stored.len(), 3);
        assert_eq!(stored["server"], "nginx");
        assert_eq!(stored["cf-ray"], "8a1b2c3d-AMS");
        assert!(!stored.contains_key("x-secret"));
        assert!(!stored.contains_key("cache-control"));
    }

    #[test]
    fn repeated_headers_are_joined() {
        let mut headers = HeaderMap::new();
        headers.append("via", HeaderValue::from_static("1.1 a"));
        headers.append("via", HeaderValue::from_static("1.1 b"));
        headers.append("set-cookie", HeaderValue::from_static("a=1; Expires=Wed, 21 Oct 2015"));
        headers.append("set-cookie", HeaderValue::from_static("b=2"));

        let stored = filter_headers(&headers);
        assert_eq!(stored["via"], "1.1 a, 1.1 b");
        assert_eq!(stored["set-cookie"], "a=1; Expires=Wed, 21 Oct 2015\nb=2");
    }
}
