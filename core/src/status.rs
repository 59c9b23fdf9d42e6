//! Success classification of a completed request.

use url::Url;

/// Whether `status` counts as success for a request sent to `uri`.
///
/// Any 2xx and 304 succeed. A status of 0 succeeds only when the effective
/// scheme is not http(s), which is how local (`file:`) access reports
/// success. Relative URIs have no scheme of their own and are treated as
/// network requests.
pub fn is_success_status(status: i32, uri: &str) -> bool {
    match status {
        200..=299 | 304 => true,
        0 => !is_http_scheme(uri),
        _ => false,
    }
}

fn is_http_scheme(uri: &str) -> bool {
    match Url::parse(uri) {
        Ok(url) => matches!(url.scheme(), "http" | "https"),
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_hundreds_and_not_modified_succeed() {
        for status in [200, 201, 204, 206, 299, 304] {
            assert!(is_success_status(status, "http://x/y"), "{status}");
        }
    }

    #[test]
    fn errors_and_redirects_fail() {
        for status in [-1, 2, 301, 400, 404, 500, 1223] {
            assert!(!is_success_status(status, "http://x/y"), "{status}");
        }
    }

    #[test]
    fn zero_depends_on_scheme() {
        assert!(is_success_status(0, "file:///tmp/a.txt"));
        assert!(is_success_status(0, "chrome-extension://abc/page.html"));
        assert!(!is_success_status(0, "http://x/y"));
        assert!(!is_success_status(0, "HTTPS://x/y"));
        assert!(!is_success_status(0, "/relative/path"));
    }
}
