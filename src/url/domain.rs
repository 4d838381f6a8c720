use crate::url::normalize::normalize_host;
use url::Url;

/// Extracts the host identity of a URL
///
/// The host is lowercased and stripped of leading `www.` labels, the same way URL
/// normalization treats it, so a raw URL and its normalized form always report the
/// same host. The port is not part of the host identity.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use sumi_crawldb::url::extract_host;
///
/// let url = Url::parse("https://www.Example.com:8080/path").unwrap();
/// assert_eq!(extract_host(&url), Some("example.com".to_string()));
/// ```
pub fn extract_host(url: &Url) -> Option<String> {
    url.host_str()
        .filter(|h| !h.is_empty())
        .map(normalize_host)
}
