//! Link extraction from fetched pages

use scraper::{Html, Selector};
use url::Url;

/// Extracts outlinks from page content
pub trait LinkParser: Send + Sync {
    /// Returns absolute http(s) URLs found in `content`, resolved against `base`
    fn extract_links(&self, base: &Url, content: &str) -> Vec<String>;
}

/// [`LinkParser`] for HTML pages
///
/// # Link Extraction Rules
///
/// **Include:**
/// - `<a href="...">` anywhere in the document
/// - `<link rel="canonical" href="...">`
///
/// **Exclude:**
/// - `<a href="..." download>`
/// - `javascript:`, `mailto:`, `tel:` links and data URIs
/// - Fragment-only links
/// - Anything that does not resolve to an http(s) URL
///
/// `rel="nofollow"` links are followed.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlLinkParser;

impl LinkParser for HtmlLinkParser {
    fn extract_links(&self, base: &Url, content: &str) -> Vec<String> {
        let document = Html::parse_document(content);
        let mut links = Vec::new();

        if let Ok(a_selector) = Selector::parse("a[href]") {
            for element in document.select(&a_selector) {
                if element.value().attr("download").is_some() {
                    continue;
                }
                if let Some(link) = element.value().attr("href").and_then(|h| resolve_link(h, base))
                {
                    links.push(link);
                }
            }
        }

        if let Ok(canonical_selector) = Selector::parse("link[rel='canonical'][href]") {
            links.extend(
                document
                    .select(&canonical_selector)
                    .filter_map(|e| e.value().attr("href"))
                    .filter_map(|h| resolve_link(h, base)),
            );
        }

        links
    }
}

/// Resolves an href against the page URL, or None if it should be skipped
fn resolve_link(href: &str, base: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
    {
        return None;
    }

    let absolute = base.join(href).ok()?;
    match absolute.scheme() {
        "http" | "https" => Some(absolute.to_string()),
        _ => None,
    }
}
