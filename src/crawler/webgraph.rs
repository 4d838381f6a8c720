//! In-memory web graphs for exercising a crawl without a network
//!
//! A [`WebGraph`] names the pages that exist and the links between them.
//! [`WebGraphFetcher`] serves it as HTML, so the rest of the pipeline (link
//! parsing, routing, merging) runs exactly as it would against real sites.

use crate::crawler::fetcher::{FetchError, FetchOutcome, Fetcher};
use crate::crawler::fetch_worker::LinkScorer;
use crate::url::UrlKey;
use crate::UrlResult;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

/// A set of pages and their outlinks
pub trait WebGraph: Send + Sync {
    /// Outlinks of `page`; empty for a page with no links or no page at all
    fn children(&self, page: &UrlKey) -> Vec<UrlKey>;

    fn has_page(&self, page: &UrlKey) -> bool;

    /// Score a crawler should give `page` when it finds a link to it
    fn score(&self, _page: &UrlKey) -> f64 {
        1.0
    }
}

/// Graph without any pages
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyGraph;

pub const EMPTY_GRAPH: EmptyGraph = EmptyGraph;

impl WebGraph for EmptyGraph {
    fn children(&self, _page: &UrlKey) -> Vec<UrlKey> {
        Vec::new()
    }

    fn has_page(&self, _page: &UrlKey) -> bool {
        false
    }
}

/// A web graph built up page by page
///
/// Page names without a scheme are taken as `http://` URLs, and every name is
/// normalized, so `"domain1.com"` and `"http://www.domain1.com/"` are the same page.
///
/// ```
/// use sumi_crawldb::crawler::SimpleWebGraph;
///
/// let graph = SimpleWebGraph::new()
///     .add("domain1.com", &["domain1.com/page1", "domain2.com"])?
///     .add("domain1.com/page1", &[])?;
/// # Ok::<(), sumi_crawldb::UrlError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct SimpleWebGraph {
    pages: HashMap<UrlKey, Vec<UrlKey>>,
    scores: HashMap<UrlKey, f64>,
}

impl SimpleWebGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `page` with the given outlinks, replacing any earlier entry for it
    pub fn add(mut self, page: &str, children: &[&str]) -> UrlResult<Self> {
        let page = page_key(page)?;
        let children = children
            .iter()
            .map(|c| page_key(c))
            .collect::<UrlResult<Vec<_>>>()?;
        self.pages.insert(page, children);
        Ok(self)
    }

    /// Sets the score links to `page` are discovered with
    pub fn with_score(mut self, page: &str, score: f64) -> UrlResult<Self> {
        self.scores.insert(page_key(page)?, score);
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

fn page_key(name: &str) -> UrlResult<UrlKey> {
    if name.contains("://") {
        UrlKey::parse(name)
    } else {
        UrlKey::parse(&format!("http://{}", name))
    }
}

impl WebGraph for SimpleWebGraph {
    fn children(&self, page: &UrlKey) -> Vec<UrlKey> {
        self.pages.get(page).cloned().unwrap_or_default()
    }

    fn has_page(&self, page: &UrlKey) -> bool {
        self.pages.contains_key(page)
    }

    fn score(&self, page: &UrlKey) -> f64 {
        self.scores.get(page).copied().unwrap_or(1.0)
    }
}

impl LinkScorer for SimpleWebGraph {
    fn score(&self, link: &UrlKey, _depth: u32) -> f64 {
        WebGraph::score(self, link)
    }
}

/// [`Fetcher`] serving a [`WebGraph`]
///
/// Existing pages answer 200 with an HTML body linking to their children;
/// anything else answers 404.
#[derive(Clone)]
pub struct WebGraphFetcher {
    graph: Arc<dyn WebGraph>,
}

impl WebGraphFetcher {
    pub fn new(graph: Arc<dyn WebGraph>) -> Self {
        Self { graph }
    }
}

#[async_trait]
impl Fetcher for WebGraphFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchOutcome, FetchError> {
        let page = UrlKey::parse(url.as_str())
            .map_err(|e| FetchError::Permanent(format!("{}: {}", url, e)))?;

        let (status, content) = if self.graph.has_page(&page) {
            let anchors: String = self
                .graph
                .children(&page)
                .iter()
                .map(|child| format!("<a href=\"{}\">{}</a>\n", child, child))
                .collect();
            (200, format!("<html><body>\n{}</body></html>", anchors))
        } else {
            (404, String::new())
        };

        let headers = HashMap::from([(
            "content-type".to_string(),
            "text/html; charset=utf-8".to_string(),
        )]);

        Ok(FetchOutcome {
            status,
            fetched_url: url.clone(),
            content,
            headers,
            redirect_count: 0,
        })
    }
}
