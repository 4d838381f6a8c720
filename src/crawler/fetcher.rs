//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building HTTP clients with the configured user agent string
//! - Following redirects manually, with loop detection and a hop limit
//! - Classifying request failures as transient or permanent

use crate::config::{Config, UserAgentConfig};
use async_trait::async_trait;
use reqwest::{header::LOCATION, redirect::Policy, Client};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace};
use url::Url;

/// A fetch that did not produce a response worth classifying
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Worth retrying: timeouts, refused connections, truncated bodies
    #[error("transient fetch error: {0}")]
    Transient(String),

    /// Not worth retrying: redirect loops, too many redirects, unusable URLs
    #[error("permanent fetch error: {0}")]
    Permanent(String),
}

/// A response, after any redirects were followed
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOutcome {
    /// HTTP status code of the final response
    pub status: u16,

    /// URL the final response came from
    pub fetched_url: Url,

    /// Response body
    pub content: String,

    /// Response headers, names lowercased
    pub headers: HashMap<String, String>,

    /// Redirect hops followed to reach `fetched_url`
    pub redirect_count: usize,
}

impl FetchOutcome {
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type").map(String::as_str)
    }

    pub fn is_html(&self) -> bool {
        self.content_type()
            .map_or(true, |ct| ct.to_ascii_lowercase().contains("text/html"))
    }
}

/// Fetches pages
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<FetchOutcome, FetchError>;
}

/// Builds an HTTP client with proper configuration
///
/// Redirects are not followed by the client; [`HttpFetcher`] follows them itself
/// so that every hop is checked.
///
/// # Example
///
/// ```no_run
/// use sumi_crawldb::config::UserAgentConfig;
/// use sumi_crawldb::crawler::build_http_client;
/// use std::time::Duration;
///
/// let config = UserAgentConfig {
///     crawler_name: "SumiCrawlDb".to_string(),
///     crawler_version: "1.0".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(&config, Duration::from_secs(30)).unwrap();
/// ```
pub fn build_http_client(
    config: &UserAgentConfig,
    timeout: Duration,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .redirect(Policy::none())
        .gzip(true)
        .brotli(true)
        .build()
}

/// [`Fetcher`] over HTTP(S)
///
/// # Request Flow
///
/// | Condition | Result |
/// |-----------|--------|
/// | Any non-3xx response | `Ok`, classified later by status code |
/// | 3xx with `Location` | Follow, up to `max_redirects` hops |
/// | 3xx without `Location` | `Ok` with the 3xx status |
/// | Redirect loop | `FetchError::Permanent` |
/// | Redirect chain > `max_redirects` | `FetchError::Permanent` |
/// | Redirect to a non-HTTP(S) URL | `FetchError::Permanent` |
/// | Timeout / connection failure | `FetchError::Transient` |
pub struct HttpFetcher {
    client: Client,
    max_redirects: usize,
}

impl HttpFetcher {
    pub fn new(client: Client, max_redirects: usize) -> Self {
        Self {
            client,
            max_redirects,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        let client = build_http_client(&config.user_agent, config.fetch.timeout())?;
        Ok(Self::new(client, config.fetch.max_redirects))
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchOutcome, FetchError> {
        let mut current = url.clone();
        let mut visited = HashSet::new();
        visited.insert(current.to_string());
        let mut redirect_count = 0;

        loop {
            let response = self
                .client
                .get(current.clone())
                .send()
                .await
                .map_err(classify_request_error)?;
            let status = response.status();

            if status.is_redirection() {
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);

                if let Some(location) = location {
                    let target = current.join(&location).map_err(|e| {
                        FetchError::Permanent(format!("bad redirect to {}: {}", location, e))
                    })?;

                    if target.scheme() != "http" && target.scheme() != "https" {
                        return Err(FetchError::Permanent(format!(
                            "redirect to unsupported URL {}",
                            target
                        )));
                    }
                    if !visited.insert(target.to_string()) {
                        return Err(FetchError::Permanent(format!(
                            "redirect loop at {}",
                            target
                        )));
                    }

                    redirect_count += 1;
                    if redirect_count > self.max_redirects {
                        return Err(FetchError::Permanent(format!(
                            "more than {} redirects",
                            self.max_redirects
                        )));
                    }

                    trace!("{} redirects to {}", current, target);
                    current = target;
                    continue;
                }
            }

            let headers = response
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
                })
                .collect();

            let content = response
                .text()
                .await
                .map_err(|e| FetchError::Transient(format!("reading body: {}", e)))?;

            debug!(
                "Fetched {} -> {} ({} bytes, {} redirects)",
                url,
                status,
                content.len(),
                redirect_count
            );

            return Ok(FetchOutcome {
                status: status.as_u16(),
                fetched_url: current,
                content,
                headers,
                redirect_count,
            });
        }
    }
}

fn classify_request_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Transient("request timeout".to_string())
    } else if e.is_connect() {
        FetchError::Transient(format!("connection failed: {}", e))
    } else if e.is_builder() {
        FetchError::Permanent(e.to_string())
    } else {
        FetchError::Transient(e.to_string())
    }
}
