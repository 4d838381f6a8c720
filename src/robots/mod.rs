//! Robots.txt handling module
//!
//! The merge consults a [`RobotsPolicy`] before queueing a URL; a denied URL is
//! recorded as `RobotsDenied` and never fetched.

mod cache;
mod parser;

pub use cache::{CachedRobots, RobotsCache, DEFAULT_ROBOTS_TTL_HOURS};
pub use parser::ParsedRobots;

use crate::config::Config;
use crate::url::UrlKey;
use async_trait::async_trait;
use reqwest::{redirect::Policy, Client};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};
use url::Url;

/// Decides whether a URL may be fetched at all
#[async_trait]
pub trait RobotsPolicy: Send + Sync {
    async fn is_allowed(&self, key: &UrlKey) -> bool;
}

/// Policy that allows every URL
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

/// The allow-everything policy
pub const ALLOW_ALL: AllowAll = AllowAll;

#[async_trait]
impl RobotsPolicy for AllowAll {
    async fn is_allowed(&self, _key: &UrlKey) -> bool {
        true
    }
}

/// Policy backed by each site's robots.txt
///
/// robots.txt is fetched once per origin and cached for 24 hours. A robots.txt
/// that is missing, unreachable or answers with an error allows everything.
pub struct RobotsTxtPolicy {
    client: Client,
    agent: String,
    cache: Mutex<RobotsCache>,
}

impl RobotsTxtPolicy {
    /// Creates a policy matching rules against the `agent` product token
    pub fn new(client: Client, agent: impl Into<String>) -> Self {
        Self {
            client,
            agent: agent.into(),
            cache: Mutex::new(RobotsCache::default()),
        }
    }

    /// Builds a policy with its own HTTP client from the configuration
    ///
    /// Unlike page fetches, robots.txt redirects are followed by the client.
    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(config.user_agent.header_value())
            .timeout(config.fetch.timeout())
            .redirect(Policy::limited(5))
            .build()?;
        Ok(Self::new(client, config.user_agent.crawler_name.clone()))
    }

    /// Returns the robots.txt rules governing `url`, fetching them if needed
    pub async fn robots_for(&self, url: &Url) -> ParsedRobots {
        let origin = url.origin().ascii_serialization();

        let cached = self.lock_cache().get(&origin).cloned();
        if let Some(robots) = cached {
            return robots;
        }

        // Fetched without holding the lock; a race only costs a second fetch
        let robots = self.fetch(&origin).await;
        self.lock_cache().insert(origin, robots.clone());
        robots
    }

    async fn fetch(&self, origin: &str) -> ParsedRobots {
        let robots_url = format!("{}/robots.txt", origin);

        let response = match self.client.get(&robots_url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("Could not fetch {}: {}; allowing all", robots_url, e);
                return ParsedRobots::allow_all();
            }
        };

        let status = response.status();
        if !status.is_success() {
            debug!("{} answered {}; allowing all", robots_url, status);
            return ParsedRobots::allow_all();
        }

        match response.text().await {
            Ok(body) => {
                debug!("Fetched {} ({} bytes)", robots_url, body.len());
                ParsedRobots::from_content(&body)
            }
            Err(e) => {
                warn!("Could not read {}: {}; allowing all", robots_url, e);
                ParsedRobots::allow_all()
            }
        }
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, RobotsCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl RobotsPolicy for RobotsTxtPolicy {
    async fn is_allowed(&self, key: &UrlKey) -> bool {
        self.robots_for(key.url())
            .await
            .is_allowed(key.as_str(), &self.agent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn policy() -> RobotsTxtPolicy {
        RobotsTxtPolicy::new(Client::new(), "TestBot")
    }

    fn key(server: &MockServer, p: &str) -> UrlKey {
        UrlKey::parse(&format!("{}{}", server.uri(), p)).unwrap()
    }

    #[tokio::test]
    async fn test_allow_all_constant() {
        let key = UrlKey::parse("http://a.com/anything").unwrap();
        assert!(ALLOW_ALL.is_allowed(&key).await);
    }

    #[tokio::test]
    async fn test_disallowed_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private\n"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let policy = policy();
        assert!(!policy.is_allowed(&key(&server, "/private/x")).await);
        assert!(policy.is_allowed(&key(&server, "/public")).await);
        // Second lookup served from the cache (`expect(1)` is checked on drop)
    }

    #[tokio::test]
    async fn test_missing_robots_allows_all() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        assert!(policy().is_allowed(&key(&server, "/private")).await);
    }

    #[tokio::test]
    async fn test_server_error_allows_all() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        assert!(policy().is_allowed(&key(&server, "/x")).await);
    }

    #[tokio::test]
    async fn test_unreachable_host_allows_all() {
        let key = UrlKey::parse("http://127.0.0.1:9/page").unwrap();
        assert!(policy().is_allowed(&key).await);
    }
}
