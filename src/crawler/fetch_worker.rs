//! Fetch workers
//!
//! A fetch worker takes URLs off its partition's queue, fetches them, and reports
//! back: a `Started` signal as soon as it holds a URL, a `Completed` signal with the
//! classified outcome, and one discovery event per outlink (or redirect target),
//! routed to whichever partition owns it.

use crate::crawler::fetcher::{FetchError, FetchOutcome, Fetcher};
use crate::crawler::parser::LinkParser;
use crate::crawler::router::Router;
use crate::frontier::{FetchQueue, PolledUrl, QueuedUrl};
use crate::merge::{CompletionEvent, CompletionStatus, DiscoveryEvent, FetchSignal};
use crate::url::{PartitionId, UrlFilter, UrlKey, UrlNormalizer};
use crate::{CrawlDbError, Result};
use chrono::Utc;
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Scores newly discovered links
pub trait LinkScorer: Send + Sync {
    fn score(&self, link: &UrlKey, depth: u32) -> f64;
}

/// Gives every link the same score
#[derive(Debug, Clone, Copy)]
pub struct FixedScore(pub f64);

impl LinkScorer for FixedScore {
    fn score(&self, _link: &UrlKey, _depth: u32) -> f64 {
        self.0
    }
}

/// Collaborators shared by every fetch worker of a crawl
#[derive(Clone)]
pub struct FetchServices {
    pub fetcher: Arc<dyn Fetcher>,
    pub parser: Arc<dyn LinkParser>,
    pub normalizer: Arc<dyn UrlNormalizer>,
    pub filter: Arc<dyn UrlFilter>,
    pub scorer: Arc<dyn LinkScorer>,

    /// How long a host that answered 429 is left alone
    pub rate_limit_backoff: Duration,
}

/// One fetch loop serving one partition's queue
pub struct FetchWorker {
    partition: PartitionId,
    id: usize,
    queue: Arc<FetchQueue>,
    services: FetchServices,
    router: Router,
    signals: mpsc::Sender<FetchSignal>,
}

impl FetchWorker {
    pub fn new(
        partition: PartitionId,
        id: usize,
        queue: Arc<FetchQueue>,
        services: FetchServices,
        router: Router,
        signals: mpsc::Sender<FetchSignal>,
    ) -> Self {
        Self {
            partition,
            id,
            queue,
            services,
            router,
            signals,
        }
    }

    /// Fetches until the queue shuts down or `shutdown` fires
    ///
    /// A fetch in progress when `shutdown` fires is abandoned without a completion;
    /// its record is recovered by the stale-fetch timeout after a restart.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        debug!("Fetch worker {} of partition {} started", self.id, self.partition);
        let mut fetched = 0usize;

        loop {
            let polled = tokio::select! {
                _ = shutdown.cancelled() => break,
                polled = self.queue.poll() => polled,
            };
            let Some(polled) = polled else {
                break;
            };

            tokio::select! {
                _ = shutdown.cancelled() => break,
                result = self.process(polled) => match result {
                    Ok(()) => fetched += 1,
                    // The partition stopped listening: nothing left to report to
                    Err(CrawlDbError::ChannelClosed(_)) => break,
                    Err(e) => return Err(e),
                },
            }
        }

        info!(
            "Fetch worker {} of partition {} stopped after {} fetches",
            self.id, self.partition, fetched
        );
        Ok(())
    }

    /// Fetches one polled URL and reports the outcome
    pub async fn process(&self, polled: PolledUrl) -> Result<()> {
        let PolledUrl { url, permit } = polled;

        self.signal(FetchSignal::Started {
            key: url.key.clone(),
            at: Utc::now(),
        })
        .await?;

        let result = self.services.fetcher.fetch(url.key.url()).await;
        let status = match result {
            Ok(outcome) => self.classify(&url, outcome).await?,
            Err(FetchError::Transient(message)) => CompletionStatus::TransientError(message),
            Err(FetchError::Permanent(message)) => CompletionStatus::PermanentError {
                status: None,
                message,
            },
        };
        drop(permit);

        trace!("{} {}", url.key, status);
        self.signal(FetchSignal::Completed(CompletionEvent {
            key: url.key,
            status,
            at: Utc::now(),
        }))
        .await
    }

    /// Maps a response to a completion, discovering its links along the way
    ///
    /// | Response | Completion |
    /// |----------|------------|
    /// | 2xx at the requested key | `Fetched`, outlinks discovered |
    /// | 2xx after redirects to another key | `Redirected`, target discovered |
    /// | 429 | transient error, host backed off |
    /// | 408, 5xx | transient error |
    /// | anything else | permanent error |
    async fn classify(&self, url: &QueuedUrl, outcome: FetchOutcome) -> Result<CompletionStatus> {
        let code = outcome.status;

        if (200..300).contains(&code) {
            let landed = self.services.normalizer.normalize(outcome.fetched_url.as_str());
            return match landed {
                Ok(target) if target != url.key => {
                    self.discover(target.clone(), url.score, url.depth).await?;
                    Ok(CompletionStatus::Redirected { target })
                }
                _ => {
                    if outcome.is_html() {
                        self.discover_links(url, &outcome).await?;
                    }
                    Ok(CompletionStatus::Fetched)
                }
            };
        }

        let reason = StatusCode::from_u16(code)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("unknown status");

        Ok(match code {
            429 => {
                self.queue
                    .gate()
                    .penalize(url.key.host(), self.services.rate_limit_backoff);
                warn!(
                    "{} rate limited us; backing off for {:?}",
                    url.key.host(),
                    self.services.rate_limit_backoff
                );
                CompletionStatus::TransientError(format!("HTTP {} {}", code, reason))
            }
            408 | 500..=599 => CompletionStatus::TransientError(format!("HTTP {} {}", code, reason)),
            _ => CompletionStatus::PermanentError {
                status: Some(code),
                message: reason.to_string(),
            },
        })
    }

    async fn discover_links(&self, url: &QueuedUrl, outcome: &FetchOutcome) -> Result<()> {
        let links = self
            .services
            .parser
            .extract_links(&outcome.fetched_url, &outcome.content);
        let depth = url.depth.saturating_add(1);

        for link in links {
            match self.services.normalizer.normalize(&link) {
                Ok(key) => {
                    let score = self.services.scorer.score(&key, depth);
                    self.discover(key, score, depth).await?;
                }
                Err(e) => trace!("Skipping link {}: {}", link, e),
            }
        }
        Ok(())
    }

    async fn discover(&self, key: UrlKey, score: f64, depth: u32) -> Result<()> {
        if !self.services.filter.accept(&key) {
            trace!("Filtered out {}", key);
            return Ok(());
        }
        self.router
            .route(DiscoveryEvent { key, score, depth })
            .await
            .map(|_| ())
    }

    async fn signal(&self, signal: FetchSignal) -> Result<()> {
        self.signals
            .send(signal)
            .await
            .map_err(|_| CrawlDbError::ChannelClosed(self.partition.index()))
    }
}
