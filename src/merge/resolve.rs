//! Deterministic update resolution
//!
//! Updates for the same URL arrive in no particular order. They are first
//! collapsed into one [`CollapsedUpdate`] per key, whose result does not depend on
//! arrival order, and then resolved against the stored record.

use crate::config::MergeConfig;
use crate::merge::event::{CompletionStatus, UrlUpdate};
use crate::state::{CrawlRecord, CrawlStatus};
use crate::url::UrlKey;
use chrono::{DateTime, Duration, Utc};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Everything a batch says about one URL
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollapsedUpdate {
    /// Highest score and lowest depth among the discoveries
    pub discovery: Option<(f64, u32)>,

    /// Earliest fetch start
    pub started: Option<DateTime<Utc>>,

    /// Highest-ranked completion, latest first among equals
    pub completion: Option<(CompletionStatus, DateTime<Utc>)>,
}

impl CollapsedUpdate {
    pub fn absorb(&mut self, update: UrlUpdate) {
        match update {
            UrlUpdate::Discovered { score, depth } => {
                self.discovery = Some(match self.discovery {
                    Some((s, d)) => (max_score(s, score), d.min(depth)),
                    None => (score, depth),
                });
            }
            UrlUpdate::Started { at } => {
                self.started = Some(self.started.map_or(at, |s| s.min(at)));
            }
            UrlUpdate::Completed { status, at } => {
                let replace = match &self.completion {
                    Some((current, current_at)) => {
                        compare_completions((&status, at), (current, *current_at))
                            == Ordering::Greater
                    }
                    None => true,
                };
                if replace {
                    self.completion = Some((status, at));
                }
            }
        }
    }
}

/// Groups a drained buffer by key
///
/// The map is ordered by key, so the merge also visits keys in a fixed order.
pub fn collapse(updates: Vec<(UrlKey, UrlUpdate)>) -> BTreeMap<UrlKey, CollapsedUpdate> {
    let mut collapsed: BTreeMap<UrlKey, CollapsedUpdate> = BTreeMap::new();
    for (key, update) in updates {
        collapsed.entry(key).or_default().absorb(update);
    }
    collapsed
}

/// Orders completions by rank, then time, then detail
fn compare_completions(
    a: (&CompletionStatus, DateTime<Utc>),
    b: (&CompletionStatus, DateTime<Utc>),
) -> Ordering {
    a.0.rank()
        .cmp(&b.0.rank())
        .then(a.1.cmp(&b.1))
        .then_with(|| a.0.detail().cmp(&b.0.detail()))
}

fn max_score(a: f64, b: f64) -> f64 {
    match a.total_cmp(&b) {
        Ordering::Less => b,
        _ => a,
    }
}

/// The record a collapsed update produces
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub record: CrawlRecord,

    /// Status before the update; None if the record is new
    pub previous: Option<CrawlStatus>,
}

impl Resolution {
    pub fn is_new(&self) -> bool {
        self.previous.is_none()
    }
}

/// Resolves a collapsed update against the stored record
///
/// Returns None when the update changes nothing, which is the case for a fetch
/// start on an unknown URL.
///
/// - A completion always sets the outcome, whatever the stored status
/// - A fetch start moves `Queued` or `Unfetched` to `Fetching` and is ignored otherwise
/// - A discovery raises the score and lowers the depth; it only restarts the
///   fetch cycle of a finished record whose recrawl time has come
pub fn resolve(
    existing: Option<&CrawlRecord>,
    update: &CollapsedUpdate,
    config: &MergeConfig,
    now: DateTime<Utc>,
) -> Option<Resolution> {
    let previous = existing.map(|r| r.status);

    let mut record = match (existing, update.discovery, &update.completion) {
        (Some(record), _, _) => record.clone(),
        (None, Some((score, depth)), _) => CrawlRecord::discovered(score, depth),
        (None, None, Some(_)) => CrawlRecord::discovered(config.default_score, 0),
        (None, None, None) => return None,
    };

    if let Some((status, at)) = &update.completion {
        apply_completion(&mut record, status, *at, config);
    } else if let Some(at) = update.started {
        if matches!(record.status, CrawlStatus::Queued | CrawlStatus::Unfetched) {
            record.status = CrawlStatus::Fetching;
            record.fetch_started_at = Some(at);
        }
    }

    if let (Some(_), Some((score, depth))) = (existing, update.discovery) {
        record.score = max_score(record.score, score);
        record.discovered_depth = record.discovered_depth.min(depth);

        // A fresh outcome in this batch is never undone by a rediscovery
        if update.completion.is_none()
            && record.status.is_recrawlable()
            && record.recrawl_due(now)
        {
            record.status = CrawlStatus::Unfetched;
        }
    }

    Some(Resolution { record, previous })
}

/// Applies a fetch outcome to a record
pub fn apply_completion(
    record: &mut CrawlRecord,
    status: &CompletionStatus,
    at: DateTime<Utc>,
    config: &MergeConfig,
) {
    record.fetch_started_at = None;

    match status {
        CompletionStatus::Fetched | CompletionStatus::Redirected { .. } => {
            record.status = match status {
                CompletionStatus::Fetched => CrawlStatus::Fetched,
                _ => CrawlStatus::Redirected,
            };
            record.last_fetch_time = Some(at);
            record.next_fetch_time = Some(after(at, config.recrawl_interval()));
            record.attempts = 0;
        }
        CompletionStatus::RobotsDenied => {
            record.status = CrawlStatus::RobotsDenied;
            record.next_fetch_time = None;
        }
        CompletionStatus::TransientError(_) => {
            record_failure(record, at, config.retry_delay(), config);
        }
        CompletionStatus::PermanentError { .. } => {
            record_failure(record, at, config.recrawl_interval(), config);
        }
    }
}

/// Counts a failed attempt; the URL is skipped for good once `max_attempts` is reached
fn record_failure(
    record: &mut CrawlRecord,
    at: DateTime<Utc>,
    retry_after: Duration,
    config: &MergeConfig,
) {
    record.attempts = record.attempts.saturating_add(1);
    record.last_fetch_time = Some(at);
    if record.attempts >= config.max_attempts {
        record.status = CrawlStatus::Skipped;
        record.next_fetch_time = None;
    } else {
        record.status = CrawlStatus::Error;
        record.next_fetch_time = Some(after(at, retry_after));
    }
}

fn after(at: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    at.checked_add_signed(delay)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
