/// Crawl status definitions
///
/// A URL moves through these statuses once per fetch cycle. The only way back to
/// the start of a cycle is a recrawl after `next_fetch_time`, or losing a queue slot.
use std::fmt;

/// Represents where a URL is in its fetch cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrawlStatus {
    // ===== Pending States =====
    /// Known but not waiting in the fetch queue
    Unfetched,

    /// Waiting in the fetch queue
    Queued,

    /// Handed to a fetcher, no outcome yet
    Fetching,

    // ===== Outcome States =====
    /// Fetched successfully
    Fetched,

    /// Last fetch failed; retried or recrawled once `next_fetch_time` passes
    Error,

    /// robots.txt forbids fetching this URL
    RobotsDenied,

    /// Fetch ended at a different URL, which was discovered in its place
    Redirected,

    /// Gave up after too many transient failures
    Skipped,
}

impl CrawlStatus {
    /// Returns true for outcomes that become fetchable again after `next_fetch_time`
    pub fn is_recrawlable(&self) -> bool {
        matches!(self, Self::Fetched | Self::Error | Self::Redirected)
    }

    /// Returns true for statuses no event can move a URL out of except a completion
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::RobotsDenied | Self::Skipped)
    }

    /// Returns true while the URL is held by the queue or a fetcher
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Queued | Self::Fetching)
    }

    /// Checks a transition against the fetch-cycle order
    ///
    /// Staying in the same status is always allowed. `Unfetched` can jump straight
    /// to `RobotsDenied` because robots rules are checked before queueing, and a
    /// lost queue slot sends `Queued` back to `Unfetched`.
    pub fn can_transition_to(&self, next: CrawlStatus) -> bool {
        use CrawlStatus::*;

        if *self == next {
            return true;
        }

        match self {
            Unfetched => matches!(next, Queued | RobotsDenied),
            Queued => matches!(next, Fetching | Unfetched),
            Fetching => matches!(next, Fetched | Error | RobotsDenied | Redirected | Skipped),
            Fetched | Redirected => matches!(next, Unfetched | Queued),
            Error => matches!(next, Unfetched | Queued | Skipped),
            RobotsDenied | Skipped => false,
        }
    }

    /// Converts the status to its persisted string form
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Unfetched => "unfetched",
            Self::Queued => "queued",
            Self::Fetching => "fetching",
            Self::Fetched => "fetched",
            Self::Error => "error",
            Self::RobotsDenied => "robots_denied",
            Self::Redirected => "redirected",
            Self::Skipped => "skipped",
        }
    }

    /// Parses a status from its persisted string form
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "unfetched" => Some(Self::Unfetched),
            "queued" => Some(Self::Queued),
            "fetching" => Some(Self::Fetching),
            "fetched" => Some(Self::Fetched),
            "error" => Some(Self::Error),
            "robots_denied" => Some(Self::RobotsDenied),
            "redirected" => Some(Self::Redirected),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }

    /// Returns all statuses
    pub fn all_states() -> Vec<Self> {
        vec![
            Self::Unfetched,
            Self::Queued,
            Self::Fetching,
            Self::Fetched,
            Self::Error,
            Self::RobotsDenied,
            Self::Redirected,
            Self::Skipped,
        ]
    }
}

impl fmt::Display for CrawlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
