use crate::url::UrlKey;
use chrono::{DateTime, Utc};
use std::fmt;

/// A URL found by a seed, a parsed page or a redirect
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryEvent {
    pub key: UrlKey,
    pub score: f64,
    pub depth: u32,
}

/// How a fetch ended
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionStatus {
    Fetched,

    /// The fetch ended at `target`, which is discovered separately
    Redirected { target: UrlKey },

    RobotsDenied,

    /// Worth retrying: timeouts, 408/429/5xx, connection failures
    TransientError(String),

    /// Not worth retrying soon: other 4xx, unusable redirects
    PermanentError { status: Option<u16>, message: String },
}

impl CompletionStatus {
    /// Precedence when several outcomes for one URL land in the same batch
    ///
    /// `Fetched > Redirected > RobotsDenied > PermanentError > TransientError`
    pub fn rank(&self) -> u8 {
        match self {
            Self::Fetched => 4,
            Self::Redirected { .. } => 3,
            Self::RobotsDenied => 2,
            Self::PermanentError { .. } => 1,
            Self::TransientError(_) => 0,
        }
    }

    /// Text used only to order otherwise identical outcomes
    pub(crate) fn detail(&self) -> String {
        match self {
            Self::Fetched | Self::RobotsDenied => String::new(),
            Self::Redirected { target } => target.to_string(),
            Self::TransientError(message) => message.clone(),
            Self::PermanentError { status, message } => {
                format!("{:03} {}", status.unwrap_or(0), message)
            }
        }
    }
}

impl fmt::Display for CompletionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fetched => write!(f, "fetched"),
            Self::Redirected { target } => write!(f, "redirected to {}", target),
            Self::RobotsDenied => write!(f, "denied by robots.txt"),
            Self::TransientError(message) => write!(f, "transient error: {}", message),
            Self::PermanentError {
                status: Some(status),
                message,
            } => write!(f, "permanent error (HTTP {}): {}", status, message),
            Self::PermanentError {
                status: None,
                message,
            } => write!(f, "permanent error: {}", message),
        }
    }
}

/// The outcome of one fetch
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionEvent {
    pub key: UrlKey,
    pub status: CompletionStatus,
    pub at: DateTime<Utc>,
}

/// Progress reports from fetch workers
#[derive(Debug, Clone, PartialEq)]
pub enum FetchSignal {
    /// A fetch worker took the URL off the queue
    Started { key: UrlKey, at: DateTime<Utc> },
    Completed(CompletionEvent),
}

impl FetchSignal {
    pub fn key(&self) -> &UrlKey {
        match self {
            Self::Started { key, .. } => key,
            Self::Completed(event) => &event.key,
        }
    }
}

/// A change waiting in the merge buffer
#[derive(Debug, Clone, PartialEq)]
pub enum UrlUpdate {
    Discovered { score: f64, depth: u32 },
    Started { at: DateTime<Utc> },
    Completed { status: CompletionStatus, at: DateTime<Utc> },
}

impl From<DiscoveryEvent> for (UrlKey, UrlUpdate) {
    fn from(event: DiscoveryEvent) -> Self {
        (
            event.key,
            UrlUpdate::Discovered {
                score: event.score,
                depth: event.depth,
            },
        )
    }
}

impl From<FetchSignal> for (UrlKey, UrlUpdate) {
    fn from(signal: FetchSignal) -> Self {
        match signal {
            FetchSignal::Started { key, at } => (key, UrlUpdate::Started { at }),
            FetchSignal::Completed(event) => (
                event.key,
                UrlUpdate::Completed {
                    status: event.status,
                    at: event.at,
                },
            ),
        }
    }
}
