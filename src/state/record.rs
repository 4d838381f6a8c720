use crate::state::CrawlStatus;
use chrono::{DateTime, Duration, Utc};

/// Everything known about one URL
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlRecord {
    pub status: CrawlStatus,

    /// Priority; higher scores are fetched sooner
    pub score: f64,

    pub last_fetch_time: Option<DateTime<Utc>>,

    /// Earliest time a recrawlable record becomes eligible again
    pub next_fetch_time: Option<DateTime<Utc>>,

    /// Consecutive failed fetches
    pub attempts: u32,

    /// Hops from the nearest seed
    pub discovered_depth: u32,

    /// When the record entered `Fetching`
    pub fetch_started_at: Option<DateTime<Utc>>,
}

impl CrawlRecord {
    /// Creates the record of a freshly discovered URL
    pub fn discovered(score: f64, depth: u32) -> Self {
        Self {
            status: CrawlStatus::Unfetched,
            score,
            last_fetch_time: None,
            next_fetch_time: None,
            attempts: 0,
            discovered_depth: depth,
            fetch_started_at: None,
        }
    }

    /// Returns true if the record may be offered to the fetch queue at `now`
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            CrawlStatus::Unfetched => true,
            status if status.is_recrawlable() => self.recrawl_due(now),
            _ => false,
        }
    }

    /// Returns true once `next_fetch_time` has passed; a missing time counts as due
    pub fn recrawl_due(&self, now: DateTime<Utc>) -> bool {
        self.next_fetch_time.map_or(true, |next| next <= now)
    }

    /// Returns true if the record has been `Fetching` for longer than `timeout`
    pub fn is_stale_fetch(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        self.status == CrawlStatus::Fetching
            && self
                .fetch_started_at
                .map_or(true, |started| now - started > timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discovered_is_eligible() {
        let record = CrawlRecord::discovered(2.0, 1);
        assert_eq!(record.status, CrawlStatus::Unfetched);
        assert!(record.is_eligible(Utc::now()));
    }

    #[test]
    fn test_recrawl_waits_for_next_fetch_time() {
        let now = Utc::now();
        let mut record = CrawlRecord::discovered(1.0, 0);
        record.status = CrawlStatus::Fetched;
        record.next_fetch_time = Some(now + Duration::seconds(10));

        assert!(!record.is_eligible(now));
        assert!(record.is_eligible(now + Duration::seconds(10)));
    }

    #[test]
    fn test_in_flight_and_terminal_not_eligible() {
        let now = Utc::now();
        for status in [
            CrawlStatus::Queued,
            CrawlStatus::Fetching,
            CrawlStatus::RobotsDenied,
            CrawlStatus::Skipped,
        ] {
            let mut record = CrawlRecord::discovered(1.0, 0);
            record.status = status;
            record.next_fetch_time = Some(now - Duration::seconds(1));
            assert!(!record.is_eligible(now), "{} should not be eligible", status);
        }
    }

    #[test]
    fn test_stale_fetch() {
        let now = Utc::now();
        let mut record = CrawlRecord::discovered(1.0, 0);
        record.status = CrawlStatus::Fetching;
        record.fetch_started_at = Some(now - Duration::seconds(30));

        assert!(!record.is_stale_fetch(now, Duration::seconds(60)));
        assert!(record.is_stale_fetch(now, Duration::seconds(10)));

        record.status = CrawlStatus::Fetched;
        assert!(!record.is_stale_fetch(now, Duration::seconds(10)));
    }
}
