//! Per-feed poll cadence and counters.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

/// The four polled feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Feed {
    Case,
    Price,
    History,
    News,
}

impl Feed {
    pub const ALL: [Feed; 4] = [Feed::Case, Feed::Price, Feed::History, Feed::News];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Feed::Case => "case",
            Feed::Price => "price",
            Feed::History => "history",
            Feed::News => "news",
        }
    }
}

impl std::fmt::Display for Feed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Minimum refetch interval and the time of the last poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedSchedule {
    interval: Duration,
    last_poll: Option<Instant>,
}

impl FeedSchedule {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_poll: None,
        }
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    #[must_use]
    pub fn last_poll(&self) -> Option<Instant> {
        self.last_poll
    }

    /// The first poll is always due.
    #[must_use]
    pub fn is_due(&self, now: Instant) -> bool {
        match self.last_poll {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        }
    }

    pub fn mark(&mut self, now: Instant) {
        self.last_poll = Some(now);
    }
}

/// Poll counters for one feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PollStats {
    pub attempts: u64,
    pub failures: u64,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl PollStats {
    pub fn record_success(&mut self) {
        self.attempts += 1;
        self.last_success = Some(Utc::now());
    }

    pub fn record_failure(&mut self, error: impl ToString) {
        self.attempts += 1;
        self.failures += 1;
        self.last_error = Some(error.to_string());
    }

    /// Fraction of attempts that failed.
    #[must_use]
    pub fn failure_rate(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.failures as f64 / self.attempts as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_poll_is_due() {
        let schedule = FeedSchedule::new(Duration::from_millis(500));
        assert!(schedule.is_due(Instant::now()));
    }

    #[test]
    fn test_interval_gating() {
        let start = Instant::now();
        let mut schedule = FeedSchedule::new(Duration::from_millis(500));
        schedule.mark(start);

        assert!(!schedule.is_due(start));
        assert!(!schedule.is_due(start + Duration::from_millis(499)));
        assert!(schedule.is_due(start + Duration::from_millis(500)));
    }

    #[test]
    fn test_clock_going_backwards_is_not_due() {
        let start = Instant::now() + Duration::from_secs(10);
        let mut schedule = FeedSchedule::new(Duration::from_millis(500));
        schedule.mark(start);

        assert!(!schedule.is_due(start - Duration::from_secs(5)));
    }

    #[test]
    fn test_poll_stats_counters() {
        let mut stats = PollStats::default();
        assert_eq!(stats.failure_rate(), 0.0);

        stats.record_success();
        stats.record_failure("timeout");
        assert_eq!(stats.attempts, 2);
        assert_eq!(stats.failures, 1);
        assert!(stats.last_success.is_some());
        assert_eq!(stats.last_error.as_deref(), Some("timeout"));
        assert_eq!(stats.failure_rate(), 0.5);
    }
}
