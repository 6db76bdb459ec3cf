//! Error types for candle aggregation and feed polling.
//!
//! Errors are split by boundary: [`FeedError`] is raised by the data sources
//! (network, payload, unknown ticker), [`CandleError`] by the aggregator
//! (which performs no I/O), and [`ControllerError`] by the lifecycle
//! controller when the case-clock policy makes a failure fatal.

use thiserror::Error;

/// Errors raised at a data source boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeedError {
    /// Network failure (connection refused, reset, DNS).
    #[error("transport error: {0}")]
    Transport(String),

    /// Request exceeded the transport timeout.
    #[error("request timeout: {0}")]
    Timeout(String),

    /// Server answered with a non-success status.
    #[error("HTTP error: {status} - {message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// Requested ticker is not listed by the server.
    #[error("ticker not found: {ticker}")]
    TickerNotFound {
        /// The ticker that was requested.
        ticker: String,
    },

    /// Response body could not be decoded into the expected shape.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl FeedError {
    /// Creates an HTTP status error.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    /// Creates a ticker not found error.
    pub fn ticker_not_found(ticker: impl Into<String>) -> Self {
        Self::TickerNotFound {
            ticker: ticker.into(),
        }
    }

    /// Returns true if retrying on a later cycle may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout(_) => true,
            Self::Http { status, .. } => *status >= 500 || *status == 429,
            Self::TickerNotFound { .. } | Self::Malformed(_) => false,
        }
    }
}

/// Errors raised by the candle aggregator. State is never mutated when one
/// of these is returned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CandleError {
    /// Price or position is missing or not finite, or an OHLC row is
    /// internally inconsistent.
    #[error("invalid sample: {0}")]
    InvalidSample(String),

    /// Sample belongs to a bucket before the current (last) candle.
    #[error("sample at position {position} maps to bucket {bucket}, before current bucket {current}")]
    OutOfOrderSample {
        /// Position of the rejected sample.
        position: f64,
        /// Bucket the sample maps to.
        bucket: i64,
        /// Bucket of the last candle in the series.
        current: i64,
    },

    /// Batch rows are not sorted ascending by position.
    #[error("rows not sorted by position at index {index}")]
    UnsortedRows {
        /// Index of the first row whose position is below its predecessor.
        index: usize,
    },

    /// Bucket width must be at least one position unit.
    #[error("granularity must be at least 1, got {0}")]
    InvalidGranularity(u32),
}

impl CandleError {
    /// Creates an invalid sample error.
    pub fn invalid_sample(reason: impl Into<String>) -> Self {
        Self::InvalidSample(reason.into())
    }
}

/// Errors that stop the lifecycle controller.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ControllerError {
    /// Case poll failed under the fatal failure policy.
    #[error("case poll failed: {0}")]
    CaseFetch(#[source] FeedError),
}

/// Errors from a history reconciliation pass.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HistoryError {
    /// Fetching rows from the history source failed.
    #[error(transparent)]
    Feed(#[from] FeedError),

    /// Rebuilding the series from normalized rows failed.
    #[error(transparent)]
    Candle(#[from] CandleError),
}

impl HistoryError {
    /// Returns true if the next reconciliation may succeed without changes.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Feed(err) => err.is_transient(),
            Self::Candle(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_error_transient_classification() {
        assert!(FeedError::Transport("reset".to_string()).is_transient());
        assert!(FeedError::Timeout("2s".to_string()).is_transient());
        assert!(FeedError::http(503, "busy").is_transient());
        assert!(FeedError::http(429, "slow down").is_transient());
        assert!(!FeedError::http(404, "missing").is_transient());
        assert!(!FeedError::ticker_not_found("CRZY").is_transient());
        assert!(!FeedError::Malformed("not json".to_string()).is_transient());
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            FeedError::ticker_not_found("CRZY").to_string(),
            "ticker not found: CRZY"
        );
        assert_eq!(
            CandleError::UnsortedRows { index: 3 }.to_string(),
            "rows not sorted by position at index 3"
        );
        assert_eq!(
            ControllerError::CaseFetch(FeedError::Timeout("case".to_string())).to_string(),
            "case poll failed: request timeout: case"
        );
    }

    #[test]
    fn test_history_error_from_feed() {
        let err: HistoryError = FeedError::ticker_not_found("RTM").into();
        assert!(matches!(err, HistoryError::Feed(FeedError::TickerNotFound { .. })));
    }

    #[test]
    fn test_history_error_transient_follows_feed() {
        assert!(HistoryError::from(FeedError::http(502, "bad gateway")).is_transient());
        assert!(!HistoryError::from(FeedError::ticker_not_found("RTM")).is_transient());
        assert!(!HistoryError::from(CandleError::InvalidGranularity(0)).is_transient());
    }
}
