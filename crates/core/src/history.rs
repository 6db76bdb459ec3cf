//! History reconciliation and the per-series candle cache.
//!
//! Each reconciliation fetches the authoritative rows for a ticker,
//! normalizes them, and rebuilds every cached granularity of that ticker
//! from scratch. Cache entries are replaced wholesale, never merged; the row
//! count is bounded by the optional fetch cap.

use crate::aggregator::CandleAggregator;
use crate::candle::{CandleSeries, HistoryRow, PriceSample};
use crate::error::{CandleError, HistoryError};
use crate::normalize::{normalize_history, NormalizedHistory};
use crate::traits::HistorySource;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Cache key: one chart is one ticker at one candle width.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeriesKey {
    pub ticker: String,
    pub granularity: u32,
}

impl SeriesKey {
    pub fn new(ticker: impl Into<String>, granularity: u32) -> Self {
        Self {
            ticker: ticker.into(),
            granularity,
        }
    }
}

impl std::fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.ticker, self.granularity)
    }
}

/// Cached candles for one key plus the last observation folded into them.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryCacheEntry {
    aggregator: CandleAggregator,
    last_price: Option<f64>,
    last_position_seen: Option<f64>,
}

impl HistoryCacheEntry {
    /// Empty entry for a granularity.
    ///
    /// # Errors
    /// Returns `InvalidGranularity` for a zero granularity.
    pub fn empty(granularity: u32) -> Result<Self, CandleError> {
        Ok(Self {
            aggregator: CandleAggregator::new(granularity)?,
            last_price: None,
            last_position_seen: None,
        })
    }

    /// Builds an entry from normalized history.
    ///
    /// # Errors
    /// See [`CandleAggregator::ingest_batch`].
    pub fn from_history(history: &NormalizedHistory, granularity: u32) -> Result<Self, CandleError> {
        let mut entry = Self::empty(granularity)?;
        entry.aggregator.ingest_batch(&history.rows)?;
        entry.last_price = history.last().map(HistoryRow::close);
        entry.last_position_seen = history.last().map(HistoryRow::position);
        Ok(entry)
    }

    #[must_use]
    pub fn candles(&self) -> &CandleSeries {
        self.aggregator.series()
    }

    #[must_use]
    pub fn granularity(&self) -> u32 {
        self.aggregator.granularity()
    }

    /// Close of the last row or sample, `None` before any data.
    #[must_use]
    pub fn last_price(&self) -> Option<f64> {
        self.last_price
    }

    #[must_use]
    pub fn last_position_seen(&self) -> Option<f64> {
        self.last_position_seen
    }

    /// Folds a live sample into the entry.
    ///
    /// # Errors
    /// See [`CandleAggregator::ingest`]; the entry is unchanged on error.
    pub fn record(&mut self, sample: PriceSample) -> Result<(), CandleError> {
        self.aggregator.ingest(sample)?;
        self.last_price = Some(sample.price);
        self.last_position_seen = Some(sample.position);
        Ok(())
    }
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileStats {
    /// Rows used after normalization
    pub rows: usize,
    /// Rows dropped as malformed
    pub skipped: usize,
    /// Entries replaced
    pub entries: usize,
    /// Keys that could not be rebuilt; their previous entries are kept
    pub failed: Vec<(SeriesKey, CandleError)>,
}

/// Rebuilds cached series from authoritative history.
pub struct HistoryReconciler {
    source: Arc<dyn HistorySource>,
    limit: Option<u32>,
    cache: HashMap<SeriesKey, HistoryCacheEntry>,
}

impl HistoryReconciler {
    /// Creates a reconciler; `limit` caps the rows requested per fetch.
    pub fn new(source: Arc<dyn HistorySource>, limit: Option<u32>) -> Self {
        Self {
            source,
            limit,
            cache: HashMap::new(),
        }
    }

    #[must_use]
    pub fn entry(&self, key: &SeriesKey) -> Option<&HistoryCacheEntry> {
        self.cache.get(key)
    }

    /// Returns true if the key has at least one cached candle.
    #[must_use]
    pub fn has_candles(&self, key: &SeriesKey) -> bool {
        self.cache
            .get(key)
            .is_some_and(|entry| !entry.candles().is_empty())
    }

    /// Fetches history for `ticker` and rebuilds one entry per granularity.
    ///
    /// # Errors
    /// Returns the source error (previous entries are kept), or the first
    /// candle error when no granularity could be rebuilt. Partial failures
    /// are listed in [`ReconcileStats::failed`].
    pub async fn reconcile(
        &mut self,
        ticker: &str,
        granularities: &[u32],
    ) -> Result<ReconcileStats, HistoryError> {
        let payload = self.source.history(ticker, self.limit).await?;
        let history = normalize_history(&payload);

        if history.skipped > 0 {
            tracing::debug!(
                "{}: skipped {} malformed history rows",
                ticker,
                history.skipped
            );
        }

        let stats = self.rebuild(ticker, granularities, &history);
        if stats.entries == 0 {
            if let Some((_, err)) = stats.failed.first() {
                return Err(err.clone().into());
            }
        }

        tracing::debug!(
            "{}: reconciled {} rows into {} series",
            ticker,
            stats.rows,
            stats.entries
        );
        Ok(stats)
    }

    /// Replaces the entries for `ticker` from already normalized rows.
    ///
    /// Each granularity is built on its own: a failing key keeps its
    /// previous entry and is reported, the others are still replaced.
    pub fn rebuild(
        &mut self,
        ticker: &str,
        granularities: &[u32],
        history: &NormalizedHistory,
    ) -> ReconcileStats {
        let mut stats = ReconcileStats {
            rows: history.rows.len(),
            skipped: history.skipped,
            ..ReconcileStats::default()
        };

        for &granularity in granularities {
            let key = SeriesKey::new(ticker, granularity);
            match HistoryCacheEntry::from_history(history, granularity) {
                Ok(entry) => {
                    self.cache.insert(key, entry);
                    stats.entries += 1;
                }
                Err(e) => {
                    tracing::warn!("{}: failed to rebuild candles: {}", key, e);
                    stats.failed.push((key, e));
                }
            }
        }

        stats
    }

    /// Folds a live sample into the entry for `key`, creating it on first use.
    ///
    /// # Errors
    /// See [`HistoryCacheEntry::record`].
    pub fn record_sample(&mut self, key: &SeriesKey, sample: PriceSample) -> Result<(), CandleError> {
        if let Some(entry) = self.cache.get_mut(key) {
            return entry.record(sample);
        }

        let mut entry = HistoryCacheEntry::empty(key.granularity)?;
        entry.record(sample)?;
        self.cache.insert(key.clone(), entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FeedError;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Mutex;

    struct ScriptedHistory {
        responses: Mutex<Vec<Result<Value, FeedError>>>,
        limits: Mutex<Vec<Option<u32>>>,
    }

    impl ScriptedHistory {
        fn new(mut responses: Vec<Result<Value, FeedError>>) -> Arc<Self> {
            responses.reverse();
            Arc::new(Self {
                responses: Mutex::new(responses),
                limits: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl HistorySource for ScriptedHistory {
        async fn history(&self, _ticker: &str, limit: Option<u32>) -> Result<Value, FeedError> {
            self.limits.lock().unwrap().push(limit);
            self.responses
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Ok(json!([])))
        }
    }

    fn price_rows(points: &[(i64, f64)]) -> Value {
        Value::Array(
            points
                .iter()
                .map(|(tick, price)| json!({"tick": tick, "price": price}))
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_reconcile_builds_every_granularity() {
        let source = ScriptedHistory::new(vec![Ok(price_rows(&[
            (0, 10.0),
            (3, 12.0),
            (9, 9.0),
            (11, 15.0),
            (21, 15.0),
        ]))]);
        let mut reconciler = HistoryReconciler::new(source.clone(), Some(500));

        let stats = reconciler.reconcile("CRZY", &[10, 5]).await.unwrap();
        assert_eq!(stats.rows, 5);
        assert_eq!(stats.entries, 2);
        assert_eq!(source.limits.lock().unwrap().as_slice(), &[Some(500)]);

        let ten = reconciler.entry(&SeriesKey::new("CRZY", 10)).unwrap();
        assert_eq!(ten.candles().len(), 3);
        assert_eq!(ten.last_price(), Some(15.0));
        assert_eq!(ten.last_position_seen(), Some(21.0));

        let five = reconciler.entry(&SeriesKey::new("CRZY", 5)).unwrap();
        assert_eq!(five.candles().len(), 4);
    }

    #[tokio::test]
    async fn test_reconcile_sorts_unordered_feed() {
        let source = ScriptedHistory::new(vec![
            Ok(price_rows(&[(21, 15.0), (0, 10.0), (11, 15.0), (9, 9.0), (3, 12.0)])),
            Ok(price_rows(&[(0, 10.0), (3, 12.0), (9, 9.0), (11, 15.0), (21, 15.0)])),
        ]);
        let mut reconciler = HistoryReconciler::new(source, None);
        let key = SeriesKey::new("CRZY", 10);

        reconciler.reconcile("CRZY", &[10]).await.unwrap();
        let from_unordered = reconciler.entry(&key).unwrap().clone();

        reconciler.reconcile("CRZY", &[10]).await.unwrap();
        let from_sorted = reconciler.entry(&key).unwrap().clone();

        assert_eq!(from_unordered, from_sorted);
    }

    #[tokio::test]
    async fn test_reconcile_replaces_wholesale() {
        let source = ScriptedHistory::new(vec![
            Ok(price_rows(&[(0, 10.0), (15, 11.0), (25, 12.0)])),
            Ok(price_rows(&[(30, 20.0)])),
        ]);
        let mut reconciler = HistoryReconciler::new(source, None);
        let key = SeriesKey::new("RTM", 10);

        reconciler.reconcile("RTM", &[10]).await.unwrap();
        assert_eq!(reconciler.entry(&key).unwrap().candles().len(), 3);

        reconciler.reconcile("RTM", &[10]).await.unwrap();
        let entry = reconciler.entry(&key).unwrap();
        assert_eq!(entry.candles().len(), 1);
        assert_eq!(entry.candles().candles()[0].bucket, 3);
    }

    #[tokio::test]
    async fn test_reconcile_failure_keeps_previous_entry() {
        let source = ScriptedHistory::new(vec![
            Ok(price_rows(&[(0, 10.0), (15, 11.0)])),
            Err(FeedError::ticker_not_found("RTM")),
            Err(FeedError::Timeout("history".to_string())),
        ]);
        let mut reconciler = HistoryReconciler::new(source, None);
        let key = SeriesKey::new("RTM", 10);

        reconciler.reconcile("RTM", &[10]).await.unwrap();
        let before = reconciler.entry(&key).unwrap().clone();

        let err = reconciler.reconcile("RTM", &[10]).await.unwrap_err();
        assert!(matches!(err, HistoryError::Feed(FeedError::TickerNotFound { .. })));
        assert_eq!(reconciler.entry(&key), Some(&before));

        let err = reconciler.reconcile("RTM", &[10]).await.unwrap_err();
        assert!(matches!(err, HistoryError::Feed(FeedError::Timeout(_))));
        assert_eq!(reconciler.entry(&key), Some(&before));
    }

    #[tokio::test]
    async fn test_reconcile_skips_malformed_rows() {
        let source = ScriptedHistory::new(vec![Ok(json!({
            "history": [
                {"tick": 1, "price": 10.0},
                {"tick": "later", "price": 11.0},
                {"tick": 2},
                {"tick": 3, "open": 10.0, "high": 12.0, "low": 9.0, "close": 11.0}
            ]
        }))]);
        let mut reconciler = HistoryReconciler::new(source, None);

        let stats = reconciler.reconcile("CRZY", &[10]).await.unwrap();
        assert_eq!(stats.rows, 2);
        assert_eq!(stats.skipped, 2);

        let entry = reconciler.entry(&SeriesKey::new("CRZY", 10)).unwrap();
        let candle = entry.candles().candles()[0];
        assert_eq!(candle.open, 10.0);
        assert_eq!(candle.high, 12.0);
        assert_eq!(candle.low, 9.0);
        assert_eq!(candle.close, 11.0);
    }

    #[tokio::test]
    async fn test_reconcile_invalid_granularity_spares_other_keys() {
        let source = ScriptedHistory::new(vec![
            Ok(price_rows(&[(0, 10.0)])),
            Ok(price_rows(&[(0, 99.0), (12, 98.0)])),
        ]);
        let mut reconciler = HistoryReconciler::new(source, None);
        reconciler.reconcile("CRZY", &[10]).await.unwrap();

        let stats = reconciler.reconcile("CRZY", &[10, 0]).await.unwrap();
        assert_eq!(stats.entries, 1);
        assert_eq!(
            stats.failed,
            vec![(SeriesKey::new("CRZY", 0), CandleError::InvalidGranularity(0))]
        );

        let ten = reconciler.entry(&SeriesKey::new("CRZY", 10)).unwrap();
        assert_eq!(ten.last_price(), Some(98.0));
        assert_eq!(ten.candles().len(), 2);
        assert!(reconciler.entry(&SeriesKey::new("CRZY", 0)).is_none());
    }

    #[tokio::test]
    async fn test_reconcile_fails_when_nothing_rebuilt() {
        let source = ScriptedHistory::new(vec![Ok(price_rows(&[(0, 10.0)]))]);
        let mut reconciler = HistoryReconciler::new(source, None);

        let err = reconciler.reconcile("CRZY", &[0]).await.unwrap_err();
        assert_eq!(err, HistoryError::Candle(CandleError::InvalidGranularity(0)));
    }

    #[test]
    fn test_record_sample_creates_entry_lazily() {
        let source = ScriptedHistory::new(Vec::new());
        let mut reconciler = HistoryReconciler::new(source, None);
        let key = SeriesKey::new("CRZY", 10);

        assert!(!reconciler.has_candles(&key));
        reconciler
            .record_sample(&key, PriceSample::new(0.5, 25.0))
            .unwrap();
        reconciler
            .record_sample(&key, PriceSample::new(3.0, 26.0))
            .unwrap();

        let entry = reconciler.entry(&key).unwrap();
        assert_eq!(entry.candles().len(), 1);
        assert_eq!(entry.last_price(), Some(26.0));
        assert_eq!(entry.last_position_seen(), Some(3.0));
        assert!(reconciler.has_candles(&key));
    }

    #[test]
    fn test_record_invalid_sample_leaves_entry() {
        let source = ScriptedHistory::new(Vec::new());
        let mut reconciler = HistoryReconciler::new(source, None);
        let key = SeriesKey::new("CRZY", 10);

        reconciler
            .record_sample(&key, PriceSample::new(0.5, 25.0))
            .unwrap();
        let before = reconciler.entry(&key).unwrap().clone();

        assert!(reconciler
            .record_sample(&key, PriceSample::new(1.0, f64::NAN))
            .is_err());
        assert_eq!(reconciler.entry(&key), Some(&before));
    }

    #[test]
    fn test_series_key_display() {
        assert_eq!(SeriesKey::new("CRZY", 10).to_string(), "CRZY@10");
    }
}
