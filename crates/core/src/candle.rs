//! Candle data model.
//!
//! Prices arrive either as live samples or as history rows, both keyed by a
//! position on the stream axis (elapsed seconds or case ticks). Candles
//! partition that axis into fixed-width buckets.

use crate::error::CandleError;
use serde::{Deserialize, Serialize};

/// A single price observation at a position on the stream axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceSample {
    /// Elapsed seconds or tick count since stream start
    pub position: f64,
    /// Observed price
    pub price: f64,
}

impl PriceSample {
    /// Creates a sample without validation.
    #[must_use]
    pub fn new(position: f64, price: f64) -> Self {
        Self { position, price }
    }

    /// Builds a sample from a nullable last traded price.
    ///
    /// # Errors
    /// Returns `InvalidSample` if the price is missing or either value is
    /// not finite.
    pub fn from_last(position: f64, price: Option<f64>) -> Result<Self, CandleError> {
        let price = price.ok_or_else(|| {
            CandleError::invalid_sample(format!("missing price at position {position}"))
        })?;
        let sample = Self { position, price };
        sample.validate()?;
        Ok(sample)
    }

    /// Checks that position and price are finite.
    ///
    /// # Errors
    /// Returns `InvalidSample` describing the offending field.
    pub fn validate(&self) -> Result<(), CandleError> {
        if !self.position.is_finite() {
            return Err(CandleError::invalid_sample(format!(
                "non-finite position {}",
                self.position
            )));
        }
        if !self.price.is_finite() {
            return Err(CandleError::invalid_sample(format!(
                "non-finite price {} at position {}",
                self.price, self.position
            )));
        }
        Ok(())
    }
}

/// A normalized history row.
///
/// History feeds mix full OHLC records (pre-aggregated at some coarser or
/// finer width) with plain price points; normalization maps both onto this
/// enum before aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HistoryRow {
    /// Row carrying its own open/high/low/close
    Ohlc {
        position: f64,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    },
    /// Row carrying a single price
    Scalar { position: f64, price: f64 },
}

impl HistoryRow {
    /// Position of the row on the stream axis.
    #[must_use]
    pub fn position(&self) -> f64 {
        match *self {
            HistoryRow::Ohlc { position, .. } | HistoryRow::Scalar { position, .. } => position,
        }
    }

    #[must_use]
    pub fn open(&self) -> f64 {
        match *self {
            HistoryRow::Ohlc { open, .. } => open,
            HistoryRow::Scalar { price, .. } => price,
        }
    }

    #[must_use]
    pub fn high(&self) -> f64 {
        match *self {
            HistoryRow::Ohlc { high, .. } => high,
            HistoryRow::Scalar { price, .. } => price,
        }
    }

    #[must_use]
    pub fn low(&self) -> f64 {
        match *self {
            HistoryRow::Ohlc { low, .. } => low,
            HistoryRow::Scalar { price, .. } => price,
        }
    }

    /// Closing price; for scalar rows, the price itself.
    #[must_use]
    pub fn close(&self) -> f64 {
        match *self {
            HistoryRow::Ohlc { close, .. } => close,
            HistoryRow::Scalar { price, .. } => price,
        }
    }

    /// Checks that all values are finite and that an OHLC row satisfies
    /// `low <= open, close <= high`.
    ///
    /// # Errors
    /// Returns `InvalidSample` describing the problem.
    pub fn validate(&self) -> Result<(), CandleError> {
        let position = self.position();
        if !position.is_finite() {
            return Err(CandleError::invalid_sample(format!(
                "non-finite position {position}"
            )));
        }

        let (open, high, low, close) = (self.open(), self.high(), self.low(), self.close());
        if ![open, high, low, close].iter().all(|v| v.is_finite()) {
            return Err(CandleError::invalid_sample(format!(
                "non-finite price in row at position {position}"
            )));
        }

        if low > open || low > close || high < open || high < close {
            return Err(CandleError::invalid_sample(format!(
                "inconsistent OHLC at position {position}: o={open} h={high} l={low} c={close}"
            )));
        }

        Ok(())
    }
}

impl From<PriceSample> for HistoryRow {
    fn from(sample: PriceSample) -> Self {
        HistoryRow::Scalar {
            position: sample.position,
            price: sample.price,
        }
    }
}

/// OHLC aggregate over one bucket of the position axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Bucket index, `floor(position / granularity)`
    pub bucket: i64,
    /// First position covered by the bucket, `bucket * granularity`
    pub start: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Candle {
    /// Opens a candle from the first row seen in its bucket.
    pub(crate) fn open_with(bucket: i64, granularity: u32, row: &HistoryRow) -> Self {
        Self {
            bucket,
            start: bucket as f64 * f64::from(granularity),
            open: row.open(),
            high: row.high(),
            low: row.low(),
            close: row.close(),
        }
    }

    /// Folds a later row of the same bucket into this candle.
    pub(crate) fn absorb(&mut self, row: &HistoryRow) {
        self.high = self.high.max(row.high());
        self.low = self.low.min(row.low());
        self.close = row.close();
    }

    /// Returns true if the candle closed at or above its open.
    #[must_use]
    pub fn is_bullish(&self) -> bool {
        self.close >= self.open
    }

    /// High minus low. Zero for single-price candles.
    #[must_use]
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    /// Re-expresses the candle as an OHLC row positioned at its start, so a
    /// series can be folded again at a coarser granularity.
    #[must_use]
    pub fn as_row(&self) -> HistoryRow {
        HistoryRow::Ohlc {
            position: self.start,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
        }
    }
}

/// Ordered candles with strictly increasing buckets.
///
/// Only the aggregator appends to or mutates a series; consumers get a
/// read-only slice.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CandleSeries {
    candles: Vec<Candle>,
}

impl CandleSeries {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.candles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    /// The current (still mutable) candle.
    #[must_use]
    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Candle> {
        self.candles.iter()
    }

    /// Returns at most the `max` most recent candles.
    #[must_use]
    pub fn tail(&self, max: usize) -> &[Candle] {
        let skip = self.candles.len().saturating_sub(max);
        &self.candles[skip..]
    }

    pub(crate) fn push(&mut self, candle: Candle) {
        self.candles.push(candle);
    }

    pub(crate) fn last_mut(&mut self) -> Option<&mut Candle> {
        self.candles.last_mut()
    }
}

impl<'a> IntoIterator for &'a CandleSeries {
    type Item = &'a Candle;
    type IntoIter = std::slice::Iter<'a, Candle>;

    fn into_iter(self) -> Self::IntoIter {
        self.candles.iter()
    }
}
