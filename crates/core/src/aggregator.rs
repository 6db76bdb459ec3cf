//! Fixed-width candle aggregation.
//!
//! Converts price samples or normalized history rows into a
//! [`CandleSeries`]. The aggregator performs no I/O; its only failure modes
//! are rejected inputs, and a rejected input never mutates the series.
//!
//! Bucketing rule: `bucket = floor(position / granularity)`. A row in a new
//! bucket opens a candle; a row in the current bucket widens `high`/`low`
//! and replaces `close`. OHLC rows fold their own extremes, so a coarse
//! series can be rebuilt from finer pre-aggregated history without losing
//! intrabucket highs and lows.

use crate::candle::{Candle, CandleSeries, HistoryRow, PriceSample};
use crate::error::CandleError;

/// Builds and extends a single candle series at one granularity.
#[derive(Debug, Clone, PartialEq)]
pub struct CandleAggregator {
    granularity: u32,
    series: CandleSeries,
}

impl CandleAggregator {
    /// Creates an aggregator with an empty series.
    ///
    /// # Errors
    /// Returns `InvalidGranularity` if `granularity` is zero.
    pub fn new(granularity: u32) -> Result<Self, CandleError> {
        if granularity == 0 {
            return Err(CandleError::InvalidGranularity(granularity));
        }
        Ok(Self {
            granularity,
            series: CandleSeries::new(),
        })
    }

    /// Builds a fresh series from rows sorted ascending by position.
    ///
    /// # Errors
    /// Returns `InvalidGranularity`, `InvalidSample` or `UnsortedRows`; see
    /// [`CandleAggregator::ingest_batch`].
    pub fn from_rows(rows: &[HistoryRow], granularity: u32) -> Result<CandleSeries, CandleError> {
        let mut aggregator = Self::new(granularity)?;
        aggregator.ingest_batch(rows)?;
        Ok(aggregator.into_series())
    }

    #[must_use]
    pub fn granularity(&self) -> u32 {
        self.granularity
    }

    #[must_use]
    pub fn series(&self) -> &CandleSeries {
        &self.series
    }

    #[must_use]
    pub fn into_series(self) -> CandleSeries {
        self.series
    }

    /// Bucket index for a position.
    #[must_use]
    pub fn bucket_of(&self, position: f64) -> i64 {
        (position / f64::from(self.granularity)).floor() as i64
    }

    /// Folds one live sample into the series.
    ///
    /// Returns the candle the sample landed in.
    ///
    /// # Errors
    /// - `InvalidSample` if position or price is not finite.
    /// - `OutOfOrderSample` if the sample maps to a bucket before the
    ///   current candle.
    pub fn ingest(&mut self, sample: PriceSample) -> Result<&Candle, CandleError> {
        sample.validate()?;
        let row = HistoryRow::from(sample);
        self.check_not_behind(&row)?;
        Ok(self.fold(&row))
    }

    /// Folds a batch of rows into the series.
    ///
    /// Rows must already be sorted ascending by position; the aggregator
    /// does not sort. The whole batch is checked before anything is folded,
    /// so on error the series is unchanged.
    ///
    /// Returns the number of rows folded.
    ///
    /// # Errors
    /// - `InvalidSample` if any row fails [`HistoryRow::validate`].
    /// - `UnsortedRows` at the first row positioned before its predecessor.
    /// - `OutOfOrderSample` if the first row maps before the current candle.
    pub fn ingest_batch(&mut self, rows: &[HistoryRow]) -> Result<usize, CandleError> {
        for row in rows {
            row.validate()?;
        }

        if let Some(index) = rows
            .windows(2)
            .position(|pair| pair[1].position() < pair[0].position())
        {
            return Err(CandleError::UnsortedRows { index: index + 1 });
        }

        if let Some(first) = rows.first() {
            self.check_not_behind(first)?;
        }

        for row in rows {
            self.fold(row);
        }

        Ok(rows.len())
    }

    fn check_not_behind(&self, row: &HistoryRow) -> Result<(), CandleError> {
        if let Some(last) = self.series.last() {
            let bucket = self.bucket_of(row.position());
            if bucket < last.bucket {
                return Err(CandleError::OutOfOrderSample {
                    position: row.position(),
                    bucket,
                    current: last.bucket,
                });
            }
        }
        Ok(())
    }

    fn fold(&mut self, row: &HistoryRow) -> &Candle {
        let bucket = self.bucket_of(row.position());
        let granularity = self.granularity;

        match self.series.last_mut() {
            Some(current) if current.bucket == bucket => current.absorb(row),
            _ => self.series.push(Candle::open_with(bucket, granularity, row)),
        }

        // A candle was either updated or pushed above.
        &self.series.candles()[self.series.len() - 1]
    }
}
