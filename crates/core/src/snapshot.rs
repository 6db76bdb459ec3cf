//! Read-only views handed to renderers.

use crate::candle::{Candle, CandleSeries};
use crate::case::CaseState;
use crate::history::{HistoryCacheEntry, SeriesKey};
use crate::lifecycle::LifecyclePhase;
use crate::news::NewsState;
use serde::Serialize;

/// Series part of a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SeriesView {
    /// No candles cached for the key yet
    NotYetAvailable,
    Available {
        candles: CandleSeries,
        last_price: Option<f64>,
        last_position: Option<f64>,
    },
}

impl SeriesView {
    /// Builds the view of an optional cache entry.
    #[must_use]
    pub fn from_entry(entry: Option<&HistoryCacheEntry>) -> Self {
        match entry {
            Some(entry) if !entry.candles().is_empty() => SeriesView::Available {
                candles: entry.candles().clone(),
                last_price: entry.last_price(),
                last_position: entry.last_position_seen(),
            },
            _ => SeriesView::NotYetAvailable,
        }
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        matches!(self, SeriesView::Available { .. })
    }

    #[must_use]
    pub fn candles(&self) -> &[Candle] {
        match self {
            SeriesView::Available { candles, .. } => candles.candles(),
            SeriesView::NotYetAvailable => &[],
        }
    }

    #[must_use]
    pub fn last_price(&self) -> Option<f64> {
        match self {
            SeriesView::Available { last_price, .. } => *last_price,
            SeriesView::NotYetAvailable => None,
        }
    }
}

/// Immutable state of one chart at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub key: SeriesKey,
    pub phase: LifecyclePhase,
    pub case: CaseState,
    pub news: NewsState,
    pub series: SeriesView,
    pub tick_limit: i64,
}

impl Snapshot {
    #[must_use]
    pub fn remaining_ticks(&self) -> i64 {
        self.case.remaining_ticks(self.tick_limit)
    }

    /// Remaining ticks rendered as `MM:SS`, one tick per second.
    #[must_use]
    pub fn remaining_display(&self) -> String {
        let remaining = self.remaining_ticks();
        format!("{:02}:{:02}", remaining / 60, remaining % 60)
    }

    /// The last `max` candles, or all of them when `max` is `None`.
    #[must_use]
    pub fn visible_candles(&self, max: Option<usize>) -> &[Candle] {
        let candles = self.series.candles();
        match max {
            Some(max) => &candles[candles.len().saturating_sub(max)..],
            None => candles,
        }
    }
}
