//! Wire types for the RIT REST API.

use rit_candles_core::CaseReport;
use serde::{Deserialize, Serialize};

/// `/case` response. Only the clock fields are read.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawCase {
    pub tick: i64,
    pub status: String,
}

impl From<RawCase> for CaseReport {
    fn from(raw: RawCase) -> Self {
        CaseReport::new(raw.tick, raw.status)
    }
}

/// One entry of the `/securities` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Security {
    #[serde(default)]
    pub ticker: String,
    /// Last traded price; `null` before the first trade
    #[serde(default)]
    pub last: Option<f64>,
}
