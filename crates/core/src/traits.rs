use crate::case::CaseReport;
use crate::error::FeedError;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

#[async_trait]
pub trait CaseSource: Send + Sync {
    async fn case_status(&self) -> Result<CaseReport, FeedError>;
}

#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Last traded price, `None` when the ticker has not traded yet.
    async fn last_price(&self, ticker: &str) -> Result<Option<f64>, FeedError>;
}

#[async_trait]
pub trait NewsSource: Send + Sync {
    /// Headline items, newest first. Item shape is not fixed.
    async fn headlines(&self) -> Result<Vec<Value>, FeedError>;
}

#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Raw history payload for a ticker, optionally capped in row count.
    async fn history(&self, ticker: &str, limit: Option<u32>) -> Result<Value, FeedError>;
}

/// The four feeds a controller polls.
#[derive(Clone)]
pub struct Sources {
    pub case: Arc<dyn CaseSource>,
    pub price: Arc<dyn PriceSource>,
    pub news: Arc<dyn NewsSource>,
    pub history: Arc<dyn HistorySource>,
}

impl Sources {
    /// Uses one client for every feed.
    pub fn from_shared<S>(source: Arc<S>) -> Self
    where
        S: CaseSource + PriceSource + NewsSource + HistorySource + 'static,
    {
        Self {
            case: source.clone(),
            price: source.clone(),
            news: source.clone(),
            history: source,
        }
    }
}
