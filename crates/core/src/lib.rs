pub mod aggregator;
pub mod candle;
pub mod case;
pub mod config;
pub mod config_loader;
pub mod error;
pub mod history;
pub mod lifecycle;
pub mod news;
pub mod normalize;
pub mod schedule;
pub mod snapshot;
pub mod traits;

pub use aggregator::CandleAggregator;
pub use candle::{Candle, CandleSeries, HistoryRow, PriceSample};
pub use case::{CaseReport, CaseState, CaseStatus};
pub use config::{
    ApiConfig, AppConfig, CaseFailurePolicy, ChartConfig, PollingConfig, PositionAxis, PriceMode,
};
pub use config_loader::ConfigLoader;
pub use error::{CandleError, ControllerError, FeedError, HistoryError};
pub use history::{HistoryCacheEntry, HistoryReconciler, ReconcileStats, SeriesKey};
pub use lifecycle::{ControllerConfig, LifecycleController, LifecyclePhase, TickReport};
pub use news::{NewsFeed, NewsState};
pub use normalize::{extract_headline, normalize_history, normalize_row, NormalizedHistory};
pub use schedule::{Feed, FeedSchedule, PollStats};
pub use snapshot::{SeriesView, Snapshot};
pub use traits::{CaseSource, HistorySource, NewsSource, PriceSource, Sources};
