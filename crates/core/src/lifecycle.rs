//! Multi-rate polling and the case lifecycle.
//!
//! [`LifecycleController`] owns the case clock, the news feed and the history
//! cache, and decides on every [`LifecycleController::tick`] which feeds are
//! due. Once the case is finished, case, news and live price polling stop for
//! good; a watched series with no candles gets one last history poll.

use crate::candle::PriceSample;
use crate::case::{CaseReport, CaseState};
use crate::config::{AppConfig, CaseFailurePolicy, PositionAxis, PriceMode};
use crate::error::{CandleError, ControllerError, FeedError};
use crate::history::{HistoryReconciler, SeriesKey};
use crate::news::{NewsFeed, NewsState};
use crate::schedule::{Feed, FeedSchedule, PollStats};
use crate::snapshot::{SeriesView, Snapshot};
use crate::traits::{CaseSource, PriceSource, Sources};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecyclePhase {
    /// No successful case poll yet
    Init,
    Polling,
    /// Terminal
    Finished,
}

impl std::fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecyclePhase::Init => write!(f, "init"),
            LifecyclePhase::Polling => write!(f, "polling"),
            LifecyclePhase::Finished => write!(f, "finished"),
        }
    }
}

/// Controller settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    pub case_interval: Duration,
    pub price_interval: Duration,
    pub history_interval: Duration,
    pub news_interval: Duration,
    pub tick_limit: i64,
    pub case_failure_policy: CaseFailurePolicy,
    pub price_mode: PriceMode,
    pub position_axis: PositionAxis,
    pub history_limit: Option<u32>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for ControllerConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            case_interval: config.polling.case_interval(),
            price_interval: config.polling.price_interval(),
            history_interval: config.polling.history_interval(),
            news_interval: config.polling.news_interval(),
            tick_limit: config.polling.tick_limit,
            case_failure_policy: config.polling.case_failure_policy,
            price_mode: config.chart.price_mode,
            position_axis: config.chart.position_axis,
            history_limit: config.chart.history_limit,
        }
    }
}

impl ControllerConfig {
    #[must_use]
    pub fn with_intervals(
        mut self,
        case: Duration,
        price: Duration,
        history: Duration,
        news: Duration,
    ) -> Self {
        self.case_interval = case;
        self.price_interval = price;
        self.history_interval = history;
        self.news_interval = news;
        self
    }

    #[must_use]
    pub fn with_tick_limit(mut self, tick_limit: i64) -> Self {
        self.tick_limit = tick_limit;
        self
    }

    #[must_use]
    pub fn with_case_failure_policy(mut self, policy: CaseFailurePolicy) -> Self {
        self.case_failure_policy = policy;
        self
    }

    #[must_use]
    pub fn with_price_mode(mut self, mode: PriceMode) -> Self {
        self.price_mode = mode;
        self
    }

    #[must_use]
    pub fn with_position_axis(mut self, axis: PositionAxis) -> Self {
        self.position_axis = axis;
        self
    }

    #[must_use]
    pub fn with_history_limit(mut self, limit: Option<u32>) -> Self {
        self.history_limit = limit;
        self
    }
}

/// What a single [`LifecycleController::tick`] did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TickReport {
    /// Feeds that were polled, in poll order
    pub polled: Vec<Feed>,
    /// Failures observed, as `(feed, message)`
    pub failures: Vec<(Feed, String)>,
    pub news_changed: bool,
    /// True on the tick that moved the controller to `Finished`
    pub finished_now: bool,
}

impl TickReport {
    #[must_use]
    pub fn polled(&self, feed: Feed) -> bool {
        self.polled.contains(&feed)
    }

    fn record(&mut self, feed: Feed) {
        if !self.polled.contains(&feed) {
            self.polled.push(feed);
        }
    }
}

#[derive(Debug, Clone)]
struct FeedState {
    schedule: FeedSchedule,
    stats: PollStats,
}

impl FeedState {
    fn new(interval: Duration) -> Self {
        Self {
            schedule: FeedSchedule::new(interval),
            stats: PollStats::default(),
        }
    }
}

#[derive(Debug, Clone)]
struct Feeds {
    case: FeedState,
    price: FeedState,
    history: FeedState,
    news: FeedState,
}

impl Feeds {
    fn get(&self, feed: Feed) -> &FeedState {
        match feed {
            Feed::Case => &self.case,
            Feed::Price => &self.price,
            Feed::History => &self.history,
            Feed::News => &self.news,
        }
    }

    fn get_mut(&mut self, feed: Feed) -> &mut FeedState {
        match feed {
            Feed::Case => &mut self.case,
            Feed::Price => &mut self.price,
            Feed::History => &mut self.history,
            Feed::News => &mut self.news,
        }
    }
}

/// Drives every feed on its own cadence and gates them on the case clock.
pub struct LifecycleController {
    config: ControllerConfig,
    case_source: Arc<dyn CaseSource>,
    price_source: Arc<dyn PriceSource>,
    case: CaseState,
    phase: LifecyclePhase,
    news: NewsFeed,
    history: HistoryReconciler,
    feeds: Feeds,
    watched: BTreeSet<SeriesKey>,
    final_history_polled: HashSet<SeriesKey>,
    started_at: Option<Instant>,
    halted: Option<ControllerError>,
}

impl LifecycleController {
    pub fn new(config: ControllerConfig, sources: Sources) -> Self {
        let feeds = Feeds {
            case: FeedState::new(config.case_interval),
            price: FeedState::new(config.price_interval),
            history: FeedState::new(config.history_interval),
            news: FeedState::new(config.news_interval),
        };

        Self {
            case_source: sources.case,
            price_source: sources.price,
            case: CaseState::new(),
            phase: LifecyclePhase::Init,
            news: NewsFeed::new(sources.news),
            history: HistoryReconciler::new(sources.history, config.history_limit),
            feeds,
            watched: BTreeSet::new(),
            final_history_polled: HashSet::new(),
            started_at: None,
            halted: None,
            config,
        }
    }

    /// Registers a `(ticker, granularity)` series to serve. Idempotent.
    ///
    /// # Errors
    /// Returns `InvalidGranularity` for a zero granularity; nothing is
    /// registered.
    pub fn watch(&mut self, ticker: impl Into<String>, granularity: u32) -> Result<(), CandleError> {
        if granularity == 0 {
            return Err(CandleError::InvalidGranularity(granularity));
        }
        let key = SeriesKey::new(ticker, granularity);
        if self.watched.insert(key.clone()) {
            tracing::debug!("Watching {}", key);
        }
        Ok(())
    }

    #[must_use]
    pub fn watched(&self) -> impl Iterator<Item = &SeriesKey> {
        self.watched.iter()
    }

    #[must_use]
    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    #[must_use]
    pub fn phase(&self) -> LifecyclePhase {
        self.phase
    }

    #[must_use]
    pub fn case(&self) -> &CaseState {
        &self.case
    }

    #[must_use]
    pub fn news(&self) -> &NewsState {
        self.news.state()
    }

    #[must_use]
    pub fn stats(&self, feed: Feed) -> &PollStats {
        &self.feeds.get(feed).stats
    }

    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.halted.is_some()
    }

    /// True once nothing is left to poll: the controller halted, or the case
    /// finished and every final history poll was spent.
    #[must_use]
    pub fn should_stop(&self) -> bool {
        self.is_halted()
            || (self.phase == LifecyclePhase::Finished && self.pending_final_history().is_empty())
    }

    /// Owned view of one series with the current case and news state.
    #[must_use]
    pub fn snapshot(&self, ticker: &str, granularity: u32) -> Snapshot {
        let key = SeriesKey::new(ticker, granularity);
        Snapshot {
            series: SeriesView::from_entry(self.history.entry(&key)),
            key,
            phase: self.phase,
            case: self.case.clone(),
            news: self.news.state().clone(),
            tick_limit: self.config.tick_limit,
        }
    }

    /// Runs one scheduling pass at `now`.
    ///
    /// Feeds are visited in the order case, news, price/history; each one is
    /// polled only if its interval has elapsed since its last poll.
    ///
    /// # Errors
    /// Returns `CaseFetch` when a case poll fails under the fatal policy, and
    /// the same error on every later call.
    pub async fn tick(&mut self, now: Instant) -> Result<TickReport, ControllerError> {
        if let Some(err) = &self.halted {
            return Err(err.clone());
        }
        self.started_at.get_or_insert(now);

        let mut report = TickReport::default();

        self.poll_case(now, &mut report).await?;
        self.poll_news(now, &mut report).await;

        match self.config.price_mode {
            PriceMode::History => self.poll_history(now, &mut report).await,
            PriceMode::LastPrice => {
                self.poll_prices(now, &mut report).await;
                if self.phase == LifecyclePhase::Finished {
                    self.poll_history(now, &mut report).await;
                }
            }
        }

        Ok(report)
    }

    async fn poll_case(
        &mut self,
        now: Instant,
        report: &mut TickReport,
    ) -> Result<(), ControllerError> {
        if self.phase == LifecyclePhase::Finished || !self.feeds.case.schedule.is_due(now) {
            return Ok(());
        }
        report.record(Feed::Case);

        match self.case_source.case_status().await {
            Ok(case_report) => {
                self.feeds.case.schedule.mark(now);
                self.feeds.case.stats.record_success();
                self.apply_case(&case_report, report);
                Ok(())
            }
            Err(err) => {
                self.feeds.case.stats.record_failure(&err);
                report.failures.push((Feed::Case, err.to_string()));

                match self.config.case_failure_policy {
                    CaseFailurePolicy::Transient => {
                        tracing::warn!("Case poll failed, retrying next tick: {}", err);
                        Ok(())
                    }
                    CaseFailurePolicy::Fatal => {
                        tracing::error!("Case poll failed, halting: {}", err);
                        self.feeds.case.schedule.mark(now);
                        let fatal = ControllerError::CaseFetch(err);
                        self.halted = Some(fatal.clone());
                        Err(fatal)
                    }
                }
            }
        }
    }

    fn apply_case(&mut self, case_report: &CaseReport, report: &mut TickReport) {
        let finished_now = self.case.apply(case_report, self.config.tick_limit);

        if self.phase == LifecyclePhase::Init {
            tracing::info!(
                "Case {} at tick {}, polling started",
                self.case.status(),
                self.case.tick()
            );
            self.phase = LifecyclePhase::Polling;
        }

        if finished_now {
            tracing::info!(
                "Case finished at tick {} with status {}",
                self.case.tick(),
                self.case.status()
            );
            self.phase = LifecyclePhase::Finished;
            report.finished_now = true;
        }
    }

    async fn poll_news(&mut self, now: Instant, report: &mut TickReport) {
        if self.phase == LifecyclePhase::Finished || !self.feeds.news.schedule.is_due(now) {
            return;
        }
        self.feeds.news.schedule.mark(now);
        report.record(Feed::News);

        match self.news.poll().await {
            Ok(changed) => {
                self.feeds.news.stats.record_success();
                report.news_changed = changed;
            }
            Err(err) => {
                log_poll_failure("news", err.is_transient(), &err);
                self.feeds.news.stats.record_failure(&err);
                report.failures.push((Feed::News, err.to_string()));
            }
        }
    }

    async fn poll_prices(&mut self, now: Instant, report: &mut TickReport) {
        if self.phase != LifecyclePhase::Polling || !self.feeds.price.schedule.is_due(now) {
            return;
        }
        let by_ticker = group_by_ticker(self.watched.iter());
        if by_ticker.is_empty() {
            return;
        }
        self.feeds.price.schedule.mark(now);
        report.record(Feed::Price);

        let position = self.sample_position(now);
        for (ticker, granularities) in by_ticker {
            let price = match self.price_source.last_price(&ticker).await {
                Ok(price) => price,
                Err(err) => {
                    self.fail(Feed::Price, &ticker, &err, report);
                    continue;
                }
            };
            self.feeds.price.stats.record_success();

            let Some(price) = price else {
                tracing::debug!("{}: no trades yet", ticker);
                continue;
            };

            for granularity in granularities {
                let key = SeriesKey::new(ticker.as_str(), granularity);
                let recorded = PriceSample::from_last(position, Some(price))
                    .and_then(|sample| self.history.record_sample(&key, sample));
                if let Err(err) = recorded {
                    tracing::warn!("{}: sample rejected: {}", key, err);
                    report.failures.push((Feed::Price, err.to_string()));
                }
            }
        }
    }

    async fn poll_history(&mut self, now: Instant, report: &mut TickReport) {
        if !self.feeds.history.schedule.is_due(now) {
            return;
        }

        let keys: Vec<SeriesKey> = if self.phase == LifecyclePhase::Finished {
            self.pending_final_history()
        } else {
            self.watched.iter().cloned().collect()
        };
        if keys.is_empty() {
            return;
        }
        self.feeds.history.schedule.mark(now);
        report.record(Feed::History);

        if self.phase == LifecyclePhase::Finished {
            tracing::info!("Final history poll for {} series", keys.len());
            self.final_history_polled.extend(keys.iter().cloned());
        }

        for (ticker, granularities) in group_by_ticker(keys.iter()) {
            match self.history.reconcile(&ticker, &granularities).await {
                Ok(stats) => {
                    self.feeds.history.stats.record_success();
                    for (key, err) in stats.failed {
                        report.failures.push((Feed::History, format!("{key}: {err}")));
                    }
                }
                Err(err) => {
                    log_poll_failure(&format!("{ticker}: history"), err.is_transient(), &err);
                    self.feeds.history.stats.record_failure(&err);
                    report.failures.push((Feed::History, err.to_string()));
                }
            }
        }
    }

    fn fail(&mut self, feed: Feed, ticker: &str, err: &FeedError, report: &mut TickReport) {
        log_poll_failure(&format!("{ticker}: {feed}"), err.is_transient(), err);
        self.feeds.get_mut(feed).stats.record_failure(err);
        report.failures.push((feed, err.to_string()));
    }

    fn sample_position(&self, now: Instant) -> f64 {
        match self.config.position_axis {
            PositionAxis::Elapsed => self
                .started_at
                .map_or(0.0, |start| now.saturating_duration_since(start).as_secs_f64()),
            PositionAxis::Tick => self.case.tick() as f64,
        }
    }

    fn pending_final_history(&self) -> Vec<SeriesKey> {
        self.watched
            .iter()
            .filter(|key| !self.history.has_candles(key) && !self.final_history_polled.contains(*key))
            .cloned()
            .collect()
    }
}

/// Transient failures are expected to clear on a later cycle; anything else
/// usually needs operator attention.
fn log_poll_failure(subject: &str, transient: bool, err: &dyn std::fmt::Display) {
    if transient {
        tracing::warn!("{} poll failed, retrying: {}", subject, err);
    } else {
        tracing::error!("{} poll failed: {}", subject, err);
    }
}

fn group_by_ticker<'a>(keys: impl Iterator<Item = &'a SeriesKey>) -> BTreeMap<String, Vec<u32>> {
    let mut grouped: BTreeMap<String, Vec<u32>> = BTreeMap::new();
    for key in keys {
        grouped
            .entry(key.ticker.clone())
            .or_default()
            .push(key.granularity);
    }
    grouped
}
