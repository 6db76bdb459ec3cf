//! run CLI command: drives the lifecycle controller in real time.
//!
//! A fixed-cadence loop calls `tick(now)` and logs a status line whenever a
//! feed changed the chart. The loop ends when the case is finished and the
//! last history poll is spent, on a fatal case failure, or on Ctrl+C.

use super::resolve_ticker;
use anyhow::{Context, Result};
use clap::Args;
use rit_candles_client::RitClient;
use rit_candles_core::{
    AppConfig, ControllerConfig, Feed, LifecycleController, PollStats, SeriesView, Snapshot,
    Sources,
};
use std::sync::Arc;
use tokio::time::MissedTickBehavior;

/// Arguments for the run command.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Ticker to chart (defaults to the configured or first listed ticker)
    #[arg(long, env = "RIT_TICKER")]
    pub ticker: Option<String>,

    /// Candle width in position units
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub granularity: Option<u32>,

    /// Additional candle widths to keep up to date, comma-separated
    #[arg(long, value_delimiter = ',', value_parser = clap::value_parser!(u32).range(1..))]
    pub also: Vec<u32>,

    /// Show at most this many candles in the status line
    #[arg(long, default_value_t = 3)]
    pub visible: usize,
}

pub async fn run_chart(args: RunArgs, config: AppConfig) -> Result<()> {
    let client = Arc::new(RitClient::new(&config.api)?);
    let ticker = resolve_ticker(&client, args.ticker.or_else(|| config.chart.ticker.clone()))
        .await
        .context("Failed to pick a ticker")?;
    let granularity = args.granularity.unwrap_or(config.chart.granularity);

    let controller_config = ControllerConfig::from(&config);
    tracing::info!(
        "Tracking {} at granularity {} ({:?} mode, tick limit {})",
        ticker,
        granularity,
        controller_config.price_mode,
        controller_config.tick_limit
    );

    let mut controller = LifecycleController::new(controller_config, Sources::from_shared(client));
    for width in std::iter::once(granularity).chain(args.also.iter().copied()) {
        controller
            .watch(ticker.as_str(), width)
            .with_context(|| format!("Cannot chart {ticker} at granularity {width}"))?;
    }

    let mut interval = tokio::time::interval(config.polling.loop_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("Received Ctrl+C, stopping");
                break;
            }
            now = interval.tick() => {
                let report = match controller.tick(now).await {
                    Ok(report) => report,
                    Err(e) => {
                        tracing::error!("Controller halted: {}", e);
                        return Err(e).context("Case polling failed");
                    }
                };

                if report.polled(Feed::History) || report.polled(Feed::Price) || report.finished_now {
                    let snapshot = controller.snapshot(&ticker, granularity);
                    tracing::info!("{}", format_status(&snapshot, args.visible));
                }

                if controller.should_stop() {
                    tracing::info!("Case finished, nothing left to poll");
                    break;
                }
            }
        }
    }

    let snapshot = controller.snapshot(&ticker, granularity);
    tracing::info!("Final: {}", format_status(&snapshot, args.visible));
    for feed in Feed::ALL {
        tracing::info!("{}", format_poll_stats(feed, controller.stats(feed)));
    }

    Ok(())
}

/// Per-feed poll summary for the end of a run.
pub fn format_poll_stats(feed: Feed, stats: &PollStats) -> String {
    let mut line = format!(
        "{} polls: {} attempts, {} failures ({:.0}%)",
        feed,
        stats.attempts,
        stats.failures,
        stats.failure_rate() * 100.0
    );
    if let Some(error) = &stats.last_error {
        line.push_str(&format!(", last error: {error}"));
    }
    line
}

/// One-line summary of a snapshot.
pub fn format_status(snapshot: &Snapshot, visible: usize) -> String {
    let mut line = format!(
        "{} | tick {} ({}) | {} left",
        snapshot.key,
        snapshot.case.tick(),
        snapshot.case.status(),
        snapshot.remaining_display()
    );

    match &snapshot.series {
        SeriesView::NotYetAvailable => line.push_str(" | waiting for data"),
        SeriesView::Available {
            candles,
            last_price,
            ..
        } => {
            line.push_str(&format!(" | {} candles", candles.len()));
            if let Some(last) = last_price {
                line.push_str(&format!(" | last {last:.2}"));
            }
            for candle in snapshot.visible_candles(Some(visible)) {
                line.push_str(&format!(
                    " | [{}] O {:.2} H {:.2} L {:.2} C {:.2}",
                    candle.bucket, candle.open, candle.high, candle.low, candle.close
                ));
            }
        }
    }

    if !snapshot.news.current.is_empty() {
        line.push_str(&format!(" | news: {}", snapshot.news.current));
    }

    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use rit_candles_core::{
        CaseReport, CaseState, HistoryCacheEntry, LifecyclePhase, NewsState, PriceSample,
        SeriesKey,
    };

    fn snapshot(series: SeriesView) -> Snapshot {
        let mut case = CaseState::new();
        case.apply(&CaseReport::new(1740, "ACTIVE"), 1800);
        Snapshot {
            key: SeriesKey::new("CRZY", 10),
            phase: LifecyclePhase::Polling,
            case,
            news: NewsState {
                current: "Rates unchanged".to_string(),
                previous: String::new(),
            },
            series,
            tick_limit: 1800,
        }
    }

    #[test]
    fn test_format_status_waiting() {
        let line = format_status(&snapshot(SeriesView::NotYetAvailable), 3);
        assert_eq!(
            line,
            "CRZY@10 | tick 1740 (active) | 01:00 left | waiting for data | news: Rates unchanged"
        );
    }

    #[test]
    fn test_format_status_limits_candles() {
        let mut entry = HistoryCacheEntry::empty(10).unwrap();
        for (position, price) in [(0.0, 10.0), (10.0, 11.0), (20.0, 12.0)] {
            entry.record(PriceSample::new(position, price)).unwrap();
        }

        let line = format_status(&snapshot(SeriesView::from_entry(Some(&entry))), 1);
        assert!(line.contains("3 candles"));
        assert!(line.contains("last 12.00"));
        assert!(line.contains("[2] O 12.00"));
        assert!(!line.contains("[1]"));
    }

    #[test]
    fn test_format_poll_stats_reports_failure_rate() {
        let mut stats = PollStats::default();
        assert_eq!(
            format_poll_stats(Feed::History, &stats),
            "history polls: 0 attempts, 0 failures (0%)"
        );

        stats.record_success();
        stats.record_success();
        stats.record_success();
        stats.record_failure("HTTP error: 503 - busy");
        assert_eq!(
            format_poll_stats(Feed::Price, &stats),
            "price polls: 4 attempts, 1 failures (25%), last error: HTTP error: 503 - busy"
        );
    }
}
