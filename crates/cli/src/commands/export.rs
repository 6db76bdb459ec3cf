//! export CLI command: one-shot history reconciliation to CSV.

use super::resolve_ticker;
use anyhow::{anyhow, Context, Result};
use clap::Args;
use csv::WriterBuilder;
use rit_candles_client::RitClient;
use rit_candles_core::{AppConfig, Candle, HistoryReconciler, SeriesKey};
use std::fs::File;
use std::io::Write;
use std::sync::Arc;

const CSV_HEADER: [&str; 6] = ["bucket", "start", "open", "high", "low", "close"];

/// Arguments for the export command.
#[derive(Args, Debug, Clone)]
pub struct ExportArgs {
    /// Ticker to export (defaults to the configured or first listed ticker)
    #[arg(long)]
    pub ticker: Option<String>,

    /// Candle width in position units
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub granularity: Option<u32>,

    /// Row cap for the history request
    #[arg(long)]
    pub limit: Option<u32>,

    /// Output CSV file path
    #[arg(short, long)]
    pub output: String,
}

pub async fn run_export(args: ExportArgs, config: AppConfig) -> Result<()> {
    let client = Arc::new(RitClient::new(&config.api)?);
    let ticker = resolve_ticker(&client, args.ticker.or_else(|| config.chart.ticker.clone())).await?;
    let granularity = args.granularity.unwrap_or(config.chart.granularity);
    let limit = args.limit.or(config.chart.history_limit);

    let mut reconciler = HistoryReconciler::new(client, limit);
    let stats = reconciler
        .reconcile(&ticker, &[granularity])
        .await
        .with_context(|| format!("Failed to fetch history for {ticker}"))?;
    if stats.skipped > 0 {
        tracing::warn!("Skipped {} malformed history rows", stats.skipped);
    }

    let key = SeriesKey::new(ticker.as_str(), granularity);
    let entry = reconciler
        .entry(&key)
        .ok_or_else(|| anyhow!("No series built for {key}"))?;

    let file = File::create(&args.output)
        .with_context(|| format!("Failed to create {}", args.output))?;
    let written = write_candles(file, entry.candles().candles())?;

    tracing::info!(
        "Wrote {} candles for {} ({} rows) to {}",
        written,
        key,
        stats.rows,
        args.output
    );
    Ok(())
}

/// Writes candles as CSV with a header row.
///
/// # Errors
/// Returns an error if writing to `writer` fails.
pub fn write_candles<W: Write>(writer: W, candles: &[Candle]) -> Result<usize> {
    let mut wtr = WriterBuilder::new().has_headers(false).from_writer(writer);
    wtr.write_record(CSV_HEADER)?;
    for candle in candles {
        wtr.serialize(candle)?;
    }
    wtr.flush()?;
    Ok(candles.len())
}
