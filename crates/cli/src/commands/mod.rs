//! CLI commands for RIT live candle charts.

pub mod export;
pub mod run;
pub mod tickers;

pub use export::{run_export, ExportArgs};
pub use run::{run_chart, RunArgs};
pub use tickers::run_tickers;

use anyhow::{anyhow, Result};
use rit_candles_client::RitClient;

/// Picks the ticker to chart: the requested one, else the first listed.
///
/// # Errors
/// Returns an error if no ticker was requested and none is listed.
pub async fn resolve_ticker(client: &RitClient, requested: Option<String>) -> Result<String> {
    if let Some(ticker) = requested {
        return Ok(ticker);
    }

    let tickers = client.tickers().await?;
    tracing::info!("All tickers: {}", tickers.join(", "));
    tickers
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("No securities listed by {}", client.base_url()))
}
