//! tickers CLI command.

use anyhow::Result;
use rit_candles_client::RitClient;
use rit_candles_core::AppConfig;

pub async fn run_tickers(config: AppConfig) -> Result<()> {
    let client = RitClient::new(&config.api)?;
    let mut securities = client.securities().await?;
    securities.retain(|security| !security.ticker.is_empty());
    securities.sort_by(|a, b| a.ticker.cmp(&b.ticker));
    securities.dedup_by(|a, b| a.ticker == b.ticker);

    if securities.is_empty() {
        println!("No securities listed");
        return Ok(());
    }

    for security in securities {
        match security.last {
            Some(last) => println!("{:<8} {:>10.2}", security.ticker, last),
            None => println!("{:<8} {:>10}", security.ticker, "-"),
        }
    }

    Ok(())
}
