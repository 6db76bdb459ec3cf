use anyhow::Context;
use clap::{Parser, Subcommand};
use rit_candles_core::ConfigLoader;

mod commands;

use commands::{ExportArgs, RunArgs};

#[derive(Parser)]
#[command(name = "rit-candles")]
#[command(about = "Live candlestick charts for RIT trading cases", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, global = true, default_value = "config/Config.toml")]
    config: String,

    /// Optional log file path (logs to file instead of stderr)
    #[arg(long, global = true)]
    log_file: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the case and log live candles until it finishes
    Run(RunArgs),
    /// List tradable tickers with their last price
    Tickers,
    /// Rebuild candles from history once and write them to CSV
    Export(ExportArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    match &cli.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {path}"))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }

    let config = ConfigLoader::load_from(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config))?;

    match cli.command {
        Commands::Run(args) => commands::run_chart(args, config).await?,
        Commands::Tickers => commands::run_tickers(config).await?,
        Commands::Export(args) => commands::run_export(args, config).await?,
    }

    Ok(())
}
