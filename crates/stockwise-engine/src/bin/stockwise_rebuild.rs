//! # Metric Rebuild Tool
//!
//! Recomputes daily inventory metrics from the transaction ledger.
//!
//! ## Usage
//! ```bash
//! # Rebuild one day using the default config file
//! cargo run -p stockwise-engine --bin stockwise-rebuild -- --start 2024-06-03 --end 2024-06-03
//!
//! # Rebuild a range against an explicit config
//! cargo run -p stockwise-engine --bin stockwise-rebuild -- \
//!     --start 2024-06-01 --end 2024-06-30 --config ./stockwise.toml
//! ```
//!
//! Use after restoring a backup or when an apply was interrupted between
//! commit and aggregation.

use chrono::NaiveDate;
use std::env;
use std::path::PathBuf;
use stockwise_engine::{EngineConfig, InventoryService};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let args: Vec<String> = env::args().collect();

    let mut start: Option<NaiveDate> = None;
    let mut end: Option<NaiveDate> = None;
    let mut config_path: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--start" | "-s" => {
                if i + 1 < args.len() {
                    start = Some(args[i + 1].parse()?);
                    i += 1;
                }
            }
            "--end" | "-e" => {
                if i + 1 < args.len() {
                    end = Some(args[i + 1].parse()?);
                    i += 1;
                }
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    let Some(start) = start else {
        print_help();
        return Err("--start is required".into());
    };
    let end = end.unwrap_or(start);

    let config = EngineConfig::load(config_path)?;
    let service = InventoryService::open(config).await?;
    info!(%start, %end, "Rebuilding daily metrics");

    let report = service.rebuild_analytics(start, end).await?;
    service.shutdown().await?;

    println!("✓ Rebuilt metrics for {} ..= {}", start, end);
    println!("  Cleared:  {} rows", report.metrics_cleared);
    println!("  Replayed: {} transactions", report.transactions_replayed);
    println!("  Written:  {} rows", report.metrics_written);

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,stockwise=debug,sqlx=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn print_help() {
    println!("Stockwise Metric Rebuild");
    println!();
    println!("Usage: stockwise-rebuild --start <DATE> [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -s, --start <DATE>    First local date to rebuild (YYYY-MM-DD)");
    println!("  -e, --end <DATE>      Last local date to rebuild (default: start)");
    println!("  -c, --config <PATH>   Config file (default: platform config dir)");
    println!("  -h, --help            Show this help message");
}
