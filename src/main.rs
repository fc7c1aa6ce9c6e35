mod api;
mod config;
mod models;
mod pipeline;
mod storage;
mod utils;

use anyhow::Result;
use chrono::Local;
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::AppConfig;
use crate::pipeline::{missing_dates, Pipeline};
use crate::storage::{PriceStore, Repository};

#[derive(Parser)]
#[command(name = "nordpool-prices", about = "Nord Pool day-ahead price backfill", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch and store every missing delivery date (default)
    Sync,

    /// List the delivery dates the next sync would fetch
    Missing,

    /// Show database statistics
    Stats,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "nordpool_prices=info,warn",
        1 => "nordpool_prices=debug,info",
        _ => "trace",
    };
    let filter = if cli.verbose == 0 {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter))
    } else {
        EnvFilter::new(filter)
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(filter)
        .init();

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {:#}", e);
            return Ok(());
        }
    };

    match cli.command.unwrap_or(Command::Sync) {
        Command::Sync => {
            let _t = utils::Timer::start("Day-ahead price sync");
            if let Some(stats) = Pipeline::new(config).run().await {
                info!(
                    "Done: {} dates ingested, {} rows, {} dates still missing",
                    stats.dates_ingested,
                    stats.rows_inserted,
                    stats.dates_missing - stats.dates_ingested,
                );
            }
        }

        Command::Missing => {
            let mut repo = Repository::connect(&config.database).await?;
            let present = repo.existing_dates().await;
            repo.close().await;

            let today = Local::now().date_naive();
            let missing = missing_dates(config.sync.start_date, today, &present?);
            if missing.is_empty() {
                println!("Up to date through {}.", today.succ_opt().unwrap_or(today));
            } else {
                println!("{} missing dates:", missing.len());
                for d in &missing {
                    println!("  {}", d);
                }
            }
        }

        Command::Stats => {
            let repo = Repository::connect(&config.database).await?;
            let rows = repo.row_count().await;
            let range = repo.date_range().await;
            repo.close().await;

            let (min, max) = range?;
            println!("─────────────────────────────────");
            println!("  Day-ahead prices — Database Stats");
            println!("─────────────────────────────────");
            println!("  Rows     : {}", rows?);
            println!("  From     : {}", utils::fmt_date(min));
            println!("  To       : {}", utils::fmt_date(max));
            println!("─────────────────────────────────");
        }
    }

    Ok(())
}
