use anyhow::{Context, Result};
use chainwalk_core::detect_signals;
use chainwalk_host::{
    backfill::{BackfillCoordinator, BackfillOutcome, StateFile},
    catalog::CatalogStore,
    live::{CycleOutcome, LiveScanner},
    BlockSource, Config, RpcBlockSource, Shutdown,
};
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Bitcoin block signal scanner and catalog", long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Scans the rolling window below the tip once, writes the snapshot and catalogs new signals.
    Live,
    /// Walks history below the live window in chunks, resuming from the saved state.
    Backfill,
    /// Derives the signal of a single block and prints it as JSON.
    Extract {
        /// Block hash in display (big-endian hex) order
        block_hash: String,
        /// Also append the signal to the catalog
        #[clap(long)]
        save: bool,
    },
    /// Summarizes the catalog and backfill progress.
    Status,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string())),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load().context("invalid configuration")?;

    match cli.command {
        Commands::Live => {
            let source = RpcBlockSource::new(&config)?;
            let shutdown = Shutdown::new();
            shutdown.install_signal_handler()?;
            let scanner = LiveScanner::new(&source, &config);
            match scanner.run_cycle(&shutdown)? {
                CycleOutcome::EmptyWindow { tip_height } => {
                    info!("nothing scanned at tip {}", tip_height)
                }
                CycleOutcome::Scanned { start, end, .. } => {
                    info!("scanned {}..={}", start, end)
                }
            };
        }
        Commands::Backfill => {
            let source = RpcBlockSource::new(&config)?;
            let shutdown = Shutdown::new();
            shutdown.install_signal_handler()?;
            let coordinator = BackfillCoordinator::new(&source, &config);
            match coordinator.run(&shutdown)? {
                BackfillOutcome::NothingToDo => info!("backfill has nothing to do"),
                BackfillOutcome::Completed {
                    last_processed_height,
                    new_records,
                } => info!(
                    "backfill finished at {} with {} new records",
                    last_processed_height, new_records
                ),
                BackfillOutcome::Cancelled {
                    last_processed_height,
                } => info!("backfill stopped at {}", last_processed_height),
            };
        }
        Commands::Extract { block_hash, save } => {
            let source = RpcBlockSource::new(&config)?;
            let block = source.fetch_block_by_hash(&block_hash)?;
            let (signals, _) = detect_signals(std::slice::from_ref(&block));
            println!("{}", serde_json::to_string_pretty(&signals)?);
            if save {
                let written = CatalogStore::new(&config.catalog_path).append(&signals)?;
                info!("{} new catalog records", written);
            }
        }
        Commands::Status => {
            let stats = CatalogStore::new(&config.catalog_path).stats()?;
            let state = StateFile::new(&config.backfill_state_path).load()?;
            println!("catalog: {}", config.catalog_path.display());
            println!("  records:     {}", stats.records);
            match (stats.min_height, stats.max_height) {
                (Some(min), Some(max)) => println!("  heights:     {min}..={max}"),
                _ => println!("  heights:     -"),
            }
            println!("  polyphonic:  {}", stats.polyphonic);
            if stats.skipped_lines > 0 {
                println!("  unreadable:  {}", stats.skipped_lines);
            }
            for (era, count) in &stats.per_era {
                println!("  {:<14} {}", era.label(), count);
            }
            println!("backfill: last processed height {}", state.last_processed_height);
        }
    }
    Ok(())
}
