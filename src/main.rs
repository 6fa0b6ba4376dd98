//! Tile-Harvest main entry point
//!
//! This is the command-line interface for the Tile-Harvest listing crawler.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tile_harvest::catalog::load_catalog;
use tile_harvest::config::{load_config_with_hash, Config};
use tile_harvest::crawler::{run_crawl, StopFlag};
use tile_harvest::output::{load_statistics, print_run_summary, print_statistics};
use tile_harvest::storage::{plan_resume, CheckpointManager};
use tracing_subscriber::EnvFilter;

/// Tile-Harvest: a resumable, tile-driven listing harvester
///
/// Tile-Harvest crawls paginated listing pages seeded from a catalog of
/// geographic tiles, merges every sighting into one master dataset, and
/// resumes where it left off after an interruption.
#[derive(Parser, Debug)]
#[command(name = "tile-harvest")]
#[command(version)]
#[command(about = "A resumable, tile-driven listing harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Discard the checkpoint and crawl from the first tile (the master dataset is kept)
    #[arg(long)]
    fresh: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with_all = ["stats", "fresh"])]
    dry_run: bool,

    /// Show statistics from the output files and exit
    #[arg(long, conflicts_with_all = ["dry_run", "fresh"])]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config)
    } else if cli.stats {
        handle_stats(&config)
    } else {
        handle_crawl(&config, cli.fresh).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("tile_harvest=info,warn"),
            1 => EnvFilter::new("tile_harvest=debug,info"),
            2 => EnvFilter::new("tile_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    println!("=== Tile-Harvest Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Pacing delay: {}ms", config.crawler.pacing_delay);
    println!("  Retry budget: {}", config.crawler.retry_budget);
    println!("  Session pool size: {}", config.crawler.session_pool_size);
    println!("  Persist every: {} merges", config.crawler.persist_every);
    println!("  Order: {:?}", config.crawler.order);
    if let Some(cap) = config.crawler.max_pages_per_tile {
        println!("  Max pages per tile: {}", cap);
    }

    println!("\nOutput:");
    println!("  Master: {}", config.output.master_path.display());
    println!("  Checkpoint: {}", config.output.checkpoint_path.display());
    println!("  Error log: {}", config.output.error_log_path.display());

    println!("\nExtractor:");
    println!("  Records: {}", config.extractor.record_selector);
    println!(
        "  Id: {} [{}]",
        config.extractor.id_selector, config.extractor.id_attribute
    );
    for field in &config.extractor.fields {
        println!("  - {}: {}", field.name, field.selector);
    }

    let catalog = load_catalog(&config.catalog.sources).context("failed to load tile catalog")?;
    println!(
        "\nCatalog ({} sources, {} tiles):",
        config.catalog.sources.len(),
        catalog.len()
    );
    for (zoom, count) in catalog.zoom_breakdown() {
        println!("  Zoom {}: {} tiles", zoom, count);
    }

    let checkpoint = CheckpointManager::new(&config.output.checkpoint_path)
        .read()
        .context("failed to read checkpoint")?;
    let plan = plan_resume(checkpoint.as_ref(), &catalog);

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would start at tile {} of {} ({:?})",
        plan.start_tile,
        catalog.len(),
        plan.kind
    );

    Ok(())
}

/// Handles the --stats mode: shows statistics from the output files
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Master: {}\n", config.output.master_path.display());

    let stats = load_statistics(&config.output).context("failed to load statistics")?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: &Config, fresh: bool) -> anyhow::Result<()> {
    if fresh {
        tracing::info!("Starting fresh crawl (discarding checkpoint, keeping master dataset)");
        CheckpointManager::new(&config.output.checkpoint_path)
            .clear()
            .context("failed to clear checkpoint")?;
    }

    let stop = StopFlag::new();
    let handle = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, finishing the current round");
            handle.request_stop();
        }
    });

    match run_crawl(config, stop).await {
        Ok(summary) => {
            print_run_summary(&summary);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
