//! dvmeta main entry point
//!
//! This is the command-line interface for the Dataverse metadata crawler.

use anyhow::{bail, Context};
use chrono::Local;
use clap::Parser;
use dvmeta::config::{load_config_with_hash, Config};
use dvmeta::crawler::{Coordinator, CrawlOptions, CrawlProgress, HttpMetadataSource, VersionPolicy};
use dvmeta::output::{
    file_timestamp, generate_markdown_log, print_statistics, spreadsheet, write_exports, CrawlStatistics,
    CrawlSummary, CsvOutputHandler, ExportSelection, JsonOutputHandler,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Exit status used when a second interrupt aborts the crawl
const EXIT_INTERRUPTED: i32 = 130;

/// dvmeta: a concurrent metadata crawler for Dataverse
///
/// dvmeta walks every collection below a root collection, fetches the
/// metadata of each dataset in the requested version, and exports the
/// results as JSON along with a list of everything that failed.
#[derive(Parser, Debug)]
#[command(name = "dvmeta")]
#[command(version)]
#[command(about = "A concurrent metadata crawler for Dataverse", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Identifier or alias of the collection to crawl
    #[arg(short, long, value_name = "ID|ALIAS")]
    collection: String,

    /// Dataset version to fetch: draft, latest, latest-published, x or x.y
    #[arg(short = 'd', long, value_name = "POLICY")]
    dataset_version: VersionPolicy,

    /// Also export the role assignments of every dataset (requires an API key)
    #[arg(short, long)]
    permission: bool,

    /// Also export the collections that contain no datasets
    #[arg(short, long)]
    empty: bool,

    /// Also write the dataset metadata as a CSV spreadsheet
    #[arg(short, long)]
    spreadsheet: bool,

    /// Do not write the markdown crawl log
    #[arg(long)]
    no_log: bool,

    /// API key, overriding the one in the configuration file
    #[arg(short, long, env = "DATAVERSE_API_KEY", hide_env_values = true)]
    auth: Option<String>,

    /// Maximum number of concurrent requests, overriding the configuration file
    #[arg(long, value_name = "N")]
    concurrency: Option<u32>,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long)]
    dry_run: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    apply_overrides(&mut config, &cli)?;

    if cli.permission && config.source.effective_api_key().is_none() {
        bail!("--permission requires an API key (api-key in the config, --auth, or DATAVERSE_API_KEY)");
    }

    if cli.dry_run {
        handle_dry_run(&config, &cli);
        return Ok(());
    }

    handle_crawl(config, config_hash, &cli).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("dvmeta=info,warn"),
            1 => EnvFilter::new("dvmeta=debug,info"),
            2 => EnvFilter::new("dvmeta=trace,debug"),
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

/// Applies command-line overrides on top of the loaded configuration
fn apply_overrides(config: &mut Config, cli: &Cli) -> anyhow::Result<()> {
    if let Some(key) = &cli.auth {
        config.source.api_key = Some(key.clone());
    }

    if let Some(limit) = cli.concurrency {
        if !(1..=100).contains(&limit) {
            bail!("--concurrency must be between 1 and 100, got {}", limit);
        }
        config.crawler.max_concurrent_requests = limit;
    }

    Ok(())
}

/// Handles the --dry-run mode: shows what would be crawled
fn handle_dry_run(config: &Config, cli: &Cli) {
    println!("=== dvmeta Dry Run ===\n");

    println!("Source:");
    println!("  Base URL: {}", config.source.base_url);
    println!(
        "  API key: {}",
        if config.source.effective_api_key().is_some() {
            "configured"
        } else {
            "none"
        }
    );
    println!("  User agent: {}", config.source.user_agent);

    println!("\nCrawler Configuration:");
    println!(
        "  Max concurrent requests: {}",
        config.crawler.max_concurrent_requests
    );
    println!("  Request timeout: {}s", config.crawler.request_timeout_secs);
    println!(
        "  Retries: {} (first delay {}ms)",
        config.crawler.max_retries, config.crawler.retry_delay_ms
    );

    println!("\nOutput:");
    println!("  Directory: {}", config.output.directory);
    println!("  Permissions: {}", cli.permission);
    println!("  Empty collections: {}", cli.empty);
    println!("  Spreadsheet: {}", cli.spreadsheet);
    println!("  Crawl log: {}", !cli.no_log);

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would crawl collection {} for dataset version {}",
        cli.collection, cli.dataset_version
    );
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, config_hash: String, cli: &Cli) -> anyhow::Result<()> {
    let source = HttpMetadataSource::from_config(&config)
        .context("Failed to build the HTTP client")?;

    let options = CrawlOptions::new(cli.collection.clone(), cli.dataset_version)
        .with_permissions(cli.permission)
        .with_concurrency(config.crawler.max_concurrent_requests as usize);
    let coordinator = Coordinator::new(Arc::new(source), options);

    spawn_interrupt_handler(coordinator.cancellation_token());
    let done = CancellationToken::new();
    let reporter = tokio::spawn(report_progress(coordinator.progress(), done.clone()));

    let started_at = Local::now();
    let result = coordinator.run().await;
    let finished_at = Local::now();

    done.cancel();
    if let Err(e) = reporter.await {
        tracing::debug!("Progress reporter stopped abnormally: {}", e);
    }

    // Export results
    let output_dir = PathBuf::from(&config.output.directory);
    let timestamp = file_timestamp();
    let mut handler = JsonOutputHandler::new(&output_dir, &timestamp)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;
    let selection = ExportSelection {
        empty_collections: cli.empty,
        permissions: cli.permission,
    };
    let mut exports = write_exports(&mut handler, &result, selection).context("Failed to export results")?;

    if cli.spreadsheet {
        let sheet = spreadsheet(&result, &config.source.base_url);
        let record = CsvOutputHandler::new(&output_dir, &timestamp)
            .and_then(|writer| writer.write_spreadsheet(&sheet))
            .context("Failed to write the spreadsheet")?;
        exports.extend(record);
    }

    let statistics = CrawlStatistics::from_result(&result);

    if !cli.no_log {
        let summary = CrawlSummary {
            started_at,
            finished_at,
            config_hash,
            base_url: config.source.base_url.clone(),
            root: cli.collection.clone(),
            policy: cli.dataset_version.to_string(),
            statistics: statistics.clone(),
            exports,
        };
        let path = generate_markdown_log(&summary, &output_dir, &timestamp)
            .context("Failed to write the crawl log")?;
        tracing::info!("Crawl log written to {}", path.display());
    }

    if !cli.quiet {
        print_statistics(&statistics);
    }

    if let Some(failure) = result.failures.first().filter(|_| result.root_failed()) {
        bail!(
            "Could not list collection {}: {} ({})",
            result.root,
            failure.message,
            failure.kind
        );
    }

    Ok(())
}

/// Cancels the crawl on the first Ctrl-C and exits on the second
fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        tracing::warn!(
            "Interrupt received; finishing requests in flight (press Ctrl-C again to abort)"
        );
        cancel.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::error!("Second interrupt received, aborting");
            std::process::exit(EXIT_INTERRUPTED);
        }
    });
}

/// Logs the live counters every few seconds until `done` is cancelled
async fn report_progress(progress: Arc<CrawlProgress>, done: CancellationToken) {
    let mut interval = tokio::time::interval(Duration::from_secs(5));
    interval.tick().await;

    loop {
        tokio::select! {
            _ = done.cancelled() => break,
            _ = interval.tick() => {
                let snapshot = progress.snapshot();
                tracing::info!(
                    "Progress: {} collections listed, {} datasets fetched, {} permissions, {} failures",
                    snapshot.collections_visited,
                    snapshot.leaves_fetched,
                    snapshot.permissions_fetched,
                    snapshot.failures
                );
            }
        }
    }
}
