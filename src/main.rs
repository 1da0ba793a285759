//! Gallery-Harvest main entry point
//!
//! This is the command-line interface for the Gallery-Harvest crawler.

use anyhow::{bail, Context};
use clap::Parser;
use gallery_harvest::config::{load_config_with_hash, Config};
use gallery_harvest::crawler::run_crawl;
use gallery_harvest::output::{
    generate_markdown_summary, print_crawl_summary, print_statistics, LedgerStatistics,
};
use gallery_harvest::storage::{RunStore, SUMMARY_FILE};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Gallery-Harvest: a breadth-first gallery crawler
///
/// Gallery-Harvest walks every category of a paginated gallery site, one
/// category at a time, downloads each image once and records its metadata
/// in a per-run JSON ledger.
#[derive(Parser, Debug)]
#[command(name = "gallery-harvest")]
#[command(version)]
#[command(about = "A breadth-first gallery crawler", long_about = None)]
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

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with_all = ["stats", "export_summary", "list_runs"])]
    dry_run: bool,

    /// Show statistics of a run's ledger and exit
    #[arg(long, conflicts_with_all = ["dry_run", "export_summary", "list_runs"])]
    stats: bool,

    /// Regenerate a run's summary.md from its ledger and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats", "list_runs"])]
    export_summary: bool,

    /// List the runs under the crawl root and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats", "export_summary"])]
    list_runs: bool,

    /// Run used by --stats and --export-summary (default: latest)
    #[arg(long, value_name = "RUN_ID")]
    run: Option<String>,

    /// Crawl at most this many categories
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    max_categories: Option<u32>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if let Some(max) = cli.max_categories {
        config.crawler.max_categories = Some(max);
    }

    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config, cli.run.as_deref()).await?;
    } else if cli.export_summary {
        handle_export_summary(&config, cli.run.as_deref()).await?;
    } else if cli.list_runs {
        handle_list_runs(&config).await?;
    } else {
        handle_crawl(config, &config_hash).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("gallery_harvest=info,warn"),
            1 => EnvFilter::new("gallery_harvest=debug,info"),
            2 => EnvFilter::new("gallery_harvest=trace,debug"),
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

/// Handles the --dry-run mode: shows the validated configuration
fn handle_dry_run(config: &Config) {
    let crawler = &config.crawler;
    println!("=== Gallery-Harvest Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Allowed domain: {}", crawler.allowed_domain);
    println!("  Start URL: {}", crawler.start_url);
    println!("  Max concurrent requests: {}", crawler.max_concurrent_requests);
    println!("  Request delay: {}s", crawler.request_delay);
    println!("  Timeout: {}s", crawler.timeout);
    println!(
        "  Retries: {} (backoff {}ms)",
        crawler.max_retries, crawler.retry_backoff_ms
    );
    println!("  Max image size: {} bytes", crawler.max_image_bytes);
    match crawler.max_categories {
        Some(max) => println!("  Max categories: {}", max),
        None => println!("  Max categories: unlimited"),
    }
    match crawler.max_pages_per_category {
        Some(max) => println!("  Max pages per category: {}", max),
        None => println!("  Max pages per category: unlimited"),
    }

    println!("\nUser Agent:");
    println!("  {}", config.user_agent.header_value());

    println!("\nOutput:");
    println!("  Crawl root: {}", config.output.crawl_root);
    println!("  Write summary: {}", config.output.write_summary);

    let site = &config.site;
    println!("\nSite:");
    println!(
        "  Gallery link: {}",
        site.gallery_link_selector.as_deref().unwrap_or("(start page)")
    );
    println!("  Category selector: {}", site.category_selector);
    println!("  Image selector: {}", site.image_selector);
    println!("  Page parameter: {}", site.page_param.as_deref().unwrap_or("(none)"));
    println!("  Extensions: {}", site.supported_extensions.join(", "));

    println!("\n✓ Configuration is valid");
}

/// Picks the requested run, or the latest one
async fn resolve_run(store: &RunStore, run: Option<&str>) -> anyhow::Result<String> {
    if let Some(run_id) = run {
        return Ok(run_id.to_string());
    }
    match store.latest_run().await? {
        Some(run_id) => Ok(run_id),
        None => bail!("No runs found under {}", store.runs_dir().display()),
    }
}

/// Handles the --stats mode: shows statistics of a run's ledger
async fn handle_stats(config: &Config, run: Option<&str>) -> anyhow::Result<()> {
    let store = RunStore::new(&config.output.crawl_root);
    let run_id = resolve_run(&store, run).await?;

    let records = store
        .load_ledger(&run_id)
        .await
        .with_context(|| format!("Failed to load ledger of run {}", run_id))?;
    print_statistics(&LedgerStatistics::from_records(&run_id, &records));

    Ok(())
}

/// Handles the --export-summary mode: rewrites a run's markdown summary
async fn handle_export_summary(config: &Config, run: Option<&str>) -> anyhow::Result<()> {
    let store = RunStore::new(&config.output.crawl_root);
    let run_id = resolve_run(&store, run).await?;

    println!("=== Exporting Crawl Summary ===\n");

    let manifest = store
        .load_manifest(&run_id)
        .await
        .with_context(|| format!("Failed to load manifest of run {}", run_id))?;
    let records = store
        .load_ledger(&run_id)
        .await
        .with_context(|| format!("Failed to load ledger of run {}", run_id))?;

    let stats = LedgerStatistics::from_records(&run_id, &records);
    let output_path = store.run_directory(&run_id).join(SUMMARY_FILE);
    generate_markdown_summary(&manifest, &stats, &output_path)
        .with_context(|| format!("Failed to write {}", output_path.display()))?;

    println!("✓ Summary exported to: {}", output_path.display());

    Ok(())
}

/// Handles the --list-runs mode
async fn handle_list_runs(config: &Config) -> anyhow::Result<()> {
    let store = RunStore::new(&config.output.crawl_root);
    let runs = store.list_runs().await?;

    if runs.is_empty() {
        println!("No runs under {}", store.runs_dir().display());
        return Ok(());
    }

    println!("Runs under {}:", store.runs_dir().display());
    for run_id in runs {
        match store.load_manifest(&run_id).await {
            Ok(manifest) => {
                let images = manifest
                    .summary
                    .as_ref()
                    .map(|summary| summary.images_recorded)
                    .unwrap_or(0);
                println!(
                    "  {}  {:<11}  {} images  started {}",
                    run_id,
                    manifest.status.as_str(),
                    images,
                    manifest.started_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
            Err(e) => {
                tracing::debug!("No manifest for {}: {}", run_id, e);
                println!("  {}  (no manifest)", run_id);
            }
        }
    }

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, config_hash: &str) -> anyhow::Result<()> {
    tracing::info!(
        "Crawling {} from {}",
        config.crawler.allowed_domain,
        config.crawler.start_url
    );

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after in-flight requests");
            on_signal.cancel();
        }
    });

    let summary = run_crawl(config, config_hash, cancel)
        .await
        .context("Crawl failed")?;

    print_crawl_summary(&summary);

    Ok(())
}
