//! Site-Binder main entry point
//!
//! This is the command-line interface for capturing a website into a single
//! offline Markdown document.

use anyhow::Context;
use clap::Parser;
use site_binder::config::{compute_config_hash, parse_config, validate, Config};
use site_binder::crawler::{Coordinator, LogSink};
use site_binder::output::{print_statistics, write_markdown, CrawlStatistics};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Site-Binder: capture a website as one offline document
///
/// Site-Binder walks the internal links of a site from a seed URL, extracts
/// the readable text and images of every page it reaches, and writes them in
/// a stable order to a single Markdown file.
#[derive(Parser, Debug)]
#[command(name = "site-binder")]
#[command(version)]
#[command(about = "Capture a website as one offline document", long_about = None)]
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
    #[arg(long)]
    dry_run: bool,

    /// Override the seed URL
    #[arg(long, value_name = "URL")]
    seed: Option<String>,

    /// Override the maximum link depth
    #[arg(long, value_name = "N")]
    max_depth: Option<u32>,

    /// Override the number of concurrent workers
    #[arg(long, value_name = "N")]
    workers: Option<u32>,

    /// Enable headless rendering for script-built pages and screenshot fallback
    #[arg(long)]
    dynamic: bool,
}

impl Cli {
    /// Applies command-line overrides on top of the file configuration
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(seed) = &self.seed {
            config.crawler.seed = seed.clone();
        }
        if let Some(max_depth) = self.max_depth {
            config.crawler.max_depth = max_depth;
        }
        if let Some(workers) = self.workers {
            config.crawler.workers = workers;
        }
        if self.dynamic {
            config.rendering.dynamic = true;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Parse configuration, apply overrides, then validate the result
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let content = std::fs::read_to_string(&cli.config)
        .with_context(|| format!("Failed to read configuration {}", cli.config.display()))?;
    let mut config = parse_config(&content)
        .with_context(|| format!("Failed to parse configuration {}", cli.config.display()))?;
    let config_hash = compute_config_hash(&cli.config)?;

    cli.apply_overrides(&mut config);
    validate(&config).context("Invalid configuration")?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config);
        return Ok(());
    }

    handle_crawl(config, config_hash).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("site_binder=info,warn"),
            1 => EnvFilter::new("site_binder=debug,info"),
            2 => EnvFilter::new("site_binder=trace,debug"),
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

/// Handles the --dry-run mode: shows the resolved configuration
fn handle_dry_run(config: &Config) {
    println!("=== Site-Binder Dry Run ===\n");

    println!("Crawler:");
    println!("  Seed: {}", config.crawler.seed);
    println!("  Max depth: {}", config.crawler.max_depth);
    println!("  Workers: {}", config.crawler.workers);
    println!("  Page delay: {}ms", config.crawler.page_delay_ms);
    match config.crawler.deadline_secs {
        Some(secs) => println!("  Deadline: {}s", secs),
        None => println!("  Deadline: none"),
    }

    println!("\nFetcher:");
    println!("  Attempts: {}", config.fetcher.max_attempts);
    println!("  Retry delay: {}ms", config.fetcher.retry_delay_ms);
    println!("  Timeout: {}s", config.fetcher.timeout_secs);
    println!("  User agent: {}", config.fetcher.user_agent);

    println!("\nLink Exclusions ({} categories):", config.links.exclusions.len());
    for (category, keywords) in &config.links.exclusions {
        println!("  - {}: {}", category, keywords.join(", "));
    }

    println!("\nRendering:");
    if config.rendering.dynamic {
        println!("  Dynamic: enabled ({})", config.rendering.chrome_path);
    } else {
        println!("  Dynamic: disabled");
    }

    println!("\nOutput:");
    println!("  Document: {}", config.output.document_path.display());
    println!(
        "  Assets: {} ({})",
        config.assets.directory.display(),
        config.assets.extensions.join(", ")
    );

    println!("\n✓ Configuration is valid");
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, config_hash: String) -> anyhow::Result<()> {
    let document_path = config.output.document_path.clone();

    let coordinator = Coordinator::new(config)?.with_event_sink(Arc::new(LogSink));

    // Ctrl-C stops dispatching; in-flight pages finish and the partial
    // document is still written
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, stopping after in-flight pages");
            on_signal.cancel();
        }
    });

    let mut document = coordinator.run(cancel).await?;
    document.config_hash = Some(config_hash);

    write_markdown(&document, &document_path)
        .with_context(|| format!("Failed to write {}", document_path.display()))?;
    tracing::info!("Document written to {}", document_path.display());

    print_statistics(&CrawlStatistics::from_document(&document));
    println!("\n✓ Document written to: {}", document_path.display());

    Ok(())
}
