//! Sitegrab command-line entry point

use anyhow::Context;
use clap::Parser;
use sitegrab::config::{load_config, Config};
use sitegrab::storage::{ImageStore, SessionStore, SqliteStore};
use sitegrab::{ProxyInfo, SessionRegistry};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Sitegrab: a polite single-domain crawler that harvests and compresses
/// images
///
/// Sitegrab crawls one site up to a maximum depth while respecting
/// robots.txt and request delays, and compresses every large image it finds
/// to roughly half its original size.
#[derive(Parser, Debug)]
#[command(name = "sitegrab")]
#[command(version = "1.0.0")]
#[command(about = "A polite image-harvesting crawler", long_about = None)]
struct Cli {
    /// Seed URL to crawl from
    #[arg(value_name = "URL")]
    url: String,

    /// Maximum link depth from the seed
    #[arg(long, default_value_t = 2)]
    max_depth: u32,

    /// Minimum delay between requests in milliseconds (a robots.txt
    /// crawl-delay overrides this)
    #[arg(long, default_value_t = 0)]
    delay_ms: u64,

    /// Proxy to rotate over, as HOST:PORT (repeatable)
    #[arg(long = "proxy", value_name = "HOST:PORT")]
    proxies: Vec<ProxyInfo>,

    /// Path to TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// List previously compressed images for the site and exit
    #[arg(long)]
    list_images: bool,

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

    setup_logging(cli.verbose, cli.quiet);

    let config = match &cli.config {
        Some(path) => load_config(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => Config::default(),
    };

    let store = Arc::new(
        SqliteStore::open(&config.storage.database_path).context("Failed to open database")?,
    );
    let registry = SessionRegistry::new(
        Arc::clone(&store) as Arc<dyn SessionStore>,
        store as Arc<dyn ImageStore>,
        config,
    )
    .context("Failed to set up crawl registry")?;

    if cli.list_images {
        return list_images(&registry, &cli.url);
    }

    let id = registry
        .start_crawl(&cli.url, cli.max_depth, cli.delay_ms, cli.proxies.clone())
        .await
        .context("Failed to start crawl")?;
    tracing::info!(session = %id, "Crawl started");

    tokio::select! {
        _ = registry.wait_for(&id) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!(session = %id, "Interrupt received, stopping crawl");
            registry.stop_crawl(&id);
            registry.wait_for(&id).await;
        }
    }

    tracing::info!(session = %id, "Crawl finished");
    Ok(())
}

/// Prints the compressed-image records for a site
fn list_images(registry: &SessionRegistry, site: &str) -> anyhow::Result<()> {
    let records = registry.list_images(site)?;
    if records.is_empty() {
        println!("No compressed images recorded for {}", site);
        return Ok(());
    }
    for record in &records {
        println!(
            "{}\n  -> {} ({} -> {} bytes)",
            record.original_url, record.path, record.original_size, record.compressed_size
        );
    }
    println!("{} image(s)", records.len());
    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sitegrab=info,warn"),
            1 => EnvFilter::new("sitegrab=debug,info"),
            2 => EnvFilter::new("sitegrab=trace,debug"),
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
