//! Relcrawl main entry point
//!
//! This is the command-line interface for the relcrawl identity-graph
//! crawler.

use anyhow::Context;
use clap::{Parser, Subcommand};
use relcrawl::config::{load_config_with_hash, load_from_env, Config};
use relcrawl::output::{format_friends_feeds, lookup_json, print_statistics};
use relcrawl::Spider;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Relcrawl: an identity-graph crawler
///
/// Relcrawl follows `rel="me"` and canonical relations between pages and
/// answers which URLs belong to the same identity once the cluster around a
/// page has been crawled.
#[derive(Parser, Debug)]
#[command(name = "relcrawl")]
#[command(version)]
#[command(about = "An identity-graph crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file; defaults plus RELCRAWL_* variables
    /// are used when omitted
    #[arg(short, long, value_name = "CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the crawler until interrupted with Ctrl-C
    Run,

    /// Print the related URLs of a page, or register a callback if pending
    Lookup {
        url: String,

        /// URL to POST the result to once the lookup resolves
        #[arg(long)]
        callback: Option<String>,
    },

    /// Add a page to the crawl queue
    Add { url: String },

    /// Queue a page for an immediate refresh
    Refresh { url: String },

    /// Print one feed per friend of a page's identity
    FriendsFeeds { url: String },

    /// Show statistics from the database and exit
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let config = load(&cli)?;
    let spider = Spider::open(config).context("Failed to open the crawl database")?;

    match cli.command {
        Command::Run => handle_run(&spider).await?,
        Command::Lookup { url, callback } => {
            let lookup = spider.get_related(&url, callback.as_deref()).await?;
            println!("{}", lookup_json(&lookup));
        }
        Command::Add { url } => {
            let profile = spider.add_new_profile(&url, true).await?;
            let state = spider.profile_state(profile.url())?;
            println!("Added {} ({})", profile.url(), state);
            if state.needs_force_refresh() {
                println!("Run `relcrawl refresh {}` to crawl it again", profile.url());
            }
        }
        Command::Refresh { url } => {
            let profile = spider.force_refresh(&url).await?;
            let state = spider.profile_state(profile.url())?;
            println!("Queued {} for refresh ({})", profile.url(), state);
        }
        Command::FriendsFeeds { url } => {
            let feeds = spider.get_friends_feeds(&url).await?;
            print!("{}", format_friends_feeds(&feeds));
        }
        Command::Stats => {
            println!("Database: {}\n", spider.context().config.storage.database_path);
            print_statistics(&spider.statistics()?);
        }
    }

    Ok(())
}

/// Loads the configuration file, or falls back to defaults
fn load(cli: &Cli) -> anyhow::Result<Config> {
    match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let (config, hash) = load_config_with_hash(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            Ok(config)
        }
        None => {
            tracing::info!("No configuration file given, using defaults");
            Ok(load_from_env()?)
        }
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("relcrawl=info,warn"),
            1 => EnvFilter::new("relcrawl=debug,info"),
            2 => EnvFilter::new("relcrawl=trace,debug"),
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

/// Runs the scheduler until Ctrl-C, then drains in-flight fetches
async fn handle_run(spider: &Spider) -> anyhow::Result<()> {
    spider.start();

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("Interrupted, waiting for in-flight fetches to finish");

    spider.close().await?;

    let metrics = spider.scheduler().metrics();
    tracing::info!(
        "Crawled {} pages, {} successfully",
        metrics.crawled,
        metrics.succeeded
    );
    Ok(())
}
