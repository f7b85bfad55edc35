//! Job Bank scraper CLI
//!
//! Local execution entry point.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use jobbank::{
    error::{AppError, Result},
    models::Config,
    pipeline::{self, RunSummary},
    services::{ItemSource, JobSearchCrawler, JsonFileSource},
    storage,
    utils::shutdown,
};
#[cfg(unix)]
use tokio::signal::unix::SignalKind;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// jobbank - Job Bank posting scraper
#[derive(Parser, Debug)]
#[command(name = "jobbank", version, about = "Scrapes Job Bank postings into a document store")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "jobbank.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl the job search listing and store every posting
    Scrape {
        /// Stop after this many result pages
        #[arg(long)]
        max_pages: Option<usize>,

        /// Override the JSON export path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Push raw items from a JSON array file through the pipeline
    Import {
        file: PathBuf,

        /// Items handed to the queue per batch
        #[arg(long, default_value_t = 100)]
        page_size: usize,
    },

    /// Validate the configuration file
    Validate,

    /// Show what the document store holds
    Info,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool, configured: &str) {
    let level = if verbose { "debug" } else { configured };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Forward Ctrl-C and SIGTERM into a channel until it closes.
fn spawn_signal_forwarder(tx: mpsc::Sender<()>) {
    tokio::spawn(async move {
        #[cfg(unix)]
        let mut term = match tokio::signal::unix::signal(SignalKind::terminate()) {
            Ok(term) => Some(term),
            Err(e) => {
                log::warn!("Cannot listen for SIGTERM: {}", e);
                None
            }
        };

        loop {
            #[cfg(unix)]
            let received = match term.as_mut() {
                Some(term) => tokio::select! {
                    r = tokio::signal::ctrl_c() => r.is_ok(),
                    s = term.recv() => s.is_some(),
                },
                None => tokio::signal::ctrl_c().await.is_ok(),
            };
            #[cfg(not(unix))]
            let received = tokio::signal::ctrl_c().await.is_ok();

            if !received || tx.send(()).await.is_err() {
                break;
            }
        }
    });
}

/// Cancel `token` on the first interrupt; exit with status 130 on the second.
fn spawn_signal_listener(token: CancellationToken) {
    let (tx, rx) = mpsc::channel(2);
    spawn_signal_forwarder(tx);
    tokio::spawn(shutdown::watch_interrupts(rx, token, || {
        std::process::exit(130)
    }));
}

/// Run a source through the pipeline with signal handling.
async fn run_source(config: &Config, source: &mut dyn ItemSource) -> Result<RunSummary> {
    let store = storage::open(&config.storage).await?;
    let cancel = CancellationToken::new();
    spawn_signal_listener(cancel.clone());

    let summary = pipeline::run_pipeline(config, source, store, cancel).await?;
    report(&summary);

    match &summary.source_error {
        Some(e) => Err(AppError::crawl("item source", e)),
        None => Ok(summary),
    }
}

fn report(summary: &RunSummary) {
    let stats = &summary.stats;
    log::info!(
        "Pages: {} | queued: {} | inserted: {} | replaced: {}",
        summary.pages,
        summary.queued,
        stats.inserted,
        stats.replaced
    );
    log::info!(
        "Dropped: {} invalid, {} untransformable, {} unsaved, {} panicked",
        stats.rejected,
        stats.transform_failed,
        stats.persist_failed,
        stats.panicked
    );
    if let Some(export) = &summary.export {
        log::info!(
            "Export: {} records in {}",
            export.total,
            export.path.display()
        );
    }
    if summary.interrupted {
        log::warn!("Run was interrupted before the listing was exhausted");
    }
    log::info!(
        "Elapsed: {}s",
        (summary.end_time - summary.start_time).num_seconds()
    );
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = Config::load_or_default(&cli.config);
    init_logging(cli.verbose, &config.logging.level);
    config.apply_env()?;

    log::info!("Loaded configuration from {}", cli.config.display());

    match cli.command {
        Command::Scrape { max_pages, output } => {
            if let Some(pages) = max_pages {
                config.crawler.max_pages = pages;
            }
            if let Some(path) = output {
                config.output.json_path = path.display().to_string();
            }
            config.validate()?;

            let mut crawler = JobSearchCrawler::new(&config)?;
            log::info!("Started scraping {}", config.site.start_url);
            run_source(&config, &mut crawler).await?;
        }

        Command::Import { file, page_size } => {
            config.validate()?;
            let mut source = JsonFileSource::open(&file, page_size).await?;
            run_source(&config, &mut source).await?;
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!("✓ Site: {}", config.site.start_url);
            log::info!("✓ Workers: {}", config.pipeline.workers);
            log::info!(
                "✓ Storage: {} ({}.{})",
                config.storage.uri,
                config.storage.database,
                config.storage.collection
            );
            log::info!("All validations passed!");
        }

        Command::Info => {
            let store = storage::open(&config.storage).await?;
            let count = store.count().await?;
            log::info!(
                "Collection {}.{}: {} postings",
                config.storage.database,
                config.storage.collection,
                count
            );
            if let Some(latest) = store.all().await?.iter().map(|j| &j.date).max() {
                log::info!("Most recent posting date: {}", latest);
            }
            store.close().await?;
        }
    }

    log::info!("Done!");

    Ok(())
}
