// src/pipeline/run.rs

//! End-to-end scrape run: producer, worker pool, store, export.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::models::{Config, RawItem};
use crate::services::ItemSource;
use crate::storage::{ExportSummary, JobStore, export_unique};

use super::queue::WorkQueue;
use super::workers::{ItemProcessor, StatsSnapshot, WorkerPool};

/// Summary of one run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Pages taken from the source
    pub pages: usize,
    /// Items handed to the queue
    pub queued: usize,
    /// Whether the run stopped early on a shutdown signal
    pub interrupted: bool,
    /// Why the source stopped early, if it failed
    pub source_error: Option<String>,
    pub stats: StatsSnapshot,
    /// `None` when nothing was stored or the export failed
    pub export: Option<ExportSummary>,
}

/// Run the scrape pipeline until the source is exhausted or `shutdown` fires.
///
/// Shutdown order: stop taking pages, close the queue, wait for the workers
/// to drain it, close the store, then write the JSON export.
pub async fn run_pipeline(
    config: &Config,
    source: &mut dyn ItemSource,
    store: Arc<dyn JobStore>,
    shutdown: CancellationToken,
) -> Result<RunSummary> {
    let start_time = Utc::now();
    log::info!("Starting scrape run with {} workers", config.pipeline.workers);

    let processor = Arc::new(ItemProcessor::from_config(config, Arc::clone(&store))?);
    let queue: Arc<WorkQueue<RawItem>> = Arc::new(WorkQueue::new(config.pipeline.queue_capacity));
    let pool = WorkerPool::start(
        config.pipeline.workers,
        Arc::clone(&queue),
        Arc::clone(&processor),
    )?;

    let produced = produce(source, &queue, &shutdown).await;

    queue.close();
    let progress = pool.stats();
    log::info!(
        "Producer stopped; {} items handled so far, draining {} queued items",
        progress.received,
        queue.len()
    );
    let stats = pool.join().await;

    if let Err(e) = store.close().await {
        log::error!("Failed to close store: {}", e);
    }

    if let Some(e) = &produced.error {
        log::error!("Item source failed after {} pages: {}", produced.pages, e);
    }

    let stored = processor.take_stored();
    let export = if stored.is_empty() {
        log::info!("No items stored; skipping JSON export");
        None
    } else {
        match export_unique(&config.output.json_path, &stored).await {
            Ok(summary) => Some(summary),
            Err(e) => {
                log::error!("Failed to save job data: {}", e);
                None
            }
        }
    };

    let summary = RunSummary {
        start_time,
        end_time: Utc::now(),
        pages: produced.pages,
        queued: produced.queued,
        interrupted: produced.interrupted,
        source_error: produced.error.map(|e| e.to_string()),
        stats,
        export,
    };
    log::info!(
        "Run complete: {} pages, {} queued, {} stored ({} new), {} dropped",
        summary.pages,
        summary.queued,
        summary.stats.stored(),
        summary.stats.inserted,
        summary.stats.dropped()
    );
    Ok(summary)
}

#[derive(Debug, Default)]
struct Produced {
    pages: usize,
    queued: usize,
    interrupted: bool,
    error: Option<AppError>,
}

/// Feed pages into the queue until the source ends, fails, or shutdown fires.
async fn produce(
    source: &mut dyn ItemSource,
    queue: &WorkQueue<RawItem>,
    shutdown: &CancellationToken,
) -> Produced {
    let mut produced = Produced::default();

    loop {
        let page = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                log::info!("Shutdown requested; no further pages will be fetched");
                produced.interrupted = true;
                return produced;
            }
            page = source.next_page() => page,
        };

        let items = match page {
            Ok(Some(items)) => items,
            Ok(None) => return produced,
            Err(e) => {
                produced.error = Some(e);
                return produced;
            }
        };
        produced.pages += 1;

        for item in items {
            if queue.put(item).await.is_err() {
                log::warn!("Queue closed while producing; stopping");
                produced.interrupted = true;
                return produced;
            }
            produced.queued += 1;
        }
    }
}
