// src/pipeline/workers.rs

//! Worker pool that validates, normalizes and stores queued items.
//!
//! ```text
//! WorkQueue ──get──► worker 1..N
//!                       │
//!                       ├─► ItemValidator::validate
//!                       ├─► transform::normalize
//!                       ├─► JobStore::upsert (bounded retry)
//!                       └─► mark_done (always, via DoneGuard)
//! ```
//!
//! Every per-item failure is contained inside one loop iteration: invalid
//! items are logged and dropped, persistence errors are retried and then
//! dropped, and a panic while handling an item is caught so the worker keeps
//! running.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use tokio::task::JoinHandle;

use crate::error::{AppError, Result, TransformError, ValidationError};
use crate::models::{Config, NormalizedItem, RawItem};
use crate::storage::{JobStore, UpsertOutcome};

use super::queue::{DoneGuard, WorkQueue};
use super::transform::{TransformSettings, normalize};
use super::validate::ItemValidator;

/// How often and how patiently a failed upsert is retried.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(250),
        }
    }
}

/// Result of handling one item.
#[derive(Debug)]
pub enum ItemOutcome {
    Stored(UpsertOutcome),
    Rejected(ValidationError),
    TransformFailed(TransformError),
    PersistFailed(AppError),
}

/// Stored items waiting for the JSON export, first per export key.
#[derive(Default)]
struct ExportBuffer {
    keys: HashSet<(String, String, String)>,
    items: Vec<NormalizedItem>,
}

impl ExportBuffer {
    fn push(&mut self, item: NormalizedItem) {
        let (title, business, location) = item.export_key();
        let key = (title.to_string(), business.to_string(), location.to_string());
        if self.keys.insert(key) {
            self.items.push(item);
        }
    }
}

/// Validate → normalize → upsert for a single item.
pub struct ItemProcessor {
    validator: ItemValidator,
    settings: TransformSettings,
    store: Arc<dyn JobStore>,
    retry: RetryPolicy,
    stored: Mutex<ExportBuffer>,
}

impl ItemProcessor {
    pub fn new(
        validator: ItemValidator,
        settings: TransformSettings,
        store: Arc<dyn JobStore>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            validator,
            settings,
            store,
            retry,
            stored: Mutex::new(ExportBuffer::default()),
        }
    }

    /// Build a processor from the site and pipeline sections of the config.
    pub fn from_config(config: &Config, store: Arc<dyn JobStore>) -> Result<Self> {
        let validator = ItemValidator::with_base_url(&config.site.base_url)?;
        let retry = RetryPolicy {
            attempts: config.pipeline.persist_attempts.max(1),
            backoff: Duration::from_millis(config.pipeline.retry_backoff_ms),
        };
        Ok(Self::new(
            validator,
            TransformSettings::from(&config.site),
            store,
            retry,
        ))
    }

    /// Handle one raw item. Never fails; the outcome says what happened.
    pub async fn process(&self, raw: RawItem) -> ItemOutcome {
        let raw = match self.validator.validate(raw) {
            Ok(raw) => raw,
            Err(e) => return ItemOutcome::Rejected(e),
        };

        let item = match normalize(&raw, &self.settings) {
            Ok(item) => item,
            Err(e) => return ItemOutcome::TransformFailed(e),
        };

        match self.upsert_with_retry(&item).await {
            Ok(outcome) => {
                self.stored
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(item);
                ItemOutcome::Stored(outcome)
            }
            Err(e) => ItemOutcome::PersistFailed(e),
        }
    }

    async fn upsert_with_retry(&self, item: &NormalizedItem) -> Result<UpsertOutcome> {
        let mut attempt = 1;
        loop {
            match self.store.upsert(item).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) if attempt < self.retry.attempts => {
                    log::warn!(
                        "Upsert of {} failed (attempt {}/{}): {}",
                        item.job_link,
                        attempt,
                        self.retry.attempts,
                        e
                    );
                    attempt += 1;
                    if !self.retry.backoff.is_zero() {
                        tokio::time::sleep(self.retry.backoff).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Drain the items stored so far, in commit order. Only the first item
    /// committed for each export key is kept.
    pub fn take_stored(&self) -> Vec<NormalizedItem> {
        std::mem::take(&mut *self.stored.lock().unwrap_or_else(PoisonError::into_inner)).items
    }
}

/// Counters shared by every worker.
#[derive(Debug, Default)]
pub struct PipelineStats {
    received: AtomicUsize,
    inserted: AtomicUsize,
    replaced: AtomicUsize,
    rejected: AtomicUsize,
    transform_failed: AtomicUsize,
    persist_failed: AtomicUsize,
    panicked: AtomicUsize,
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub received: usize,
    pub inserted: usize,
    pub replaced: usize,
    pub rejected: usize,
    pub transform_failed: usize,
    pub persist_failed: usize,
    pub panicked: usize,
}

impl StatsSnapshot {
    /// Items that reached the store.
    pub fn stored(&self) -> usize {
        self.inserted + self.replaced
    }

    /// Items that were dropped for any reason.
    pub fn dropped(&self) -> usize {
        self.rejected + self.transform_failed + self.persist_failed + self.panicked
    }
}

impl PipelineStats {
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn record(&self, outcome: &ItemOutcome) {
        match outcome {
            ItemOutcome::Stored(UpsertOutcome::Inserted) => Self::bump(&self.inserted),
            ItemOutcome::Stored(UpsertOutcome::Replaced) => Self::bump(&self.replaced),
            ItemOutcome::Rejected(_) => Self::bump(&self.rejected),
            ItemOutcome::TransformFailed(_) => Self::bump(&self.transform_failed),
            ItemOutcome::PersistFailed(_) => Self::bump(&self.persist_failed),
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            inserted: self.inserted.load(Ordering::Relaxed),
            replaced: self.replaced.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            transform_failed: self.transform_failed.load(Ordering::Relaxed),
            persist_failed: self.persist_failed.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
        }
    }
}

/// Fixed set of tasks draining one queue.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    stats: Arc<PipelineStats>,
}

impl WorkerPool {
    /// Spawn `size` workers on the current runtime.
    pub fn start(
        size: usize,
        queue: Arc<WorkQueue<RawItem>>,
        processor: Arc<ItemProcessor>,
    ) -> Result<Self> {
        if size == 0 {
            return Err(AppError::config("worker pool needs at least one worker"));
        }

        let stats = Arc::new(PipelineStats::default());
        let handles = (0..size)
            .map(|id| {
                tokio::spawn(run_worker(
                    id,
                    Arc::clone(&queue),
                    Arc::clone(&processor),
                    Arc::clone(&stats),
                ))
            })
            .collect();

        log::info!("Started {} workers", size);
        Ok(Self { handles, stats })
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Live counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Wait for every worker to exit. Workers exit once their queue is closed
    /// and drained, so close the queue first.
    pub async fn join(self) -> StatsSnapshot {
        for handle in self.handles {
            if let Err(e) = handle.await {
                log::error!("Worker task ended abnormally: {}", e);
            }
        }
        self.stats.snapshot()
    }
}

async fn run_worker(
    id: usize,
    queue: Arc<WorkQueue<RawItem>>,
    processor: Arc<ItemProcessor>,
    stats: Arc<PipelineStats>,
) {
    log::debug!("Worker {} started", id);

    while let Some(raw) = queue.get().await {
        let _done = DoneGuard::new(&queue);
        PipelineStats::bump(&stats.received);

        match AssertUnwindSafe(processor.process(raw)).catch_unwind().await {
            Ok(outcome) => {
                log_outcome(id, &outcome);
                stats.record(&outcome);
            }
            Err(_) => {
                PipelineStats::bump(&stats.panicked);
                log::error!("Worker {} panicked while processing an item; item dropped", id);
            }
        }
    }

    log::debug!("Worker {} finished", id);
}

fn log_outcome(id: usize, outcome: &ItemOutcome) {
    match outcome {
        ItemOutcome::Stored(kind) => log::debug!("Worker {}: item saved ({:?})", id, kind),
        ItemOutcome::Rejected(e) => log::warn!("Worker {}: dropped invalid item: {}", id, e),
        ItemOutcome::TransformFailed(e) => {
            log::warn!("Worker {}: dropped item that failed to transform: {}", id, e)
        }
        ItemOutcome::PersistFailed(e) => {
            log::error!("Worker {}: dropped item after failed upserts: {}", id, e)
        }
    }
}
