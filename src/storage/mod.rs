//! Storage abstractions for job posting persistence.
//!
//! Postings are documents keyed by their absolute job link. An upsert replaces
//! the whole document for its key, which makes it idempotent and is the only
//! deduplication the pipeline relies on.
//!
//! ## Backends
//!
//! - `memory://`: [`MemoryStore`], process-local, used by tests
//! - anything else: [`LocalStore`], a journaled collection on disk
//!
//! ```text
//! {root}/
//! └── {database}/
//!     └── {collection}.jsonl    # one full document per line, last write wins
//! ```

pub mod export;
pub mod local;
pub mod memory;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{NormalizedItem, StorageConfig};

// Re-export for convenience
pub use export::{ExportSummary, export_unique};
pub use local::LocalStore;
pub use memory::MemoryStore;

/// What an upsert did to the collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No document existed for the job link
    Inserted,
    /// An existing document was replaced
    Replaced,
}

/// Trait for job posting storage backends.
///
/// Implementations must accept concurrent upserts from several workers.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert or fully replace the document keyed by `item.job_link`.
    async fn upsert(&self, item: &NormalizedItem) -> Result<UpsertOutcome>;

    /// Look up a document by job link.
    async fn get(&self, job_link: &str) -> Result<Option<NormalizedItem>>;

    /// Number of stored documents.
    async fn count(&self) -> Result<usize>;

    /// Every stored document, ordered by job link.
    async fn all(&self) -> Result<Vec<NormalizedItem>>;

    /// Flush and release the backend. Further upserts fail.
    async fn close(&self) -> Result<()>;
}

/// Where a storage URI points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageTarget {
    Memory,
    Directory(PathBuf),
}

impl StorageTarget {
    /// Interpret a connection string.
    pub fn parse(uri: &str) -> Self {
        let uri = uri.trim();
        if uri.starts_with("memory:") {
            return Self::Memory;
        }
        let path = uri.strip_prefix("file://").unwrap_or(uri);
        Self::Directory(PathBuf::from(path))
    }
}

/// Open the store described by the configuration.
pub async fn open(config: &StorageConfig) -> Result<Arc<dyn JobStore>> {
    match StorageTarget::parse(&config.uri) {
        StorageTarget::Memory => {
            log::info!("Using in-memory store for {}.{}", config.database, config.collection);
            Ok(Arc::new(MemoryStore::new()))
        }
        StorageTarget::Directory(root) => {
            let store = LocalStore::open(&root, &config.database, &config.collection).await?;
            Ok(Arc::new(store))
        }
    }
}
