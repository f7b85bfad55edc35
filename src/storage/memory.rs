//! In-process document store.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{AppError, Result};
use crate::models::NormalizedItem;
use crate::storage::{JobStore, UpsertOutcome};

/// Store that keeps documents in a map for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    docs: RwLock<BTreeMap<String, NormalizedItem>>,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn upsert(&self, item: &NormalizedItem) -> Result<UpsertOutcome> {
        if self.closed.load(Ordering::Acquire) {
            return Err(AppError::persistence("store is closed"));
        }
        let previous = self
            .docs
            .write()
            .await
            .insert(item.job_link.clone(), item.clone());
        Ok(match previous {
            Some(_) => UpsertOutcome::Replaced,
            None => UpsertOutcome::Inserted,
        })
    }

    async fn get(&self, job_link: &str) -> Result<Option<NormalizedItem>> {
        Ok(self.docs.read().await.get(job_link).cloned())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.docs.read().await.len())
    }

    async fn all(&self) -> Result<Vec<NormalizedItem>> {
        Ok(self.docs.read().await.values().cloned().collect())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
