//! Local filesystem document store.
//!
//! Each collection is an append-only journal of full documents, one JSON
//! object per line. Opening a collection replays the journal so the last line
//! for a job link wins; closing it rewrites the journal with one line per
//! document.
//!
//! ## Storage Layout
//!
//! ```text
//! {root}/
//! └── {database}/
//!     ├── {collection}.jsonl    # journal
//!     └── {collection}.tmp      # compaction scratch file, renamed over the journal
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::NormalizedItem;
use crate::storage::{JobStore, UpsertOutcome};

struct Collection {
    docs: BTreeMap<String, NormalizedItem>,
    /// `None` once closed
    journal: Option<File>,
    /// Journal length after the last complete line
    journal_len: u64,
    /// Lines appended since the last compaction
    appended: usize,
}

/// Journal contents as read back on open.
struct Replayed {
    docs: BTreeMap<String, NormalizedItem>,
    /// Byte length up to and including the last newline
    complete_len: u64,
    /// Bytes after the last newline (a line cut short by a crash)
    torn_len: u64,
}

/// Journaled collection on the local filesystem.
pub struct LocalStore {
    path: PathBuf,
    inner: Mutex<Collection>,
}

impl LocalStore {
    /// Open (or create) `{root}/{database}/{collection}.jsonl`.
    pub async fn open(root: impl AsRef<Path>, database: &str, collection: &str) -> Result<Self> {
        let dir = root.as_ref().join(database);
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            AppError::persistence(format!("cannot create {}: {e}", dir.display()))
        })?;
        let path = dir.join(format!("{collection}.jsonl"));

        let Replayed {
            docs,
            complete_len,
            torn_len,
        } = Self::replay(&path).await?;
        let journal = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| AppError::persistence(format!("cannot open {}: {e}", path.display())))?;

        if torn_len > 0 {
            log::warn!(
                "Dropping {} bytes of unterminated journal tail in {}",
                torn_len,
                path.display()
            );
            journal.set_len(complete_len).await.map_err(|e| {
                AppError::persistence(format!("cannot repair {}: {e}", path.display()))
            })?;
        }

        log::info!(
            "Opened collection {} with {} documents",
            path.display(),
            docs.len()
        );

        Ok(Self {
            path,
            inner: Mutex::new(Collection {
                docs,
                journal: Some(journal),
                journal_len: complete_len,
                appended: 0,
            }),
        })
    }

    /// Path of the journal file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rebuild the document map from a journal, last line per key winning.
    ///
    /// Only newline-terminated lines are replayed. Anything after the last
    /// newline is reported as torn so `open` can cut it off before appending.
    async fn replay(path: &Path) -> Result<Replayed> {
        let content = match tokio::fs::read(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Replayed {
                    docs: BTreeMap::new(),
                    complete_len: 0,
                    torn_len: 0,
                });
            }
            Err(e) => return Err(AppError::Io(e)),
        };

        let complete_len = content
            .iter()
            .rposition(|&b| b == b'\n')
            .map_or(0, |pos| pos + 1);
        let complete = String::from_utf8_lossy(&content[..complete_len]);

        let mut docs = BTreeMap::new();
        for (line_no, line) in complete.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<NormalizedItem>(line) {
                Ok(doc) => {
                    docs.insert(doc.job_link.clone(), doc);
                }
                Err(e) => log::warn!(
                    "Skipping unreadable line {} in {}: {}",
                    line_no + 1,
                    path.display(),
                    e
                ),
            }
        }
        Ok(Replayed {
            docs,
            complete_len: complete_len as u64,
            torn_len: (content.len() - complete_len) as u64,
        })
    }

    /// Rewrite the journal with one line per document (write to temp, then rename).
    async fn compact(&self, docs: &BTreeMap<String, NormalizedItem>) -> Result<()> {
        let mut bytes = Vec::new();
        for doc in docs.values() {
            serde_json::to_writer(&mut bytes, doc)?;
            bytes.push(b'\n');
        }

        let tmp = self.path.with_extension("tmp");
        let mut file = File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl JobStore for LocalStore {
    async fn upsert(&self, item: &NormalizedItem) -> Result<UpsertOutcome> {
        let mut line = serde_json::to_vec(item)?;
        line.push(b'\n');

        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        let journal = inner
            .journal
            .as_mut()
            .ok_or_else(|| AppError::persistence("collection is closed"))?;

        let written = match journal.write_all(&line).await {
            Ok(()) => journal.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            // Cut off any partial line so a retry starts on a fresh line.
            if let Err(trunc) = journal.set_len(inner.journal_len).await {
                log::error!(
                    "Cannot truncate {} after failed write: {}",
                    self.path.display(),
                    trunc
                );
            }
            return Err(AppError::persistence(format!("journal write failed: {e}")));
        }

        inner.journal_len += line.len() as u64;
        inner.appended += 1;
        let previous = inner.docs.insert(item.job_link.clone(), item.clone());
        Ok(match previous {
            Some(_) => UpsertOutcome::Replaced,
            None => UpsertOutcome::Inserted,
        })
    }

    async fn get(&self, job_link: &str) -> Result<Option<NormalizedItem>> {
        Ok(self.inner.lock().await.docs.get(job_link).cloned())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.inner.lock().await.docs.len())
    }

    async fn all(&self) -> Result<Vec<NormalizedItem>> {
        Ok(self.inner.lock().await.docs.values().cloned().collect())
    }

    async fn close(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let Some(mut journal) = inner.journal.take() else {
            return Ok(());
        };
        journal.flush().await?;
        drop(journal);

        if inner.appended > 0 {
            self.compact(&inner.docs).await?;
            log::debug!(
                "Compacted {} ({} appended lines, {} documents)",
                self.path.display(),
                inner.appended,
                inner.docs.len()
            );
            inner.appended = 0;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn item(link: &str, salary: &str) -> NormalizedItem {
        NormalizedItem {
            title: "Baker".into(),
            date: "2024-07-19".into(),
            business: "Bread Co".into(),
            location: "Moncton".into(),
            salary: Some(salary.into()),
            job_link: link.into(),
            logo: None,
            source: "Job bank".into(),
            country: Some("Canada".into()),
        }
    }

    #[tokio::test]
    async fn test_open_creates_collection() {
        let tmp = TempDir::new().unwrap();
        let store = LocalStore::open(tmp.path(), "jobbank", "jobs").await.unwrap();
        assert!(store.path().ends_with("jobbank/jobs.jsonl"));
        assert!(store.path().exists());
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_job_link() {
        let tmp = TempDir::new().unwrap();
        let store = LocalStore::open(tmp.path(), "jobbank", "jobs").await.unwrap();

        let outcome = store.upsert(&item("https://example.com/1", "$20")).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Inserted);
        let outcome = store.upsert(&item("https://example.com/1", "$22")).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Replaced);
        store.upsert(&item("https://example.com/2", "$30")).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 2);
        let stored = store.get("https://example.com/1").await.unwrap().unwrap();
        assert_eq!(stored.salary.as_deref(), Some("$22"));
    }

    #[tokio::test]
    async fn test_reopen_replays_journal_without_close() {
        let tmp = TempDir::new().unwrap();
        {
            let store = LocalStore::open(tmp.path(), "db", "jobs").await.unwrap();
            store.upsert(&item("https://example.com/1", "$20")).await.unwrap();
            store.upsert(&item("https://example.com/1", "$21")).await.unwrap();
        }

        let reopened = LocalStore::open(tmp.path(), "db", "jobs").await.unwrap();
        assert_eq!(reopened.count().await.unwrap(), 1);
        let stored = reopened.get("https://example.com/1").await.unwrap().unwrap();
        assert_eq!(stored.salary.as_deref(), Some("$21"));
    }

    #[tokio::test]
    async fn test_close_compacts_and_rejects_writes() {
        let tmp = TempDir::new().unwrap();
        let store = LocalStore::open(tmp.path(), "db", "jobs").await.unwrap();
        for salary in ["$1", "$2", "$3"] {
            store.upsert(&item("https://example.com/1", salary)).await.unwrap();
        }
        store.close().await.unwrap();
        store.close().await.unwrap();

        let content = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(content.lines().count(), 1);
        assert!(content.contains("$3"));
        assert!(store.upsert(&item("https://example.com/2", "$4")).await.is_err());
    }

    #[tokio::test]
    async fn test_replay_skips_torn_line() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("db");
        std::fs::create_dir_all(&dir).unwrap();
        let good = serde_json::to_string(&item("https://example.com/1", "$5")).unwrap();
        std::fs::write(dir.join("jobs.jsonl"), format!("{good}\n{{\"title\": \"Ba")).unwrap();

        let store = LocalStore::open(tmp.path(), "db", "jobs").await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_append_after_torn_tail_survives_reopen() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("db");
        std::fs::create_dir_all(&dir).unwrap();
        let first = serde_json::to_string(&item("https://example.com/1", "$5")).unwrap();
        std::fs::write(dir.join("jobs.jsonl"), format!("{first}\n{{\"title\": \"Ba")).unwrap();

        {
            let store = LocalStore::open(tmp.path(), "db", "jobs").await.unwrap();
            store.upsert(&item("https://example.com/2", "$6")).await.unwrap();
        }

        let content = std::fs::read_to_string(dir.join("jobs.jsonl")).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.ends_with('\n'));

        let reopened = LocalStore::open(tmp.path(), "db", "jobs").await.unwrap();
        assert_eq!(reopened.count().await.unwrap(), 2);
        let stored = reopened.get("https://example.com/2").await.unwrap().unwrap();
        assert_eq!(stored.salary.as_deref(), Some("$6"));
    }

    #[tokio::test]
    async fn test_concurrent_upserts_to_distinct_keys() {
        let tmp = TempDir::new().unwrap();
        let store = std::sync::Arc::new(LocalStore::open(tmp.path(), "db", "jobs").await.unwrap());

        let tasks: Vec<_> = (0..20)
            .map(|i| {
                let store = std::sync::Arc::clone(&store);
                tokio::spawn(async move {
                    store
                        .upsert(&item(&format!("https://example.com/{i}"), "$1"))
                        .await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(store.count().await.unwrap(), 20);
        drop(store);
        let reopened = LocalStore::open(tmp.path(), "db", "jobs").await.unwrap();
        assert_eq!(reopened.count().await.unwrap(), 20);
    }
}
