//! JSON array export of unique postings.
//!
//! Unlike the document store, which is keyed by job link, the export treats
//! two postings as the same job when title, business and location all match.
//! Records already in the file come first and win over new ones.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::{NormalizedItem, fields};

/// Outcome of an export run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub path: PathBuf,
    /// Records found in the file before this run
    pub existing: usize,
    /// New records appended by this run
    pub added: usize,
    /// Records dropped as duplicates of an earlier one
    pub duplicates: usize,
    /// Records in the file after this run
    pub total: usize,
}

type ExportKey = (String, String, String);

fn key_of(record: &Value) -> ExportKey {
    let field = |name: &str| {
        record
            .get(name)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    (
        field(fields::TITLE),
        field(fields::BUSINESS),
        field(fields::LOCATION),
    )
}

async fn read_existing(path: &Path) -> Result<Vec<Value>> {
    match tokio::fs::read(path).await {
        Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Vec::new()),
        Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
            AppError::validation(format!(
                "{} does not hold a JSON array of records: {e}",
                path.display()
            ))
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(AppError::Io(e)),
    }
}

/// Write bytes atomically (write to temp, then rename).
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let tmp = path.with_extension("tmp");
    let mut file = tokio::fs::File::create(&tmp).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    drop(file);

    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Merge `items` into the JSON array at `path`, dropping duplicates.
pub async fn export_unique(path: impl AsRef<Path>, items: &[NormalizedItem]) -> Result<ExportSummary> {
    let path = path.as_ref();
    let existing = read_existing(path).await?;
    let existing_count = existing.len();

    let mut seen: HashSet<ExportKey> = HashSet::new();
    let mut unique = Vec::with_capacity(existing_count + items.len());
    let mut duplicates = 0;

    for record in existing {
        if seen.insert(key_of(&record)) {
            unique.push(record);
        } else {
            duplicates += 1;
        }
    }
    let kept_existing = unique.len();

    for item in items {
        let (title, business, location) = item.export_key();
        if seen.insert((title.to_string(), business.to_string(), location.to_string())) {
            unique.push(serde_json::to_value(item)?);
        } else {
            duplicates += 1;
        }
    }

    let bytes = serde_json::to_vec_pretty(&unique)?;
    write_atomic(path, &bytes).await?;

    let summary = ExportSummary {
        path: path.to_path_buf(),
        existing: existing_count,
        added: unique.len() - kept_existing,
        duplicates,
        total: unique.len(),
    };
    log::info!(
        "Job data saved to {} ({} records, {} new, {} duplicates dropped)",
        path.display(),
        summary.total,
        summary.added,
        summary.duplicates
    );
    Ok(summary)
}
