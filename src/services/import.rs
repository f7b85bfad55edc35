// src/services/import.rs

//! Replays previously scraped raw items from a JSON array.

use std::collections::VecDeque;
use std::path::Path;

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::RawItem;

use super::ItemSource;

/// Source that yields a fixed list of items in pages of `page_size`.
#[derive(Debug)]
pub struct JsonFileSource {
    items: VecDeque<RawItem>,
    page_size: usize,
}

impl JsonFileSource {
    /// Read a JSON array of objects from `path`.
    pub async fn open(path: impl AsRef<Path>, page_size: usize) -> Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let items: Vec<RawItem> = serde_json::from_slice(&bytes).map_err(|e| {
            AppError::validation(format!(
                "{} is not a JSON array of objects: {e}",
                path.display()
            ))
        })?;
        log::info!("Loaded {} raw items from {}", items.len(), path.display());
        Ok(Self::from_items(items, page_size))
    }

    pub fn from_items(items: Vec<RawItem>, page_size: usize) -> Self {
        Self {
            items: items.into(),
            page_size: page_size.max(1),
        }
    }

    /// Items not yet handed out.
    pub fn remaining(&self) -> usize {
        self.items.len()
    }
}

#[async_trait]
impl ItemSource for JsonFileSource {
    async fn next_page(&mut self) -> Result<Option<Vec<RawItem>>> {
        if self.items.is_empty() {
            return Ok(None);
        }
        let take = self.page_size.min(self.items.len());
        Ok(Some(self.items.drain(..take).collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fields;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_pages_are_sized() {
        let items = (0..5)
            .map(|n| RawItem::new().with(fields::TITLE, format!("Job {n}")))
            .collect();
        let mut source = JsonFileSource::from_items(items, 2);

        assert_eq!(source.next_page().await.unwrap().unwrap().len(), 2);
        assert_eq!(source.next_page().await.unwrap().unwrap().len(), 2);
        assert_eq!(source.next_page().await.unwrap().unwrap().len(), 1);
        assert!(source.next_page().await.unwrap().is_none());
        assert_eq!(source.remaining(), 0);
    }

    #[tokio::test]
    async fn test_open_reads_array() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("raw.json");
        std::fs::write(
            &path,
            r#"[{"title": "Cook", "date": "July 19, 2024"}, {"title": "Chef"}]"#,
        )
        .unwrap();

        let mut source = JsonFileSource::open(&path, 10).await.unwrap();
        let page = source.next_page().await.unwrap().unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[1].get_str(fields::TITLE), Some("Chef"));
    }

    #[tokio::test]
    async fn test_open_rejects_non_array() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("raw.json");
        std::fs::write(&path, r#"{"title": "Cook"}"#).unwrap();

        assert!(JsonFileSource::open(&path, 10).await.is_err());
    }
}
