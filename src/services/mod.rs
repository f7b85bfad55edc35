//! Item sources feeding the pipeline.
//!
//! A source is the producer side of the work queue: it drives pagination and
//! hands over one page of raw items at a time.
//!
//! - `JobSearchCrawler`: fetches and parses listing pages over HTTP
//! - `JsonFileSource`: replays raw items from a JSON file

mod crawler;
mod import;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::RawItem;

pub use crawler::{JobSearchCrawler, PageFetcher, parse_listing};
pub use import::JsonFileSource;

/// Producer of raw items, one page at a time.
#[async_trait]
pub trait ItemSource: Send {
    /// Next page of items, or `None` once the source is exhausted.
    async fn next_page(&mut self) -> Result<Option<Vec<RawItem>>>;
}
