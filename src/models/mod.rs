// src/models/mod.rs

//! Domain models for the scraper application.

mod config;
mod item;

pub use config::{
    Config, CrawlerConfig, ListingSelectors, LoggingConfig, OutputConfig, PipelineConfig,
    SiteConfig, StorageConfig,
};
pub use item::{NormalizedItem, RawItem, fields};
