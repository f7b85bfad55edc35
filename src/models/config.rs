//! Application configuration structures.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Target site and per-item constants
    #[serde(default)]
    pub site: SiteConfig,

    /// HTTP and crawling behavior settings
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// Worker pool and retry settings
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Document store connection
    #[serde(default)]
    pub storage: StorageConfig,

    /// JSON export settings
    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Override storage and pool settings from environment variables.
    ///
    /// Recognizes `MONGO_URI`, `MONGO_DATABASE`, `MONGO_COLLECTION` and
    /// `JOBBANK_WORKERS`.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Same as [`Config::apply_env`] with an injectable lookup.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(uri) = lookup("MONGO_URI") {
            self.storage.uri = uri;
        }
        if let Some(database) = lookup("MONGO_DATABASE") {
            self.storage.database = database;
        }
        if let Some(collection) = lookup("MONGO_COLLECTION") {
            self.storage.collection = collection;
        }
        if let Some(workers) = lookup("JOBBANK_WORKERS") {
            self.pipeline.workers = workers.trim().parse().map_err(|_| {
                AppError::config(format!("JOBBANK_WORKERS is not a number: {workers}"))
            })?;
        }
        Ok(())
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if url::Url::parse(&self.site.base_url).is_err() {
            return Err(AppError::validation(format!(
                "site.base_url is not an absolute URL: {}",
                self.site.base_url
            )));
        }
        if url::Url::parse(&self.site.start_url).is_err() {
            return Err(AppError::validation(format!(
                "site.start_url is not an absolute URL: {}",
                self.site.start_url
            )));
        }
        if self.site.source.trim().is_empty() {
            return Err(AppError::validation("site.source is empty"));
        }
        if self.crawler.user_agent.trim().is_empty() {
            return Err(AppError::validation("crawler.user_agent is empty"));
        }
        if self.crawler.timeout_secs == 0 {
            return Err(AppError::validation("crawler.timeout_secs must be > 0"));
        }
        if self.pipeline.workers == 0 {
            return Err(AppError::validation("pipeline.workers must be > 0"));
        }
        if self.pipeline.persist_attempts == 0 {
            return Err(AppError::validation(
                "pipeline.persist_attempts must be > 0",
            ));
        }
        if self.storage.uri.trim().is_empty() {
            return Err(AppError::validation("storage.uri is empty"));
        }
        if self.storage.database.trim().is_empty() || self.storage.collection.trim().is_empty() {
            return Err(AppError::validation(
                "storage.database and storage.collection must be set",
            ));
        }
        if self.output.json_path.trim().is_empty() {
            return Err(AppError::validation("output.json_path is empty"));
        }
        Ok(())
    }
}

/// Target site settings and constants attached to every item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// First listing page
    #[serde(default = "defaults::start_url")]
    pub start_url: String,

    /// Base for resolving relative job links
    #[serde(default = "defaults::base_url")]
    pub base_url: String,

    /// Boilerplate removed from every title
    #[serde(default = "defaults::unwanted_text")]
    pub unwanted_text: String,

    /// Source tag stored with every record
    #[serde(default = "defaults::source")]
    pub source: String,

    #[serde(default = "defaults::logo")]
    pub logo: String,

    #[serde(default = "defaults::country")]
    pub country: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            start_url: defaults::start_url(),
            base_url: defaults::base_url(),
            unwanted_text: defaults::unwanted_text(),
            source: defaults::source(),
            logo: defaults::logo(),
            country: defaults::country(),
        }
    }
}

/// HTTP client and crawling behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Delay between listing pages in milliseconds
    #[serde(default = "defaults::request_delay")]
    pub request_delay_ms: u64,

    /// Stop after this many pages (0 = until the listing runs out)
    #[serde(default)]
    pub max_pages: usize,

    /// Query parameter carrying the page number
    #[serde(default = "defaults::page_param")]
    pub page_param: String,

    #[serde(default)]
    pub selectors: ListingSelectors,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            request_delay_ms: defaults::request_delay(),
            max_pages: 0,
            page_param: defaults::page_param(),
            selectors: ListingSelectors::default(),
        }
    }
}

/// CSS selectors for one job posting row on a listing page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingSelectors {
    #[serde(default = "defaults::row_selector")]
    pub row: String,
    #[serde(default = "defaults::title_selector")]
    pub title: String,
    #[serde(default = "defaults::date_selector")]
    pub date: String,
    #[serde(default = "defaults::business_selector")]
    pub business: String,
    #[serde(default = "defaults::location_selector")]
    pub location: String,
    #[serde(default = "defaults::salary_selector")]
    pub salary: String,
    #[serde(default = "defaults::link_selector")]
    pub link: String,
    /// Attribute holding the posting URL
    #[serde(default = "defaults::link_attr")]
    pub link_attr: String,
}

impl Default for ListingSelectors {
    fn default() -> Self {
        Self {
            row: defaults::row_selector(),
            title: defaults::title_selector(),
            date: defaults::date_selector(),
            business: defaults::business_selector(),
            location: defaults::location_selector(),
            salary: defaults::salary_selector(),
            link: defaults::link_selector(),
            link_attr: defaults::link_attr(),
        }
    }
}

/// Worker pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Number of concurrent workers
    #[serde(default = "defaults::workers")]
    pub workers: usize,

    /// Queue capacity before the producer waits (0 = unbounded)
    #[serde(default = "defaults::queue_capacity")]
    pub queue_capacity: usize,

    /// Upsert attempts per item, including the first
    #[serde(default = "defaults::persist_attempts")]
    pub persist_attempts: u32,

    /// Pause between upsert attempts in milliseconds
    #[serde(default = "defaults::retry_backoff")]
    pub retry_backoff_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: defaults::workers(),
            queue_capacity: defaults::queue_capacity(),
            persist_attempts: defaults::persist_attempts(),
            retry_backoff_ms: defaults::retry_backoff(),
        }
    }
}

/// Document store connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// `memory://` or a directory, optionally `file://`-prefixed
    #[serde(default = "defaults::storage_uri")]
    pub uri: String,

    #[serde(default = "defaults::database")]
    pub database: String,

    #[serde(default = "defaults::collection")]
    pub collection: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            uri: defaults::storage_uri(),
            database: defaults::database(),
            collection: defaults::collection(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// JSON array of unique postings
    #[serde(default = "defaults::json_path")]
    pub json_path: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            json_path: defaults::json_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "defaults::log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
        }
    }
}

mod defaults {
    // Site defaults
    pub fn start_url() -> String {
        "https://www.jobbank.gc.ca/jobsearch/jobsearch".into()
    }
    pub fn base_url() -> String {
        "https://www.jobbank.gc.ca".into()
    }
    pub fn unwanted_text() -> String {
        "Unwanted Text Here".into()
    }
    pub fn source() -> String {
        "Job bank".into()
    }
    pub fn logo() -> String {
        "https://upload.wikimedia.org/wikipedia/commons/thumb/d/d9/Flag_of_Canada_%28Pantone%29.svg/1200px-Flag_of_Canada_%28Pantone%29.svg.png".into()
    }
    pub fn country() -> String {
        "Canada".into()
    }

    // Crawler defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; jobbank/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn request_delay() -> u64 {
        1000
    }
    pub fn page_param() -> String {
        "page".into()
    }

    // Selector defaults
    pub fn row_selector() -> String {
        "article.action-buttons".into()
    }
    pub fn title_selector() -> String {
        "h3.title span.noctitle".into()
    }
    pub fn date_selector() -> String {
        "ul.list-unstyled li.date".into()
    }
    pub fn business_selector() -> String {
        "ul.list-unstyled li.business".into()
    }
    pub fn location_selector() -> String {
        "ul.list-unstyled li.location".into()
    }
    pub fn salary_selector() -> String {
        "ul.list-unstyled li.salary".into()
    }
    pub fn link_selector() -> String {
        "a.resultJobItem".into()
    }
    pub fn link_attr() -> String {
        "href".into()
    }

    // Pipeline defaults
    pub fn workers() -> usize {
        6
    }
    pub fn queue_capacity() -> usize {
        1000
    }
    pub fn persist_attempts() -> u32 {
        3
    }
    pub fn retry_backoff() -> u64 {
        250
    }

    // Storage defaults
    pub fn storage_uri() -> String {
        "file://data".into()
    }
    pub fn database() -> String {
        "jobbank".into()
    }
    pub fn collection() -> String {
        "job_data".into()
    }

    pub fn json_path() -> String {
        "job_data.json".into()
    }
    pub fn log_level() -> String {
        "info".into()
    }
}
