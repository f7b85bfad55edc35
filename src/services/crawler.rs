// src/services/crawler.rs

//! Job search listing crawler.
//!
//! Walks the paginated search results with plain HTTP requests and extracts
//! one raw item per posting row using configured CSS selectors. Values are
//! passed on as scraped; cleaning happens in the worker pool.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{Config, ListingSelectors, RawItem, fields};
use crate::utils::http::{create_async_client, fetch_text};
use crate::utils::{get_domain, with_query_param};

use super::ItemSource;

/// Fetches one listing page as HTML.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<String>;
}

#[async_trait]
impl PageFetcher for reqwest::Client {
    async fn fetch(&self, url: &Url) -> Result<String> {
        fetch_text(self, url.as_str()).await
    }
}

/// Crawl context owning the page fetcher and per-run state.
///
/// Dropping the crawler releases the HTTP client.
pub struct JobSearchCrawler {
    fetcher: Box<dyn PageFetcher>,
    start_url: Url,
    page_param: String,
    selectors: ListingSelectors,
    logo: String,
    country: String,
    delay: Duration,
    max_pages: usize,
    next_page: usize,
    /// Links already emitted this run; skips re-extraction only, the store
    /// still deduplicates.
    seen: HashSet<String>,
    finished: bool,
}

impl JobSearchCrawler {
    /// Create a crawler for the configured site.
    pub fn new(config: &Config) -> Result<Self> {
        let client = create_async_client(&config.crawler)?;
        Self::with_fetcher(config, Box::new(client))
    }

    /// Create a crawler that reads pages through `fetcher`.
    pub fn with_fetcher(config: &Config, fetcher: Box<dyn PageFetcher>) -> Result<Self> {
        let start_url = Url::parse(&config.site.start_url)?;
        compile(&config.crawler.selectors)?;

        Ok(Self {
            fetcher,
            start_url,
            page_param: config.crawler.page_param.clone(),
            selectors: config.crawler.selectors.clone(),
            logo: config.site.logo.clone(),
            country: config.site.country.clone(),
            delay: Duration::from_millis(config.crawler.request_delay_ms),
            max_pages: config.crawler.max_pages,
            next_page: 1,
            seen: HashSet::new(),
            finished: false,
        })
    }

    /// URL of the given 1-based results page.
    pub fn page_url(&self, page: usize) -> Url {
        if page <= 1 {
            self.start_url.clone()
        } else {
            with_query_param(&self.start_url, &self.page_param, page)
        }
    }

    /// Number of distinct job links emitted so far.
    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    fn finish(&mut self, reason: &str) -> Result<Option<Vec<RawItem>>> {
        log::info!("Crawl finished after {} pages: {}", self.next_page - 1, reason);
        self.finished = true;
        Ok(None)
    }
}

#[async_trait]
impl ItemSource for JobSearchCrawler {
    async fn next_page(&mut self) -> Result<Option<Vec<RawItem>>> {
        if self.finished {
            return Ok(None);
        }
        if self.max_pages > 0 && self.next_page > self.max_pages {
            return self.finish("page limit reached");
        }
        if self.next_page > 1 && !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let page = self.next_page;
        let url = self.page_url(page);
        log::info!(
            "Fetching results page {} from {}",
            page,
            get_domain(url.as_str()).unwrap_or_default()
        );
        let html = match self.fetcher.fetch(&url).await {
            Ok(html) => html,
            Err(e) => {
                self.finished = true;
                return Err(AppError::crawl(format!("results page {page}"), e));
            }
        };
        self.next_page += 1;

        let rows = parse_listing(&html, &self.selectors)?;
        log::info!("Found {} job postings on page {}", rows.len(), page);
        if rows.is_empty() {
            return self.finish("no more results");
        }

        let mut fresh = Vec::with_capacity(rows.len());
        for mut item in rows {
            if let Some(link) = item.get_str(fields::JOB_LINK) {
                if !self.seen.insert(link.to_string()) {
                    continue;
                }
            }
            if !self.logo.is_empty() {
                item.set(fields::LOGO, self.logo.as_str());
            }
            if !self.country.is_empty() {
                item.set(fields::COUNTRY, self.country.as_str());
            }
            fresh.push(item);
        }

        if fresh.is_empty() {
            return self.finish("page repeated earlier results");
        }
        Ok(Some(fresh))
    }
}

struct CompiledSelectors {
    row: Selector,
    title: Selector,
    date: Selector,
    business: Selector,
    location: Selector,
    salary: Selector,
    link: Selector,
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}

fn compile(selectors: &ListingSelectors) -> Result<CompiledSelectors> {
    Ok(CompiledSelectors {
        row: parse_selector(&selectors.row)?,
        title: parse_selector(&selectors.title)?,
        date: parse_selector(&selectors.date)?,
        business: parse_selector(&selectors.business)?,
        location: parse_selector(&selectors.location)?,
        salary: parse_selector(&selectors.salary)?,
        link: parse_selector(&selectors.link)?,
    })
}

/// Text directly inside an element, falling back to all descendant text.
fn own_text(element: ElementRef<'_>) -> String {
    let direct: String = element
        .children()
        .filter_map(|node| node.value().as_text().map(|t| t.to_string()))
        .collect();
    if direct.trim().is_empty() {
        element.text().collect()
    } else {
        direct
    }
}

fn first_text(row: ElementRef<'_>, selector: &Selector) -> Option<String> {
    row.select(selector).next().map(own_text)
}

/// Extract one raw item per posting row of a results page.
pub fn parse_listing(html: &str, selectors: &ListingSelectors) -> Result<Vec<RawItem>> {
    let sel = compile(selectors)?;
    let document = Html::parse_document(html);

    let items = document
        .select(&sel.row)
        .map(|row| {
            let mut item = RawItem::new();
            if let Some(title) = first_text(row, &sel.title) {
                item.set(fields::TITLE, title);
            }
            if let Some(date) = first_text(row, &sel.date) {
                item.set(fields::DATE, date);
            }
            if let Some(business) = first_text(row, &sel.business) {
                item.set(fields::BUSINESS, business);
            }
            let location: Vec<Value> = row
                .select(&sel.location)
                .map(own_text)
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .map(Value::String)
                .collect();
            if !location.is_empty() {
                item.set(fields::LOCATION, location);
            }
            if let Some(salary) = first_text(row, &sel.salary) {
                item.set(fields::SALARY, salary);
            }
            if let Some(href) = row
                .select(&sel.link)
                .next()
                .or_else(|| row.value().attr(&selectors.link_attr).map(|_| row))
                .and_then(|el| el.value().attr(&selectors.link_attr))
            {
                item.set(fields::JOB_LINK, href);
            }
            item
        })
        .collect();

    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
        <article class="action-buttons">
          <a class="resultJobItem" href="/jobsearch/jobposting/41234?source=searchresults">
            <h3 class="title"><span class="noctitle">  Line cook
            </span></h3>
            <ul class="list-unstyled">
              <li class="date">July 19, 2024</li>
              <li class="business">Diner Inc</li>
              <li class="location"><span class="wb-inv">Location</span> Halifax (NS)</li>
              <li class="salary"><span class="wb-inv">Salary:</span> $17.00 hourly</li>
            </ul>
          </a>
        </article>
        <article class="action-buttons">
          <a class="resultJobItem" href="/jobsearch/jobposting/41235">
            <h3 class="title"><span class="noctitle">Baker</span></h3>
            <ul class="list-unstyled">
              <li class="date">July 18, 2024</li>
            </ul>
          </a>
        </article>
        </body></html>
    "#;

    #[test]
    fn test_parse_listing_extracts_rows() {
        let items = parse_listing(PAGE, &ListingSelectors::default()).unwrap();
        assert_eq!(items.len(), 2);

        let first = &items[0];
        assert_eq!(first.text(fields::TITLE).unwrap().trim(), "Line cook");
        assert_eq!(first.get_str(fields::DATE), Some("July 19, 2024"));
        assert_eq!(first.get_str(fields::BUSINESS), Some("Diner Inc"));
        assert_eq!(first.text(fields::LOCATION).as_deref(), Some("Halifax (NS)"));
        assert_eq!(first.text(fields::SALARY).unwrap().trim(), "$17.00 hourly");
        assert_eq!(
            first.get_str(fields::JOB_LINK),
            Some("/jobsearch/jobposting/41234?source=searchresults")
        );
    }

    #[test]
    fn test_parse_listing_leaves_missing_fields_absent() {
        let items = parse_listing(PAGE, &ListingSelectors::default()).unwrap();
        let second = &items[1];
        assert!(second.get(fields::BUSINESS).is_none());
        assert!(second.get(fields::LOCATION).is_none());
        assert!(second.get(fields::SALARY).is_none());
        assert_eq!(second.get_str(fields::JOB_LINK), Some("/jobsearch/jobposting/41235"));
    }

    #[test]
    fn test_parse_listing_empty_page() {
        let items = parse_listing("<html><body></body></html>", &ListingSelectors::default())
            .unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn test_parse_selector_invalid() {
        let selectors = ListingSelectors {
            row: "[[invalid".to_string(),
            ..ListingSelectors::default()
        };
        assert!(matches!(
            parse_listing(PAGE, &selectors),
            Err(AppError::Selector { .. })
        ));
    }

    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    const START: &str = "https://example.com/jobsearch/jobsearch";

    /// Serves canned pages by URL and records every request.
    struct FixtureFetcher {
        pages: HashMap<String, String>,
        requested: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl PageFetcher for FixtureFetcher {
        async fn fetch(&self, url: &Url) -> Result<String> {
            self.requested.lock().unwrap().push(url.to_string());
            self.pages
                .get(url.as_str())
                .cloned()
                .ok_or_else(|| AppError::crawl(url.as_str(), "HTTP status 404 Not Found"))
        }
    }

    fn listing(ids: &[u32]) -> String {
        let rows: String = ids
            .iter()
            .map(|id| {
                format!(
                    r#"<article class="action-buttons">
                         <a class="resultJobItem" href="/jobsearch/jobposting/{id}">
                           <h3 class="title"><span class="noctitle">Job {id}</span></h3>
                           <ul class="list-unstyled"><li class="date">July 19, 2024</li></ul>
                         </a>
                       </article>"#
                )
            })
            .collect();
        format!("<html><body>{rows}</body></html>")
    }

    fn page_key(page: usize) -> String {
        if page == 1 {
            START.to_string()
        } else {
            format!("{START}?page={page}")
        }
    }

    fn crawler_over(
        pages: &[&[u32]],
        max_pages: usize,
    ) -> (JobSearchCrawler, Arc<Mutex<Vec<String>>>) {
        let mut config = Config::default();
        config.site.start_url = START.to_string();
        config.crawler.request_delay_ms = 0;
        config.crawler.max_pages = max_pages;

        let requested = Arc::new(Mutex::new(Vec::new()));
        let fetcher = FixtureFetcher {
            pages: pages
                .iter()
                .enumerate()
                .map(|(i, ids)| (page_key(i + 1), listing(ids)))
                .collect(),
            requested: Arc::clone(&requested),
        };
        let crawler = JobSearchCrawler::with_fetcher(&config, Box::new(fetcher)).unwrap();
        (crawler, requested)
    }

    fn links(items: &[RawItem]) -> Vec<&str> {
        items
            .iter()
            .filter_map(|item| item.get_str(fields::JOB_LINK))
            .collect()
    }

    #[tokio::test]
    async fn test_crawl_walks_pages_until_empty() {
        let (mut crawler, requested) = crawler_over(&[&[1, 2], &[3], &[]], 0);

        let first = crawler.next_page().await.unwrap().unwrap();
        assert_eq!(
            links(&first),
            vec!["/jobsearch/jobposting/1", "/jobsearch/jobposting/2"]
        );
        let second = crawler.next_page().await.unwrap().unwrap();
        assert_eq!(links(&second), vec!["/jobsearch/jobposting/3"]);
        assert!(crawler.next_page().await.unwrap().is_none());

        // Finished crawls do not fetch again.
        assert!(crawler.next_page().await.unwrap().is_none());
        assert_eq!(
            *requested.lock().unwrap(),
            vec![page_key(1), page_key(2), page_key(3)]
        );
        assert_eq!(crawler.seen_count(), 3);
    }

    #[tokio::test]
    async fn test_crawl_attaches_logo_and_country() {
        let (mut crawler, _) = crawler_over(&[&[1]], 0);
        let page = crawler.next_page().await.unwrap().unwrap();

        let defaults = Config::default();
        assert_eq!(page[0].get_str(fields::LOGO), Some(defaults.site.logo.as_str()));
        assert_eq!(page[0].get_str(fields::COUNTRY), Some("Canada"));
    }

    #[tokio::test]
    async fn test_crawl_skips_seen_links_and_stops_on_repeat() {
        let (mut crawler, requested) = crawler_over(&[&[1, 2], &[2, 3], &[1, 3], &[4]], 0);

        assert_eq!(crawler.next_page().await.unwrap().unwrap().len(), 2);
        let second = crawler.next_page().await.unwrap().unwrap();
        assert_eq!(links(&second), vec!["/jobsearch/jobposting/3"]);
        assert!(crawler.next_page().await.unwrap().is_none());
        assert_eq!(requested.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_crawl_respects_max_pages() {
        let (mut crawler, requested) = crawler_over(&[&[1], &[2], &[3]], 2);

        assert!(crawler.next_page().await.unwrap().is_some());
        assert!(crawler.next_page().await.unwrap().is_some());
        assert!(crawler.next_page().await.unwrap().is_none());
        assert_eq!(requested.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_crawl_fetch_failure_ends_with_error() {
        let (mut crawler, requested) = crawler_over(&[&[1]], 0);
        // Page 2 is not served.
        assert!(crawler.next_page().await.unwrap().is_some());

        let err = crawler.next_page().await.unwrap_err();
        assert!(matches!(err, AppError::Crawl { .. }));
        assert!(err.to_string().contains("results page 2"));

        assert!(crawler.next_page().await.unwrap().is_none());
        assert_eq!(requested.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_page_urls() {
        let mut config = Config::default();
        config.site.start_url = "https://example.com/jobsearch/jobsearch?sort=D".to_string();
        let crawler = JobSearchCrawler::new(&config).unwrap();

        assert_eq!(
            crawler.page_url(1).as_str(),
            "https://example.com/jobsearch/jobsearch?sort=D"
        );
        assert_eq!(
            crawler.page_url(3).as_str(),
            "https://example.com/jobsearch/jobsearch?sort=D&page=3"
        );
        assert_eq!(crawler.seen_count(), 0);
    }
}
