// src/pipeline/transform.rs

//! Field transformations applied to scraped items.
//!
//! Every function here is pure. Failures are returned as [`TransformError`]
//! so the worker can drop the item and log why.

use chrono::NaiveDate;
use url::Url;

use crate::error::TransformError;
use crate::models::{NormalizedItem, RawItem, SiteConfig, fields};

/// Input date format, e.g. "July 19, 2024".
pub const INPUT_DATE_FORMAT: &str = "%B %d, %Y";

/// Stored date format, e.g. "2024-07-19".
pub const OUTPUT_DATE_FORMAT: &str = "%Y-%m-%d";

const MONTHS: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

/// Per-run constants used while normalizing items.
#[derive(Debug, Clone)]
pub struct TransformSettings {
    pub base_url: String,
    pub unwanted_text: String,
    pub source: String,
    pub logo: Option<String>,
    pub country: Option<String>,
}

impl From<&SiteConfig> for TransformSettings {
    fn from(site: &SiteConfig) -> Self {
        let non_empty = |s: &str| (!s.trim().is_empty()).then(|| s.to_string());
        Self {
            base_url: site.base_url.clone(),
            unwanted_text: site.unwanted_text.clone(),
            source: site.source.clone(),
            logo: non_empty(&site.logo),
            country: non_empty(&site.country),
        }
    }
}

/// Collapse whitespace runs to single spaces and trim both ends.
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Remove every occurrence of `unwanted_text` from a title.
pub fn transform_title(title: &str, unwanted_text: &str) -> String {
    if title.is_empty() || unwanted_text.is_empty() {
        return title.trim().to_string();
    }
    title.replace(unwanted_text, "").trim().to_string()
}

/// Parse a "Month Day, Year" date without rendering it.
///
/// Only full month names are accepted.
pub fn parse_listing_date(date_str: &str) -> Option<NaiveDate> {
    let month = date_str.split_whitespace().next()?;
    if !MONTHS.iter().any(|m| m.eq_ignore_ascii_case(month)) {
        return None;
    }
    NaiveDate::parse_from_str(date_str, INPUT_DATE_FORMAT).ok()
}

/// Convert "July 19, 2024" into "2024-07-19".
pub fn transform_date(date_str: &str) -> Result<String, TransformError> {
    parse_listing_date(date_str)
        .map(|date| date.format(OUTPUT_DATE_FORMAT).to_string())
        .ok_or_else(|| TransformError::DateFormat(date_str.to_string()))
}

/// Make a job link absolute.
///
/// Links that already carry a scheme are returned unchanged, anything else is
/// joined onto `base_url`.
pub fn transform_job_link(link: &str, base_url: &str) -> Result<String, TransformError> {
    let link = link.trim();
    if link.is_empty() {
        return Err(TransformError::invalid_link(link, "link is empty"));
    }
    if Url::parse(link).is_ok() {
        return Ok(link.to_string());
    }

    let base = Url::parse(base_url)
        .map_err(|e| TransformError::invalid_link(link, format!("bad base URL {base_url}: {e}")))?;
    base.join(link)
        .map(|u| u.to_string())
        .map_err(|e| TransformError::invalid_link(link, e))
}

/// Tag an item with where it came from.
pub fn add_source(mut item: NormalizedItem, source: &str) -> NormalizedItem {
    item.source = source.to_string();
    item
}

/// Apply every field transformation to a validated raw item.
pub fn normalize(raw: &RawItem, settings: &TransformSettings) -> Result<NormalizedItem, TransformError> {
    let text = |field: &str| raw.text(field).map(|s| clean_text(&s)).unwrap_or_default();
    let optional = |field: &str| {
        raw.text(field)
            .map(|s| clean_text(&s))
            .filter(|s| !s.is_empty())
    };

    let date = match raw.get(fields::DATE) {
        Some(serde_json::Value::String(s)) => transform_date(&clean_text(s))?,
        Some(other) => return Err(TransformError::DateType(other.to_string())),
        None => return Err(TransformError::DateFormat(String::new())),
    };

    let raw_link = raw.text(fields::JOB_LINK).unwrap_or_default();
    let job_link = transform_job_link(&raw_link, &settings.base_url)?;

    let required = |field: &'static str, value: String| {
        if value.is_empty() {
            Err(TransformError::EmptyField(field))
        } else {
            Ok(value)
        }
    };

    let item = NormalizedItem {
        title: required(
            fields::TITLE,
            transform_title(&text(fields::TITLE), &settings.unwanted_text),
        )?,
        date,
        business: required(fields::BUSINESS, text(fields::BUSINESS))?,
        location: required(fields::LOCATION, text(fields::LOCATION))?,
        salary: optional(fields::SALARY),
        job_link,
        logo: optional(fields::LOGO).or_else(|| settings.logo.clone()),
        source: String::new(),
        country: optional(fields::COUNTRY).or_else(|| settings.country.clone()),
    };

    Ok(add_source(item, &settings.source))
}
