// src/error.rs

//! Unified error handling for the scraper application.
//!
//! `AppError` covers everything that can abort a command. Item-level failures
//! (`TransformError`, `ValidationError`) are separate types because workers
//! contain them within a single iteration and never propagate them further.

use std::fmt;

use thiserror::Error;

/// Result type alias for scraper operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Crawling error
    #[error("Crawl error for {context}: {message}")]
    Crawl { context: String, message: String },

    /// Document store error
    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl AppError {
    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a crawl error with context.
    pub fn crawl(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Crawl {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Create a persistence error.
    pub fn persistence(message: impl fmt::Display) -> Self {
        Self::Persistence(message.to_string())
    }
}

/// Failure to normalize a single field of a scraped item.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    /// Date string is not in "Month Day, Year" form
    #[error("Invalid date format: '{0}'. Expected format: Month Day, Year")]
    DateFormat(String),

    /// Date value is not a string at all
    #[error("Expected a string for date, got {0}")]
    DateType(String),

    /// Required field is blank once cleaned
    #[error("Field '{0}' is empty after transformation")]
    EmptyField(&'static str),

    /// Job link is empty or cannot be resolved
    #[error("Invalid job link '{link}': {reason}")]
    InvalidLink { link: String, reason: String },
}

impl TransformError {
    pub(crate) fn invalid_link(link: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::InvalidLink {
            link: link.into(),
            reason: reason.to_string(),
        }
    }
}

/// A single problem found while validating a scraped item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// Required field is absent or empty
    Missing(&'static str),
    /// Date field holds a non-string value
    DateType,
    /// Date field does not match "Month Day, Year"
    DateFormat(String),
    /// Job link is not an http(s) URL with a host
    InvalidLink(String),
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::Missing(field) => write!(f, "Missing '{field}' in item."),
            Violation::DateType => write!(f, "Invalid data type for 'date'. Should be a string."),
            Violation::DateFormat(value) => write!(
                f,
                "Invalid date format: {value}. Expected format: Month Day, Year"
            ),
            Violation::InvalidLink(value) => write!(f, "Invalid job link: {value}."),
        }
    }
}

/// Every violation found on one item, in check order.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Validation errors: [{}]", join_violations(.violations))]
pub struct ValidationError {
    pub violations: Vec<Violation>,
}

impl ValidationError {
    /// Names of the required fields reported as missing.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        self.violations
            .iter()
            .filter_map(|v| match v {
                Violation::Missing(field) => Some(*field),
                _ => None,
            })
            .collect()
    }
}

fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_lists_every_violation() {
        let err = ValidationError {
            violations: vec![Violation::Missing("title"), Violation::DateType],
        };
        let message = err.to_string();
        assert!(message.contains("Missing 'title' in item."));
        assert!(message.contains("Should be a string"));
        assert_eq!(err.missing_fields(), vec!["title"]);
    }

    #[test]
    fn test_crawl_error_context() {
        let err = AppError::crawl("page 3", "timed out");
        assert_eq!(err.to_string(), "Crawl error for page 3: timed out");
    }
}
