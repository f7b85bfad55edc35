// src/pipeline/validate.rs

//! Acceptance checks for scraped items.

use serde_json::Value;
use url::Url;

use crate::error::{ValidationError, Violation};
use crate::models::{RawItem, fields};

use super::transform::{clean_text, parse_listing_date};

/// Checks raw items before they enter transformation.
///
/// Relative job links are resolved against `base_url` before the URL check,
/// since listing pages link to postings with site-relative hrefs.
#[derive(Debug, Clone, Default)]
pub struct ItemValidator {
    base_url: Option<Url>,
}

impl ItemValidator {
    /// Validator that only accepts absolute job links.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validator that resolves relative job links against `base_url`.
    pub fn with_base_url(base_url: &str) -> Result<Self, url::ParseError> {
        Ok(Self {
            base_url: Some(Url::parse(base_url)?),
        })
    }

    /// Return the item untouched, or every violation found on it.
    pub fn validate(&self, item: RawItem) -> Result<RawItem, ValidationError> {
        let mut violations = Vec::new();

        for field in fields::REQUIRED {
            if !item.has_value(field) {
                violations.push(Violation::Missing(field));
            }
        }

        if item.has_value(fields::DATE) {
            match item.get(fields::DATE) {
                Some(Value::String(date)) => {
                    if parse_listing_date(&clean_text(date)).is_none() {
                        violations.push(Violation::DateFormat(date.clone()));
                    }
                }
                _ => violations.push(Violation::DateType),
            }
        }

        if item.has_value(fields::JOB_LINK) {
            let link = item.text(fields::JOB_LINK).unwrap_or_default();
            if !self.is_valid_link(link.trim()) {
                violations.push(Violation::InvalidLink(link));
            }
        }

        if violations.is_empty() {
            Ok(item)
        } else {
            Err(ValidationError { violations })
        }
    }

    fn is_valid_link(&self, link: &str) -> bool {
        let parsed = match (Url::parse(link), &self.base_url) {
            (Ok(url), _) => url,
            (Err(url::ParseError::RelativeUrlWithoutBase), Some(base)) => match base.join(link) {
                Ok(url) => url,
                Err(_) => return false,
            },
            _ => return false,
        };

        matches!(parsed.scheme(), "http" | "https")
            && parsed.host_str().is_some_and(|h| !h.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_item() -> RawItem {
        RawItem::new()
            .with(fields::TITLE, "Cook")
            .with(fields::DATE, "July 19, 2024")
            .with(fields::BUSINESS, "Acme")
            .with(fields::LOCATION, "Ottawa")
            .with(fields::JOB_LINK, "https://example.com/job/1")
    }

    #[test]
    fn test_valid_item_is_returned_unchanged() {
        let item = valid_item().with(fields::SALARY, "$20");
        let validated = ItemValidator::new().validate(item.clone()).unwrap();
        assert_eq!(validated, item);
    }

    #[test]
    fn test_missing_fields_are_all_reported() {
        let err = ItemValidator::new().validate(RawItem::new()).unwrap_err();
        assert_eq!(err.missing_fields(), fields::REQUIRED.to_vec());
        assert_eq!(err.violations.len(), 5);
    }

    #[test]
    fn test_each_single_missing_field_is_reported() {
        for field in fields::REQUIRED {
            let mut item = valid_item();
            item.set(field, "");
            let err = ItemValidator::new().validate(item).unwrap_err();
            assert_eq!(err.missing_fields(), vec![field]);
        }
    }

    #[test]
    fn test_whitespace_only_fields_are_missing() {
        let item = valid_item()
            .with(fields::BUSINESS, "   \n ")
            .with(fields::LOCATION, json!(["  "]));
        let err = ItemValidator::new().validate(item).unwrap_err();
        assert_eq!(err.missing_fields(), vec!["business", "location"]);
    }

    #[test]
    fn test_bad_date_format() {
        let item = valid_item().with(fields::DATE, "19/07/2024");
        let err = ItemValidator::new().validate(item).unwrap_err();
        assert_eq!(
            err.violations,
            vec![Violation::DateFormat("19/07/2024".to_string())]
        );
    }

    #[test]
    fn test_date_type_mismatch_is_distinct() {
        let item = valid_item().with(fields::DATE, json!(20240719));
        let err = ItemValidator::new().validate(item).unwrap_err();
        assert_eq!(err.violations, vec![Violation::DateType]);
    }

    #[test]
    fn test_date_with_extra_whitespace_is_accepted() {
        let item = valid_item().with(fields::DATE, "\n  July 19,   2024 ");
        assert!(ItemValidator::new().validate(item).is_ok());
    }

    #[test]
    fn test_link_checks() {
        let validator = ItemValidator::new();
        for bad in ["ftp://example.com/x", "/job/1", "mailto:hr@example.com"] {
            let err = validator
                .validate(valid_item().with(fields::JOB_LINK, bad))
                .unwrap_err();
            assert_eq!(err.violations, vec![Violation::InvalidLink(bad.to_string())]);
        }
    }

    #[test]
    fn test_relative_link_accepted_with_base() {
        let validator = ItemValidator::with_base_url("https://example.com").unwrap();
        let item = valid_item().with(fields::JOB_LINK, "/job/123");
        assert!(validator.validate(item).is_ok());
    }

    #[test]
    fn test_violations_accumulate_in_order() {
        let item = RawItem::new()
            .with(fields::DATE, "yesterday")
            .with(fields::JOB_LINK, "nowhere");
        let err = ItemValidator::new().validate(item).unwrap_err();
        assert_eq!(
            err.violations,
            vec![
                Violation::Missing("title"),
                Violation::Missing("business"),
                Violation::Missing("location"),
                Violation::DateFormat("yesterday".to_string()),
                Violation::InvalidLink("nowhere".to_string()),
            ]
        );
    }
}
