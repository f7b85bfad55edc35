//! Scraped item data structures.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field names used by raw and normalized items.
pub mod fields {
    pub const TITLE: &str = "title";
    pub const DATE: &str = "date";
    pub const BUSINESS: &str = "business";
    pub const LOCATION: &str = "location";
    pub const SALARY: &str = "salary";
    pub const JOB_LINK: &str = "job_link";
    pub const LOGO: &str = "logo";
    pub const SOURCE: &str = "source";
    pub const COUNTRY: &str = "country";

    /// Fields every item must carry before it may be stored.
    pub const REQUIRED: [&str; 5] = [TITLE, DATE, BUSINESS, LOCATION, JOB_LINK];
}

/// An unvalidated job posting as extracted from a listing page.
///
/// Values are kept untyped so that a date scraped as a number, or a location
/// scraped as several text nodes, survives until validation can report it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawItem {
    fields: Map<String, Value>,
}

impl RawItem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }

    pub fn set(&mut self, field: &str, value: impl Into<Value>) {
        self.fields.insert(field.to_string(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// String value of a field, `None` when absent or not a string.
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    /// Whether a field holds something other than `null`, blank text, or an
    /// empty (or all-blank) array.
    pub fn has_value(&self, field: &str) -> bool {
        self.fields.get(field).is_some_and(|v| !is_blank(v))
    }

    /// Field rendered as text: strings as-is, string arrays joined by a space,
    /// other scalars via their JSON representation.
    pub fn text(&self, field: &str) -> Option<String> {
        match self.fields.get(field)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            Value::Array(parts) => Some(
                parts
                    .iter()
                    .filter_map(|p| match p {
                        Value::String(s) => Some(s.clone()),
                        Value::Null => None,
                        other => Some(other.to_string()),
                    })
                    .collect::<Vec<_>>()
                    .join(" "),
            ),
            other => Some(other.to_string()),
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(parts) => parts.iter().all(is_blank),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

impl From<Map<String, Value>> for RawItem {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}

/// A job posting ready for storage.
///
/// The job link is the storage key; title, business and location form the
/// identity used by the JSON export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedItem {
    pub title: String,

    /// ISO `YYYY-MM-DD`
    pub date: String,

    pub business: String,

    pub location: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salary: Option<String>,

    /// Absolute URL of the posting
    pub job_link: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,

    #[serde(default)]
    pub source: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

impl NormalizedItem {
    /// Key used by the JSON export to collapse duplicates.
    pub fn export_key(&self) -> (&str, &str, &str) {
        (&self.title, &self.business, &self.location)
    }
}
