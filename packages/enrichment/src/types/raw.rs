//! Raw scraped records, as handed over by the scraper collaborator.
//!
//! Scraper dumps are loosely typed: identifiers arrive as strings or numbers,
//! criteria sometimes as arrays, and field names drift between scrapers. This
//! is the only place that tolerance lives; everything downstream works on
//! [`Posting`](crate::types::posting::Posting).

use serde::{Deserialize, Deserializer, Serialize};

/// One scraped record with every field optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPosting {
    #[serde(
        default,
        alias = "job_id",
        alias = "id",
        deserialize_with = "loose_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub source_id: Option<String>,

    #[serde(
        default,
        deserialize_with = "loose_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub title: Option<String>,

    #[serde(
        default,
        deserialize_with = "loose_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub company: Option<String>,

    #[serde(
        default,
        deserialize_with = "loose_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub location: Option<String>,

    /// Description text or HTML fragment.
    #[serde(
        default,
        deserialize_with = "loose_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<String>,

    #[serde(
        default,
        alias = "link",
        deserialize_with = "loose_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub url: Option<String>,

    /// RFC 3339 scrape timestamp.
    #[serde(
        default,
        deserialize_with = "loose_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub fetched_at: Option<String>,

    /// Posting time as reported by the listing site.
    #[serde(
        default,
        alias = "posted_time",
        deserialize_with = "loose_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub posted_at: Option<String>,

    /// Search term the scraper used to find this record.
    #[serde(
        default,
        alias = "search_position",
        deserialize_with = "loose_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub position: Option<String>,

    #[serde(
        default,
        deserialize_with = "loose_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub seniority_level: Option<String>,

    #[serde(
        default,
        deserialize_with = "loose_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub employment_type: Option<String>,

    #[serde(
        default,
        deserialize_with = "loose_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub job_function: Option<String>,

    #[serde(
        default,
        deserialize_with = "loose_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub industries: Option<String>,
}

impl RawPosting {
    /// Create a record with the two fields every scraper provides.
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            url: Some(url.into()),
            ..Default::default()
        }
    }

    pub fn with_source_id(mut self, id: impl Into<String>) -> Self {
        self.source_id = Some(id.into());
        self
    }

    pub fn with_company(mut self, company: impl Into<String>) -> Self {
        self.company = Some(company.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_fetched_at(mut self, fetched_at: impl Into<String>) -> Self {
        self.fetched_at = Some(fetched_at.into());
        self
    }

    pub fn with_position(mut self, position: impl Into<String>) -> Self {
        self.position = Some(position.into());
        self
    }

    /// Parse one JSON object.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// Accept strings, numbers, booleans and arrays of those; null and objects
/// become `None`.
fn loose_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| value_to_string(&v)))
}

fn value_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        serde_json::Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(value_to_string).collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(", "))
            }
        }
        serde_json::Value::Null | serde_json::Value::Object(_) => None,
    }
}
