//! The canonical posting and its lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::attributes::StructuredAttributes;

/// Where a posting is in the pipeline.
///
/// Statuses only move forward. `DroppedMalformed` never appears on a stored
/// posting; it is reported through the run's failure log instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PostingStatus {
    Raw,
    Normalized,
    Classified,
    DedupedUnique,
    DedupedDuplicate,
    Extracted,
    ExtractionFailed,
    LanguageSkipped,
    DroppedMalformed,
}

impl PostingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Normalized => "normalized",
            Self::Classified => "classified",
            Self::DedupedUnique => "deduped-unique",
            Self::DedupedDuplicate => "deduped-duplicate",
            Self::Extracted => "extracted",
            Self::ExtractionFailed => "extraction-failed",
            Self::LanguageSkipped => "language-skipped",
            Self::DroppedMalformed => "dropped-malformed",
        }
    }

    /// Whether the state machine allows `self -> next`.
    pub fn can_advance_to(&self, next: PostingStatus) -> bool {
        use PostingStatus::*;
        matches!(
            (self, next),
            (Raw, Normalized)
                | (Raw, DroppedMalformed)
                | (Normalized, Classified)
                | (Classified, DedupedUnique)
                | (Classified, DedupedDuplicate)
                | (DedupedUnique, Extracted)
                | (DedupedUnique, ExtractionFailed)
                | (DedupedUnique, LanguageSkipped)
        )
    }

    /// Terminal states. `DedupedUnique` is terminal only when extraction is
    /// disabled for the run, so it is not listed here.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::DedupedDuplicate
                | Self::Extracted
                | Self::ExtractionFailed
                | Self::LanguageSkipped
                | Self::DroppedMalformed
        )
    }
}

impl std::fmt::Display for PostingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Language code and confidence assigned by the classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageTag {
    /// ISO 639-1 code where one exists, ISO 639-3 otherwise, or `unknown`.
    pub code: String,

    /// Model confidence in `[0, 1]`.
    pub confidence: f64,
}

impl LanguageTag {
    pub const UNKNOWN: &'static str = "unknown";

    pub fn new(code: impl Into<String>, confidence: f64) -> Self {
        Self {
            code: code.into(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    pub fn unknown(confidence: f64) -> Self {
        Self::new(Self::UNKNOWN, confidence)
    }

    pub fn is_known(&self) -> bool {
        self.code != Self::UNKNOWN
    }

    /// Case-insensitive comparison against a configured language code.
    pub fn matches(&self, code: &str) -> bool {
        self.is_known() && self.code.eq_ignore_ascii_case(code.trim())
    }
}

/// Job criteria published by the listing site itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCriteria {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seniority_level: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employment_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_function: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industries: Option<String>,
}

impl JobCriteria {
    pub fn is_empty(&self) -> bool {
        self.seniority_level.is_none()
            && self.employment_type.is_none()
            && self.job_function.is_none()
            && self.industries.is_none()
    }
}

/// One normalized job listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    /// Identifier assigned by the listing site. Metadata only.
    pub source_id: Option<String>,

    pub title: String,
    pub company: String,
    pub location: String,
    pub description: String,

    /// Canonical link; identity fallback when `source_id` is absent.
    pub url: Option<String>,

    /// When the record was scraped.
    pub fetched_at: DateTime<Utc>,

    /// Posting time as reported by the listing site.
    #[serde(default)]
    pub posted_at: Option<String>,

    /// Search term that surfaced this posting.
    #[serde(default)]
    pub position: Option<String>,

    #[serde(default, skip_serializing_if = "JobCriteria::is_empty")]
    pub criteria: JobCriteria,

    /// Content fingerprint (dedup key).
    pub fingerprint: String,

    #[serde(default)]
    pub language: Option<LanguageTag>,

    /// Language of the title alone. Informational; the language gate reads
    /// `language`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_language: Option<LanguageTag>,

    #[serde(default)]
    pub extracted: Option<StructuredAttributes>,

    pub status: PostingStatus,

    /// Why extraction failed, when it did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,

    /// Model tokens spent on this posting.
    #[serde(default)]
    pub tokens_used: u64,
}

impl Posting {
    /// Human-facing identity for logs: source id, else url, else fingerprint.
    pub fn identity(&self) -> &str {
        self.source_id
            .as_deref()
            .or(self.url.as_deref())
            .unwrap_or(&self.fingerprint)
    }

    /// Text handed to the language classifier.
    pub fn classification_text(&self) -> &str {
        if self.description.trim().is_empty() {
            &self.title
        } else {
            &self.description
        }
    }

    /// Move to `next`. Backward or skipping transitions are a bug in the
    /// caller and are refused.
    pub(crate) fn advance(&mut self, next: PostingStatus) -> bool {
        let allowed = self.status.can_advance_to(next);
        debug_assert!(allowed, "invalid transition {} -> {}", self.status, next);
        if !allowed {
            tracing::error!(
                identity = %self.identity(),
                from = %self.status,
                to = %next,
                "Refusing invalid posting transition"
            );
            return false;
        }
        self.status = next;
        true
    }

    pub(crate) fn set_language(&mut self, tag: LanguageTag) {
        self.language = Some(tag);
        self.advance(PostingStatus::Classified);
    }

    pub(crate) fn mark_extracted(&mut self, attributes: StructuredAttributes, tokens: u64) {
        self.extracted = Some(attributes);
        self.tokens_used += tokens;
        self.advance(PostingStatus::Extracted);
    }

    pub(crate) fn mark_failed(&mut self, reason: impl Into<String>) {
        self.failure = Some(reason.into());
        self.advance(PostingStatus::ExtractionFailed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_moves_forward_only() {
        use PostingStatus::*;

        assert!(Raw.can_advance_to(Normalized));
        assert!(Classified.can_advance_to(DedupedDuplicate));
        assert!(DedupedUnique.can_advance_to(LanguageSkipped));
        assert!(!Extracted.can_advance_to(Classified));
        assert!(!Normalized.can_advance_to(Extracted));
        assert!(!DedupedDuplicate.can_advance_to(Extracted));
    }

    #[test]
    fn test_status_serializes_kebab_case() {
        let json = serde_json::to_string(&PostingStatus::ExtractionFailed).unwrap();
        assert_eq!(json, "\"extraction-failed\"");
        assert_eq!(PostingStatus::DedupedUnique.to_string(), "deduped-unique");
    }

    #[test]
    fn test_language_tag_matching() {
        let tag = LanguageTag::new("en", 0.97);
        assert!(tag.matches("EN"));
        assert!(!tag.matches("fr"));
        assert!(!LanguageTag::unknown(0.2).matches("unknown"));
        assert_eq!(LanguageTag::new("fr", 1.7).confidence, 1.0);
    }
}
