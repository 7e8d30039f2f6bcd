//! Run output: enriched postings plus the run summary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::posting::{Posting, PostingStatus};

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
    /// Raw records pulled from the input stream.
    pub seen: usize,
    pub dropped_malformed: usize,
    /// Postings ignored because a run limit was reached.
    pub limit_skipped: usize,
    pub duplicates: usize,
    /// Postings recorded as new in the dedup index.
    pub unique: usize,
    /// Postings whose language confidence was below the threshold.
    pub low_confidence: usize,
    pub language_skipped: usize,
    pub extracted: usize,
    pub extraction_failed: usize,
    /// Model tokens spent across the run.
    pub tokens_used: u64,
}

/// Why a per-item failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    MalformedRecord,
    ExtractionUnparseable,
    ExtractionUnavailable,
    Cancelled,
}

/// One entry of the per-item failure log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
    /// Position of the raw record in the input stream.
    pub index: usize,

    /// Source id, url or fingerprint; whatever identified the record.
    pub identity: String,

    pub kind: FailureKind,
    pub reason: String,
}

/// Output of one pipeline run.
///
/// `postings` holds only postings that were new to the dedup index, in
/// input order, whatever their final status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentResult {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,

    /// False when the run was aborted by a run-fatal error.
    pub completed: bool,

    pub postings: Vec<Posting>,
    pub counts: RunCounts,
    pub failures: Vec<ItemFailure>,
}

impl EnrichmentResult {
    pub(crate) fn start() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            completed: false,
            postings: Vec::new(),
            counts: RunCounts::default(),
            failures: Vec::new(),
        }
    }

    pub(crate) fn finish(mut self, completed: bool) -> Self {
        self.completed = completed;
        self.finished_at = Some(Utc::now());
        self
    }

    /// Postings that ended in `status`.
    pub fn with_status(&self, status: PostingStatus) -> impl Iterator<Item = &Posting> {
        self.postings.iter().filter(move |p| p.status == status)
    }

    /// Postings with extracted attributes.
    pub fn extracted(&self) -> impl Iterator<Item = &Posting> {
        self.with_status(PostingStatus::Extracted)
    }

    /// Short machine-readable summary (no postings).
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            run_id: self.run_id,
            started_at: self.started_at,
            finished_at: self.finished_at,
            completed: self.completed,
            counts: self.counts.clone(),
            failures: self.failures.clone(),
            error: None,
        }
    }
}

/// What the CLI prints at the end of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub completed: bool,
    pub counts: RunCounts,
    pub failures: Vec<ItemFailure>,

    /// Why the run ended early, when it did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunSummary {
    /// Summary of a run that failed before reading any record.
    pub fn not_started(error: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            started_at: now,
            finished_at: Some(now),
            completed: false,
            counts: RunCounts::default(),
            failures: Vec::new(),
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_started_summary() {
        let summary = RunSummary::not_started("language model missing");
        let json = serde_json::to_value(&summary).unwrap();

        assert_eq!(json["completed"], false);
        assert_eq!(json["counts"]["seen"], 0);
        assert_eq!(json["failures"], serde_json::json!([]));
        assert_eq!(json["error"], "language model missing");
    }

    #[test]
    fn test_finished_summary_omits_error() {
        let summary = EnrichmentResult::start().finish(true).summary();
        let json = serde_json::to_value(&summary).unwrap();

        assert_eq!(json["completed"], true);
        assert!(json.get("error").is_none());
    }
}
