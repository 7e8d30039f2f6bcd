//! Storage traits for the dedup index and the record log.
//!
//! Storage is split into two focused traits:
//! - `SeenStore`: backing store of the dedup index
//! - `RecordLog`: append-only log of processed postings
//!
//! Both are synchronous. Writes are small appends and are not treated as
//! suspension points by the coordinator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::posting::Posting;

/// First-seen metadata for one fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub fingerprint: String,
    pub first_seen: DateTime<Utc>,
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl IndexEntry {
    /// Entry for a posting seen for the first time.
    pub fn for_posting(posting: &Posting) -> Self {
        Self {
            fingerprint: posting.fingerprint.clone(),
            first_seen: posting.fetched_at,
            source_id: posting.source_id.clone(),
            url: posting.url.clone(),
        }
    }
}

/// Backing store of the dedup index.
pub trait SeenStore: Send {
    /// Read every entry written so far, in write order.
    fn load(&mut self) -> Result<Vec<IndexEntry>>;

    /// Durably append one entry. Must not return before the entry would
    /// survive a crash.
    fn append(&mut self, entry: &IndexEntry) -> Result<()>;

    /// Flush anything still buffered. Called once at the end of a run.
    fn flush(&mut self) -> Result<()>;
}

/// Append-only log of processed postings.
pub trait RecordLog: Send {
    /// Append postings in the given order.
    fn append(&mut self, postings: &[Posting]) -> Result<()>;

    /// Read every posting written so far, in insertion order.
    fn load_all(&self) -> Result<Vec<Posting>>;
}
