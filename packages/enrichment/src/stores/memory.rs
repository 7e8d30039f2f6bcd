//! In-memory storage implementations for testing and development.
//!
//! Clones share state, so a test can hand one clone to the pipeline and
//! inspect another afterwards. Not suitable for production as data is lost
//! on restart.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use crate::error::{EnrichmentError, Result};
use crate::traits::store::{IndexEntry, RecordLog, SeenStore};
use crate::types::posting::Posting;

fn injected_failure(what: &str) -> EnrichmentError {
    EnrichmentError::storage(
        format!("memory://{what}"),
        std::io::Error::new(std::io::ErrorKind::Other, "injected write failure"),
    )
}

/// Dedup index entries held in memory.
#[derive(Clone, Default)]
pub struct MemorySeenStore {
    entries: Arc<RwLock<Vec<IndexEntry>>>,
    fail_appends: Arc<AtomicBool>,
}

impl MemorySeenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with existing entries.
    pub fn with_entries(entries: Vec<IndexEntry>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(entries)),
            fail_appends: Arc::default(),
        }
    }

    /// Make every following append fail with a storage error.
    pub fn fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    /// Snapshot of everything written so far.
    pub fn entries(&self) -> Vec<IndexEntry> {
        self.entries.read().unwrap().clone()
    }
}

impl SeenStore for MemorySeenStore {
    fn load(&mut self) -> Result<Vec<IndexEntry>> {
        Ok(self.entries())
    }

    fn append(&mut self, entry: &IndexEntry) -> Result<()> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(injected_failure("seen"));
        }
        self.entries.write().unwrap().push(entry.clone());
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Record log held in memory.
#[derive(Clone, Default)]
pub struct MemoryRecordLog {
    postings: Arc<RwLock<Vec<Posting>>>,
    fail_appends: Arc<AtomicBool>,
    appends: Arc<RwLock<Vec<usize>>>,
}

impl MemoryRecordLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    /// Sizes of each append call, in order. One call per batch.
    pub fn append_sizes(&self) -> Vec<usize> {
        self.appends.read().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.postings.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RecordLog for MemoryRecordLog {
    fn append(&mut self, postings: &[Posting]) -> Result<()> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(injected_failure("records"));
        }
        self.postings.write().unwrap().extend_from_slice(postings);
        self.appends.write().unwrap().push(postings.len());
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<Posting>> {
        Ok(self.postings.read().unwrap().clone())
    }
}
