//! Persistent deduplication index.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::error::{EnrichmentError, Result};
use crate::traits::store::{IndexEntry, SeenStore};

/// Set of fingerprints seen by this and earlier runs.
///
/// Owns its backing store for the duration of a run: [`DedupIndex::load`]
/// acquires it, [`DedupIndex::flush`] releases it. Entries are never
/// removed. Every [`DedupIndex::record`] is durable in the store before it
/// returns, so a posting is always recorded before it is extracted.
pub struct DedupIndex {
    store: Box<dyn SeenStore>,
    entries: HashMap<String, IndexEntry>,
    recorded_this_run: HashSet<String>,
}

impl DedupIndex {
    /// Load every entry from `store`.
    pub fn load(mut store: Box<dyn SeenStore>) -> Result<Self> {
        let mut entries = HashMap::new();
        for entry in store.load()? {
            // First write wins; later duplicates can only come from a
            // second writer.
            entries.entry(entry.fingerprint.clone()).or_insert(entry);
        }
        debug!(entries = entries.len(), "Loaded dedup index");

        Ok(Self {
            store,
            entries,
            recorded_this_run: HashSet::new(),
        })
    }

    /// Whether `fingerprint` has been seen before.
    pub fn is_duplicate(&self, fingerprint: &str) -> bool {
        self.entries.contains_key(fingerprint)
    }

    /// First-seen metadata for `fingerprint`.
    pub fn get(&self, fingerprint: &str) -> Option<&IndexEntry> {
        self.entries.get(fingerprint)
    }

    /// Durably record a new fingerprint.
    ///
    /// Recording the same fingerprint twice in one run is a caller bug and
    /// returns [`EnrichmentError::AlreadyRecorded`] without touching the
    /// store.
    pub fn record(&mut self, entry: IndexEntry) -> Result<()> {
        if self.recorded_this_run.contains(&entry.fingerprint)
            || self.entries.contains_key(&entry.fingerprint)
        {
            return Err(EnrichmentError::AlreadyRecorded {
                fingerprint: entry.fingerprint,
            });
        }

        self.store.append(&entry)?;

        self.recorded_this_run.insert(entry.fingerprint.clone());
        self.entries.insert(entry.fingerprint.clone(), entry);
        Ok(())
    }

    /// Flush the backing store.
    pub fn flush(&mut self) -> Result<()> {
        self.store.flush()
    }

    /// Entries recorded during this run.
    pub fn recorded_count(&self) -> usize {
        self.recorded_this_run.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::memory::MemorySeenStore;
    use chrono::Utc;

    fn entry(fp: &str) -> IndexEntry {
        IndexEntry {
            fingerprint: fp.to_string(),
            first_seen: Utc::now(),
            source_id: None,
            url: Some(format!("https://jobs.example.com/{fp}")),
        }
    }

    #[test]
    fn test_record_then_duplicate() {
        let store = MemorySeenStore::new();
        let mut index = DedupIndex::load(Box::new(store.clone())).unwrap();

        assert!(!index.is_duplicate("a"));
        index.record(entry("a")).unwrap();
        assert!(index.is_duplicate("a"));
        assert_eq!(store.entries().len(), 1);
    }

    #[test]
    fn test_record_twice_is_refused() {
        let store = MemorySeenStore::new();
        let mut index = DedupIndex::load(Box::new(store.clone())).unwrap();

        index.record(entry("a")).unwrap();
        let err = index.record(entry("a")).unwrap_err();

        assert!(matches!(err, EnrichmentError::AlreadyRecorded { .. }));
        assert_eq!(store.entries().len(), 1);
    }

    #[test]
    fn test_reload_sees_previous_entries() {
        let store = MemorySeenStore::new();
        {
            let mut index = DedupIndex::load(Box::new(store.clone())).unwrap();
            index.record(entry("a")).unwrap();
            index.record(entry("b")).unwrap();
            index.flush().unwrap();
        }

        let index = DedupIndex::load(Box::new(store)).unwrap();
        assert_eq!(index.len(), 2);
        assert!(index.is_duplicate("b"));
        assert_eq!(index.recorded_count(), 0);
    }

    #[test]
    fn test_failed_append_is_not_recorded() {
        let store = MemorySeenStore::new();
        let mut index = DedupIndex::load(Box::new(store.clone())).unwrap();

        store.fail_appends(true);
        let err = index.record(entry("a")).unwrap_err();

        assert!(err.is_run_fatal());
        assert!(!index.is_duplicate("a"));
    }
}
