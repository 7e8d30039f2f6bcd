//! JSON-lines file stores.
//!
//! One JSON document per line, appended and fsynced. A crash mid-write can
//! leave a partial last line; loading ignores it with a warning and the
//! next append cuts it off before writing. A bad line anywhere else is a
//! corrupt store.
//!
//! Single writer per file is assumed and not enforced.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::error::{EnrichmentError, Result};
use crate::traits::store::{IndexEntry, RecordLog, SeenStore};
use crate::types::posting::Posting;

/// File name of the dedup index inside an output directory.
pub const SEEN_FILE: &str = "seen.jsonl";

/// File name of the record log inside an output directory.
pub const RECORDS_FILE: &str = "postings.jsonl";

/// Dedup index backed by a JSON-lines file.
pub struct JsonlSeenStore {
    path: PathBuf,
    file: Option<File>,
}

impl JsonlSeenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
        }
    }

    /// Store at `dir/seen.jsonl`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(SEEN_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SeenStore for JsonlSeenStore {
    fn load(&mut self) -> Result<Vec<IndexEntry>> {
        read_lines(&self.path)
    }

    fn append(&mut self, entry: &IndexEntry) -> Result<()> {
        if self.file.is_none() {
            self.file = Some(open_for_append(&self.path)?);
        }
        if let Some(file) = self.file.as_mut() {
            write_lines(file, &self.path, std::slice::from_ref(entry))?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if let Some(file) = self.file.as_mut() {
            file.sync_all()
                .map_err(|e| EnrichmentError::storage(&self.path, e))?;
        }
        Ok(())
    }
}

/// Append-only record log backed by a JSON-lines file.
pub struct JsonlRecordLog {
    path: PathBuf,
    file: Option<File>,
}

impl JsonlRecordLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
        }
    }

    /// Log at `dir/postings.jsonl`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(RECORDS_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordLog for JsonlRecordLog {
    fn append(&mut self, postings: &[Posting]) -> Result<()> {
        if postings.is_empty() {
            return Ok(());
        }
        if self.file.is_none() {
            self.file = Some(open_for_append(&self.path)?);
        }
        if let Some(file) = self.file.as_mut() {
            write_lines(file, &self.path, postings)?;
        }
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<Posting>> {
        read_lines(&self.path)
    }
}

/// Read every complete line of `path`. A missing file is empty.
fn read_lines<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(EnrichmentError::storage(path, e)),
    };

    let ends_cleanly = contents.ends_with('\n');
    let lines: Vec<&str> = contents.lines().collect();
    let last = lines.len().saturating_sub(1);

    let mut items = Vec::with_capacity(lines.len());
    for (i, line) in lines.iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(item) => items.push(item),
            Err(e) if i == last && !ends_cleanly => {
                warn!(
                    path = %path.display(),
                    line = i + 1,
                    error = %e,
                    "Ignoring truncated final line"
                );
            }
            Err(e) => {
                return Err(EnrichmentError::storage(
                    path,
                    io::Error::new(io::ErrorKind::InvalidData, format!("line {}: {}", i + 1, e)),
                ))
            }
        }
    }
    Ok(items)
}

/// Open `path` for appending, creating parent directories. A partial last
/// line left by a crash is cut off first.
fn open_for_append(path: &Path) -> Result<File> {
    let storage = |e: std::io::Error| EnrichmentError::storage(path, e);

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(storage)?;
    }

    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(storage)?;

    let len = file.metadata().map_err(storage)?.len();
    if len > 0 {
        let mut last = [0u8; 1];
        file.seek(SeekFrom::Start(len - 1)).map_err(storage)?;
        file.read_exact(&mut last).map_err(storage)?;

        if last[0] != b'\n' {
            let mut bytes = Vec::with_capacity(len as usize);
            file.seek(SeekFrom::Start(0)).map_err(storage)?;
            file.read_to_end(&mut bytes).map_err(storage)?;
            let keep = bytes
                .iter()
                .rposition(|b| *b == b'\n')
                .map(|pos| pos as u64 + 1)
                .unwrap_or(0);

            warn!(
                path = %path.display(),
                dropped_bytes = len - keep,
                "Truncating partial final line before append"
            );
            file.set_len(keep).map_err(storage)?;
        }
    }

    file.seek(SeekFrom::End(0)).map_err(storage)?;
    Ok(file)
}

/// Write one line per item and fsync before returning.
fn write_lines<T: Serialize>(file: &mut File, path: &Path, items: &[T]) -> Result<()> {
    let mut buf = String::new();
    for item in items {
        buf.push_str(&serde_json::to_string(item)?);
        buf.push('\n');
    }

    file.write_all(buf.as_bytes())
        .map_err(|e| EnrichmentError::storage(path, e))?;
    file.sync_data()
        .map_err(|e| EnrichmentError::storage(path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("enrichment-jsonl-{}", Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn entry(fp: &str) -> IndexEntry {
        IndexEntry {
            fingerprint: fp.to_string(),
            first_seen: Utc::now(),
            source_id: Some(format!("id-{fp}")),
            url: None,
        }
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = scratch_dir();
        let mut store = JsonlSeenStore::in_dir(&dir);
        assert!(store.load().unwrap().is_empty());
        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_append_then_reload() {
        let dir = scratch_dir();
        {
            let mut store = JsonlSeenStore::in_dir(&dir);
            store.append(&entry("a")).unwrap();
            store.append(&entry("b")).unwrap();
            store.flush().unwrap();
        }

        let mut store = JsonlSeenStore::in_dir(&dir);
        let entries = store.load().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].fingerprint, "b");
        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_truncated_last_line_is_ignored_then_cut() {
        let dir = scratch_dir();
        let path = dir.join(SEEN_FILE);
        let good = serde_json::to_string(&entry("a")).unwrap();
        fs::write(&path, format!("{good}\n{{\"fingerprint\":\"b\",\"fir")).unwrap();

        let mut store = JsonlSeenStore::new(&path);
        assert_eq!(store.load().unwrap().len(), 1);

        store.append(&entry("c")).unwrap();
        let entries = store.load().unwrap();
        let fps: Vec<_> = entries.iter().map(|e| e.fingerprint.as_str()).collect();
        assert_eq!(fps, vec!["a", "c"]);
        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_corrupt_middle_line_is_an_error() {
        let dir = scratch_dir();
        let path = dir.join(SEEN_FILE);
        let good = serde_json::to_string(&entry("a")).unwrap();
        fs::write(&path, format!("not json\n{good}\n")).unwrap();

        let err = JsonlSeenStore::new(&path).load().unwrap_err();
        assert!(err.is_run_fatal());
        match err {
            EnrichmentError::StorageUnwritable { source, .. } => {
                assert_eq!(source.kind(), io::ErrorKind::InvalidData);
                assert!(source.to_string().starts_with("line 1:"));
            }
            other => panic!("expected storage error, got {other:?}"),
        }
        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_unwritable_location() {
        let dir = scratch_dir();
        let blocker = dir.join("not-a-dir");
        fs::write(&blocker, "file").unwrap();

        let mut store = JsonlSeenStore::new(blocker.join(SEEN_FILE));
        let err = store.append(&entry("a")).unwrap_err();
        assert!(matches!(err, EnrichmentError::StorageUnwritable { .. }));
        fs::remove_dir_all(dir).ok();
    }
}
