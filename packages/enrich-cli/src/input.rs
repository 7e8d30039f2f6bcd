//! JSON-lines reader for scraper output.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use enrichment::{RawPosting, RecordError};

/// Lazily read one raw record per non-blank line.
///
/// Lines that are not JSON objects become malformed records rather than
/// errors, so the pipeline counts them like any other bad record.
pub fn read_records(
    path: &Path,
) -> Result<impl Iterator<Item = std::result::Result<RawPosting, RecordError>>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open input file {}", path.display()))?;

    Ok(BufReader::new(file)
        .lines()
        .enumerate()
        .filter_map(|(number, line)| match line {
            Ok(line) if line.trim().is_empty() => None,
            Ok(line) => Some(parse_line(number + 1, &line)),
            Err(e) => Some(Err(RecordError::malformed(format!(
                "line {}: unreadable: {}",
                number + 1,
                e
            )))),
        }))
}

fn parse_line(number: usize, line: &str) -> std::result::Result<RawPosting, RecordError> {
    RawPosting::from_json(line)
        .map_err(|e| RecordError::malformed(format!("line {}: {}", number, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_reads_records_and_flags_bad_lines() {
        let path = std::env::temp_dir().join(format!("enrich-input-{}.jsonl", std::process::id()));
        let mut file = File::create(&path).unwrap();
        writeln!(file, r#"{{"title": "Rust Dev", "link": "https://jobs.example.com/1"}}"#).unwrap();
        writeln!(file).unwrap();
        writeln!(file, "not json").unwrap();
        writeln!(file, r#"{{"title": "Go Dev", "job_id": 42}}"#).unwrap();
        drop(file);

        let records: Vec<_> = read_records(&path).unwrap().collect();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].as_ref().unwrap().title.as_deref(), Some("Rust Dev"));
        assert!(matches!(&records[1], Err(RecordError::Malformed { reason }) if reason.starts_with("line 3")));
        assert_eq!(records[2].as_ref().unwrap().source_id.as_deref(), Some("42"));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(read_records(Path::new("/nonexistent/records.jsonl")).is_err());
    }
}
