//! Raw record to canonical posting.
//!
//! Validation of scraped data happens here and only here. The transform is
//! pure apart from the injected clock, and idempotent: normalizing the raw
//! form of a normalized posting gives back the same posting.

use chrono::{DateTime, SecondsFormat, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use scraper::Html;
use std::borrow::Cow;
use std::sync::Arc;
use url::Url;

use crate::error::RecordError;
use crate::pipeline::fingerprint::fingerprint;
use crate::types::posting::{JobCriteria, Posting, PostingStatus};
use crate::types::raw::RawPosting;

/// Source of "now" for records without a scrape timestamp.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock stuck at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Markup reduction is repeated until nothing changes; this bounds it.
const MAX_MARKUP_PASSES: usize = 8;

const ZERO_WIDTH: [char; 5] = ['\u{200b}', '\u{200c}', '\u{200d}', '\u{2060}', '\u{feff}'];

lazy_static! {
    static ref BLOCK_BREAK: Regex =
        Regex::new(r"(?i)<br\s*/?>|</(?:p|div|li|ul|ol|h[1-6]|tr|section|article)\s*>")
            .expect("block break pattern");
}

/// Converts raw scraped records into postings.
#[derive(Clone)]
pub struct Normalizer {
    clock: Arc<dyn Clock>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Normalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Normalizer").finish_non_exhaustive()
    }
}

impl Normalizer {
    pub fn new() -> Self {
        Self {
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Normalize one record.
    ///
    /// Fails with [`RecordError::Malformed`] when the title is blank, or when
    /// both url and source id are blank.
    pub fn normalize(&self, raw: &RawPosting) -> Result<Posting, RecordError> {
        let title = clean_line(raw.title.as_deref());
        if title.is_empty() {
            return Err(RecordError::malformed("missing title"));
        }

        let source_id = non_empty(collapse_line(raw.source_id.as_deref().unwrap_or("")));
        let url = raw.url.as_deref().and_then(normalize_url);
        if source_id.is_none() && url.is_none() {
            return Err(RecordError::malformed("missing both url and source_id"));
        }

        let company = clean_line(raw.company.as_deref());
        let location = clean_line(raw.location.as_deref());
        let description = clean_block(raw.description.as_deref());

        let fetched_at = raw
            .fetched_at
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or_else(|| self.clock.now());

        let criteria = JobCriteria {
            seniority_level: non_empty(clean_line(raw.seniority_level.as_deref())),
            employment_type: non_empty(clean_line(raw.employment_type.as_deref())),
            job_function: non_empty(clean_line(raw.job_function.as_deref())),
            industries: non_empty(clean_line(raw.industries.as_deref())),
        };

        let fingerprint = fingerprint(&title, &company, &location, &description);

        Ok(Posting {
            source_id,
            title,
            company,
            location,
            description,
            url,
            fetched_at,
            posted_at: non_empty(clean_line(raw.posted_at.as_deref())),
            position: non_empty(clean_line(raw.position.as_deref())),
            criteria,
            fingerprint,
            language: None,
            title_language: None,
            extracted: None,
            status: PostingStatus::Normalized,
            failure: None,
            tokens_used: 0,
        })
    }
}

impl From<&Posting> for RawPosting {
    fn from(posting: &Posting) -> Self {
        Self {
            source_id: posting.source_id.clone(),
            title: Some(posting.title.clone()),
            company: Some(posting.company.clone()),
            location: Some(posting.location.clone()),
            description: Some(posting.description.clone()),
            url: posting.url.clone(),
            fetched_at: Some(
                posting
                    .fetched_at
                    .to_rfc3339_opts(SecondsFormat::AutoSi, true),
            ),
            posted_at: posting.posted_at.clone(),
            position: posting.position.clone(),
            seniority_level: posting.criteria.seniority_level.clone(),
            employment_type: posting.criteria.employment_type.clone(),
            job_function: posting.criteria.job_function.clone(),
            industries: posting.criteria.industries.clone(),
        }
    }
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn normalize_url(raw: &str) -> Option<String> {
    let trimmed = collapse_line(raw);
    if trimmed.is_empty() {
        return None;
    }
    match Url::parse(&trimmed) {
        Ok(mut url) => {
            url.set_fragment(None);
            Some(url.to_string())
        }
        // Kept as text; it still works as an identity fallback.
        Err(_) => Some(trimmed),
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

fn is_blank(c: char) -> bool {
    c.is_whitespace() || ZERO_WIDTH.contains(&c)
}

/// Single-line text: markup stripped, all whitespace collapsed.
fn clean_line(value: Option<&str>) -> String {
    reduce_to_fixed_point(value.unwrap_or(""), false)
}

/// Multi-line text: markup stripped, lines kept, blank lines dropped.
fn clean_block(value: Option<&str>) -> String {
    reduce_to_fixed_point(value.unwrap_or(""), true)
}

fn reduce_to_fixed_point(text: &str, multiline: bool) -> String {
    let mut current = tidy(text, multiline);
    for _ in 0..MAX_MARKUP_PASSES {
        let next = tidy(&strip_markup(&current, multiline), multiline);
        if next == current {
            break;
        }
        current = next;
    }
    current
}

fn tidy(text: &str, multiline: bool) -> String {
    if multiline {
        collapse_lines(text)
    } else {
        collapse_line(text)
    }
}

/// Parse `text` as an HTML fragment and keep only its text. Entities are
/// decoded by the parser.
fn strip_markup(text: &str, multiline: bool) -> String {
    if !text.contains('<') && !text.contains('&') {
        return text.to_string();
    }
    let prepared = if multiline {
        BLOCK_BREAK.replace_all(text, "\n")
    } else {
        Cow::Borrowed(text)
    };
    let fragment = Html::parse_fragment(&prepared);
    fragment.root_element().text().collect()
}

fn collapse_line(input: &str) -> String {
    let mut buf = String::with_capacity(input.len());
    let mut last_space = false;
    for ch in input.chars() {
        if is_blank(ch) {
            if !last_space && !buf.is_empty() {
                buf.push(' ');
            }
            last_space = true;
        } else {
            buf.push(ch);
            last_space = false;
        }
    }
    buf.trim_end().to_string()
}

fn collapse_lines(input: &str) -> String {
    input
        .split(|c| c == '\n' || c == '\r')
        .map(collapse_line)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn normalizer() -> Normalizer {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        Normalizer::with_clock(Arc::new(FixedClock(now)))
    }

    #[test]
    fn test_strips_markup_and_entities() {
        let raw = RawPosting::new("  Senior&nbsp;Rust &amp; Go   Engineer ", "https://jobs.example.com/1#apply")
            .with_company("<b>Acme</b>\u{200b} Corp")
            .with_description("<p>Build   things.</p><p>Ship&nbsp;them.</p><br><ul><li>Rust</li></ul>");

        let posting = normalizer().normalize(&raw).unwrap();

        assert_eq!(posting.title, "Senior Rust & Go Engineer");
        assert_eq!(posting.company, "Acme Corp");
        assert_eq!(posting.description, "Build things.\nShip them.\nRust");
        assert_eq!(posting.url.as_deref(), Some("https://jobs.example.com/1"));
        assert_eq!(posting.status, PostingStatus::Normalized);
        assert_eq!(posting.fingerprint.len(), 64);
    }

    #[test]
    fn test_double_escaped_markup() {
        let raw = RawPosting::new("Dev", "https://x.test/1")
            .with_description("&lt;p&gt;Hello &amp;amp; welcome&lt;/p&gt;");

        let posting = normalizer().normalize(&raw).unwrap();
        assert_eq!(posting.description, "Hello & welcome");
    }

    #[test]
    fn test_malformed_records() {
        let n = normalizer();

        let no_title = RawPosting::new("   ", "https://x.test/1");
        assert_eq!(
            n.normalize(&no_title).unwrap_err(),
            RecordError::malformed("missing title")
        );

        let no_identity = RawPosting {
            title: Some("Dev".into()),
            url: Some(" ".into()),
            ..Default::default()
        };
        assert!(n.normalize(&no_identity).is_err());

        let id_only = RawPosting {
            title: Some("Dev".into()),
            source_id: Some("123".into()),
            ..Default::default()
        };
        assert!(n.normalize(&id_only).is_ok());
    }

    #[test]
    fn test_fetched_at_parsed_or_injected() {
        let n = normalizer();

        let stamped = RawPosting::new("Dev", "https://x.test/1")
            .with_fetched_at("2024-05-06T07:08:09+02:00");
        let posting = n.normalize(&stamped).unwrap();
        assert_eq!(
            posting.fetched_at,
            Utc.with_ymd_and_hms(2024, 5, 6, 5, 8, 9).unwrap()
        );

        let garbage = RawPosting::new("Dev", "https://x.test/1").with_fetched_at("yesterday");
        let posting = n.normalize(&garbage).unwrap();
        assert_eq!(
            posting.fetched_at,
            Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_invalid_url_kept_as_text() {
        let raw = RawPosting::new("Dev", "  not a url  ");
        let posting = normalizer().normalize(&raw).unwrap();
        assert_eq!(posting.url.as_deref(), Some("not a url"));
    }

    #[test]
    fn test_normalize_is_idempotent_for_html() {
        let n = normalizer();
        let raw = RawPosting::new("<i>Data</i> Engineer", "https://x.test/a?b=1&c=2#frag")
            .with_source_id(" 42 ")
            .with_location("Lyon,\u{a0}France")
            .with_description("<div>Line one</div>\n\n  <div>Line&nbsp;two</div>")
            .with_position("Data Engineer");

        let first = n.normalize(&raw).unwrap();
        let second = n.normalize(&RawPosting::from(&first)).unwrap();
        assert_eq!(first, second);
    }

    proptest! {
        #[test]
        fn normalize_is_idempotent(
            title in "[a-zA-Z0-9 <>/&;.\u{a0}\u{200b}]{1,60}",
            company in "[a-zA-Z0-9 &;.\u{a0}]{0,30}",
            description in "[a-zA-Z0-9 <>/&;.\n\t\u{a0}\u{200b}]{0,200}",
            source_id in "[0-9 ]{0,10}",
        ) {
            let n = normalizer();
            let raw = RawPosting::new(title, "https://jobs.example.com/view/1")
                .with_company(company)
                .with_description(description)
                .with_source_id(source_id);

            if let Ok(first) = n.normalize(&raw) {
                let second = n.normalize(&RawPosting::from(&first)).unwrap();
                prop_assert_eq!(first, second);
            }
        }
    }
}
