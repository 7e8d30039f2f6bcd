//! Content fingerprint used as the dedup key.

use sha2::{Digest, Sha256};

/// Characters of the normalized description that take part in the
/// fingerprint.
pub const DESCRIPTION_PREFIX_CHARS: usize = 500;

const FIELD_SEPARATOR: char = '\u{1f}';

/// Fingerprint a posting's content.
///
/// SHA-256 over title, company, location and the first 500 characters of
/// the description. Each field is lowercased, stripped of everything except
/// alphanumerics and whitespace, and whitespace-collapsed, so formatting and
/// punctuation changes do not create new listings. `source_id`, `url` and
/// `fetched_at` deliberately take no part.
pub fn fingerprint(title: &str, company: &str, location: &str, description: &str) -> String {
    let description: String = description.chars().take(DESCRIPTION_PREFIX_CHARS).collect();

    let mut hasher = Sha256::new();
    for (i, field) in [title, company, location, description.as_str()]
        .into_iter()
        .enumerate()
    {
        if i > 0 {
            let mut buf = [0u8; 4];
            hasher.update(FIELD_SEPARATOR.encode_utf8(&mut buf).as_bytes());
        }
        hasher.update(normalize_field(field).as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

fn normalize_field(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
