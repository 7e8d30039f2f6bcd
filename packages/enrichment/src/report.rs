//! Flat rows for the report collaborator.
//!
//! Every row has the same columns in the same order, whatever the posting's
//! status. Lists are joined with `", "` and absent values are empty strings,
//! so rows can go straight into a spreadsheet.

use indexmap::IndexMap;

use crate::types::posting::Posting;

/// Column names, in output order. The url is always last.
pub const COLUMNS: [&str; 27] = [
    "title",
    "fetched_at",
    "posted_at",
    "experience_years",
    "seniority",
    "remote_policy",
    "seniority_level",
    "employment_type",
    "job_function",
    "industries",
    "required_studies",
    "required_skills",
    "company",
    "location",
    "salary_min",
    "salary_max",
    "salary_currency",
    "source_id",
    "language",
    "language_confidence",
    "title_language",
    "position",
    "status",
    "failure",
    "tokens_used",
    "fingerprint",
    "url",
];

/// One report row keyed by column name.
pub type Row = IndexMap<String, String>;

/// Human-readable title for a column: `salary_min` becomes `Salary Min`.
pub fn column_title(column: &str) -> String {
    column
        .split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

fn text(value: Option<&str>) -> String {
    value.unwrap_or_default().to_string()
}

fn number<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

impl Posting {
    /// Flatten into a report row with the columns of [`COLUMNS`].
    pub fn to_row(&self) -> Row {
        let attrs = self.extracted.as_ref();
        let criteria = &self.criteria;

        let values: [String; 27] = [
            self.title.clone(),
            self.fetched_at.to_rfc3339(),
            text(self.posted_at.as_deref()),
            number(attrs.and_then(|a| a.experience_years)),
            text(attrs.map(|a| a.seniority.as_str())),
            text(attrs.map(|a| a.remote_policy.as_str())),
            text(criteria.seniority_level.as_deref()),
            text(criteria.employment_type.as_deref()),
            text(criteria.job_function.as_deref()),
            text(criteria.industries.as_deref()),
            text(attrs.and_then(|a| a.required_studies.as_deref())),
            attrs.map(|a| a.required_skills.join(", ")).unwrap_or_default(),
            self.company.clone(),
            self.location.clone(),
            number(attrs.and_then(|a| a.salary_min)),
            number(attrs.and_then(|a| a.salary_max)),
            text(attrs.and_then(|a| a.salary_currency.as_deref())),
            text(self.source_id.as_deref()),
            text(self.language.as_ref().map(|l| l.code.as_str())),
            number(self.language.as_ref().map(|l| format!("{:.2}", l.confidence))),
            text(self.title_language.as_ref().map(|l| l.code.as_str())),
            text(self.position.as_deref()),
            self.status.to_string(),
            text(self.failure.as_deref()),
            self.tokens_used.to_string(),
            self.fingerprint.clone(),
            text(self.url.as_deref()),
        ];

        COLUMNS
            .iter()
            .map(|c| c.to_string())
            .zip(values)
            .collect()
    }

    /// Like [`to_row`](Self::to_row) but keyed by [`column_title`].
    pub fn to_titled_row(&self) -> Row {
        self.to_row()
            .into_iter()
            .map(|(column, value)| (column_title(&column), value))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_posting;
    use crate::types::attributes::{RemotePolicy, Seniority, StructuredAttributes};
    use crate::types::posting::{LanguageTag, PostingStatus};

    #[test]
    fn test_column_title() {
        assert_eq!(column_title("salary_min"), "Salary Min");
        assert_eq!(column_title("url"), "Url");
        assert_eq!(column_title("language_confidence"), "Language Confidence");
    }

    #[test]
    fn test_unextracted_posting_has_empty_attribute_columns() {
        let row = sample_posting(1).to_row();

        assert_eq!(row.len(), COLUMNS.len());
        assert_eq!(row["title"], "Backend Engineer 1");
        assert_eq!(row["seniority"], "");
        assert_eq!(row["required_skills"], "");
        assert_eq!(row["salary_min"], "");
        assert_eq!(row["status"], "normalized");
        assert_eq!(row.keys().last().map(String::as_str), Some("url"));
    }

    #[test]
    fn test_extracted_posting_row() {
        let mut posting = sample_posting(2);
        posting.language = Some(LanguageTag::new("en", 0.876));
        posting.title_language = Some(LanguageTag::new("fr", 0.7));
        posting.status = PostingStatus::Extracted;
        posting.extracted = Some(StructuredAttributes {
            seniority: Seniority::Senior,
            remote_policy: RemotePolicy::Remote,
            required_skills: vec!["Rust".into(), "Kafka".into()],
            salary_min: Some(70_000),
            salary_currency: Some("EUR".into()),
            ..Default::default()
        });

        let row = posting.to_row();
        assert_eq!(row["required_skills"], "Rust, Kafka");
        assert_eq!(row["salary_min"], "70000");
        assert_eq!(row["salary_max"], "");
        assert_eq!(row["language"], "en");
        assert_eq!(row["language_confidence"], "0.88");
        assert_eq!(row["title_language"], "fr");
        assert_eq!(row["status"], "extracted");

        let titled = posting.to_titled_row();
        assert_eq!(titled["Required Skills"], "Rust, Kafka");
        assert_eq!(titled["Source Id"], "4000002");
    }
}
