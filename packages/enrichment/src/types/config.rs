//! Configuration types for the pipeline and its stages.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::EnrichmentError;
use crate::pipeline::retry::RetryPolicy;

/// Configuration for one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Postings per extraction batch. Each batch is appended to the record
    /// log before the next one starts.
    pub batch_size: usize,

    /// Maximum extraction calls in flight.
    pub concurrency: usize,

    /// Stop reading input after this many normalized postings.
    pub max_postings: Option<usize>,

    /// Maximum postings accepted per search position.
    pub max_per_position: Option<usize>,

    /// Only postings in this language are sent to extraction.
    ///
    /// If None, every unique posting is eligible.
    pub desired_language: Option<String>,

    /// Run the extraction stage at all.
    ///
    /// Default: true.
    pub extract: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 25,
            concurrency: 4,
            max_postings: None,
            max_per_position: None,
            desired_language: None,
            extract: true,
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_max_postings(mut self, max: usize) -> Self {
        self.max_postings = Some(max);
        self
    }

    pub fn with_max_per_position(mut self, max: usize) -> Self {
        self.max_per_position = Some(max);
        self
    }

    /// Set the desired language. Blank values clear it.
    pub fn with_desired_language(mut self, language: impl Into<String>) -> Self {
        let language = language.into().trim().to_lowercase();
        self.desired_language = if language.is_empty() {
            None
        } else {
            Some(language)
        };
        self
    }

    /// Disable the extraction stage.
    pub fn without_extraction(mut self) -> Self {
        self.extract = false;
        self
    }
}

/// Configuration for the extraction orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Ask for salary fields.
    pub include_salary: bool,

    /// Ask for required skills.
    pub include_skills: bool,

    /// Descriptions are truncated to this many characters in the prompt.
    pub max_description_chars: usize,

    /// Backoff policy for transport failures.
    pub retry: RetryPolicy,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            include_salary: true,
            include_skills: true,
            max_description_chars: 12_000,
            retry: RetryPolicy::default(),
        }
    }
}

impl ExtractionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_salary(mut self, include: bool) -> Self {
        self.include_salary = include;
        self
    }

    pub fn with_skills(mut self, include: bool) -> Self {
        self.include_skills = include;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_max_description_chars(mut self, max: usize) -> Self {
        self.max_description_chars = max;
        self
    }
}

/// Configuration for the language classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Predictions below this confidence are reported as `unknown`.
    pub min_confidence: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
        }
    }
}

impl ClassifierConfig {
    pub fn with_min_confidence(mut self, min: f64) -> Self {
        self.min_confidence = min.clamp(0.0, 1.0);
        self
    }
}

/// Work arrangement filter used when searching the listing site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobType {
    OnSite,
    Remote,
    Hybrid,
}

impl FromStr for JobType {
    type Err = EnrichmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "on-site" | "onsite" => Ok(Self::OnSite),
            "remote" => Ok(Self::Remote),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(EnrichmentError::Config(format!(
                "invalid job type '{}', must be one of: On-site, Remote, Hybrid",
                other
            ))),
        }
    }
}

/// Experience level filter used when searching the listing site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExperienceLevel {
    Intern,
    Assistant,
    Junior,
    MidSenior,
    Director,
    Executive,
}

impl FromStr for ExperienceLevel {
    type Err = EnrichmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "intern" => Ok(Self::Intern),
            "assistant" => Ok(Self::Assistant),
            "junior" => Ok(Self::Junior),
            "mid-senior" | "midsenior" => Ok(Self::MidSenior),
            "director" => Ok(Self::Director),
            "executive" => Ok(Self::Executive),
            other => Err(EnrichmentError::Config(format!(
                "invalid experience level '{}', must be one of: Intern, Assistant, Junior, \
                 Mid-Senior, Director, Executive",
                other
            ))),
        }
    }
}

/// Search settings shared with the scraper collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSettings {
    /// Target positions (search terms).
    pub positions: Vec<String>,
    pub location: String,
    pub job_type: JobType,
    pub experience_level: ExperienceLevel,
}

impl SearchSettings {
    /// Parse a comma separated position list.
    pub fn parse_positions(positions: &str) -> Vec<String> {
        positions
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Whether a record found under `position` belongs to this search.
    ///
    /// Records without a position are always accepted.
    pub fn accepts_position(&self, position: Option<&str>) -> bool {
        match position {
            None => true,
            Some(p) => self.positions.is_empty()
                || self
                    .positions
                    .iter()
                    .any(|target| target.eq_ignore_ascii_case(p.trim())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_type_parsing() {
        assert_eq!("On-site".parse::<JobType>().unwrap(), JobType::OnSite);
        assert_eq!("REMOTE".parse::<JobType>().unwrap(), JobType::Remote);
        assert!("Anywhere".parse::<JobType>().is_err());
    }

    #[test]
    fn test_experience_level_parsing() {
        assert_eq!(
            "Mid-Senior".parse::<ExperienceLevel>().unwrap(),
            ExperienceLevel::MidSenior
        );
        assert!("Guru".parse::<ExperienceLevel>().is_err());
    }

    #[test]
    fn test_positions_filter() {
        let settings = SearchSettings {
            positions: SearchSettings::parse_positions("Software Developer, Rust Engineer,"),
            location: "France".into(),
            job_type: JobType::Remote,
            experience_level: ExperienceLevel::MidSenior,
        };

        assert_eq!(settings.positions.len(), 2);
        assert!(settings.accepts_position(Some("rust engineer")));
        assert!(!settings.accepts_position(Some("Data Analyst")));
        assert!(settings.accepts_position(None));
    }

    #[test]
    fn test_desired_language_blank_clears() {
        let config = PipelineConfig::new().with_desired_language("  ");
        assert_eq!(config.desired_language, None);

        let config = PipelineConfig::new().with_desired_language(" EN ");
        assert_eq!(config.desired_language.as_deref(), Some("en"));
    }
}
