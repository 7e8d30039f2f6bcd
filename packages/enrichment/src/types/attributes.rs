//! Structured attributes extracted from a posting description.
//!
//! The JSON schema sent to the model is generated from these types, so the
//! field names here are also the report column names.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Seniority of the role.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Seniority {
    Intern,
    Junior,
    Mid,
    Senior,
    Lead,
    #[default]
    Unspecified,
}

impl Seniority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Intern => "intern",
            Self::Junior => "junior",
            Self::Mid => "mid",
            Self::Senior => "senior",
            Self::Lead => "lead",
            Self::Unspecified => "unspecified",
        }
    }

    /// Map a model label onto the enum. Unknown labels are `Unspecified`.
    pub fn from_label(label: &str) -> Self {
        match normalize_label(label).as_str() {
            "intern" | "internship" | "trainee" | "apprentice" | "stagiaire" => Self::Intern,
            "junior" | "entry" | "entry level" | "entrylevel" | "graduate" | "associate" => {
                Self::Junior
            }
            "mid" | "middle" | "mid level" | "midlevel" | "intermediate" | "mid senior"
            | "midsenior" | "confirmed" => Self::Mid,
            "senior" | "sr" | "experienced" => Self::Senior,
            "lead" | "principal" | "staff" | "head" | "manager" | "director" | "executive"
            | "tech lead" => Self::Lead,
            _ => Self::Unspecified,
        }
    }
}

/// Where the work happens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum RemotePolicy {
    Onsite,
    Hybrid,
    Remote,
    #[default]
    Unspecified,
}

impl RemotePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Onsite => "onsite",
            Self::Hybrid => "hybrid",
            Self::Remote => "remote",
            Self::Unspecified => "unspecified",
        }
    }

    pub fn from_label(label: &str) -> Self {
        match normalize_label(label).as_str() {
            "onsite" | "on site" | "office" | "in office" | "in person" | "presentiel" => {
                Self::Onsite
            }
            "hybrid" | "partially remote" | "flexible" => Self::Hybrid,
            "remote" | "fully remote" | "full remote" | "work from home" | "wfh"
            | "teletravail" => Self::Remote,
            _ => Self::Unspecified,
        }
    }
}

/// Lowercase, turn separators into spaces, collapse runs.
fn normalize_label(label: &str) -> String {
    label
        .to_lowercase()
        .replace(|c: char| c == '-' || c == '_' || c == '/', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Attributes the model fills in for one posting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct StructuredAttributes {
    /// Seniority expected for the role.
    pub seniority: Seniority,

    /// Remote work policy.
    pub remote_policy: RemotePolicy,

    /// Programming languages, frameworks and tools listed as required.
    #[serde(default)]
    pub required_skills: Vec<String>,

    /// Lower bound of the yearly salary, in whole currency units.
    #[serde(default)]
    pub salary_min: Option<u64>,

    /// Upper bound of the yearly salary, in whole currency units.
    #[serde(default)]
    pub salary_max: Option<u64>,

    /// ISO 4217 currency code of the salary.
    #[serde(default)]
    pub salary_currency: Option<String>,

    /// Years of experience required.
    #[serde(default)]
    pub experience_years: Option<u32>,

    /// Degree or education level required.
    #[serde(default)]
    pub required_studies: Option<String>,
}

impl StructuredAttributes {
    /// Whether any salary information was found.
    pub fn has_salary(&self) -> bool {
        self.salary_min.is_some() || self.salary_max.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seniority_labels() {
        assert_eq!(Seniority::from_label("Mid-Senior"), Seniority::Mid);
        assert_eq!(Seniority::from_label("SENIOR"), Seniority::Senior);
        assert_eq!(Seniority::from_label("entry_level"), Seniority::Junior);
        assert_eq!(Seniority::from_label("Principal"), Seniority::Lead);
        assert_eq!(Seniority::from_label("wizard"), Seniority::Unspecified);
    }

    #[test]
    fn test_remote_policy_labels() {
        assert_eq!(RemotePolicy::from_label("On-site"), RemotePolicy::Onsite);
        assert_eq!(RemotePolicy::from_label("Fully Remote"), RemotePolicy::Remote);
        assert_eq!(RemotePolicy::from_label("hybrid"), RemotePolicy::Hybrid);
        assert_eq!(RemotePolicy::from_label(""), RemotePolicy::Unspecified);
    }

    #[test]
    fn test_serde_uses_lowercase_labels() {
        let attrs = StructuredAttributes {
            seniority: Seniority::Senior,
            remote_policy: RemotePolicy::Remote,
            ..Default::default()
        };
        let json = serde_json::to_value(&attrs).unwrap();
        assert_eq!(json["seniority"], "senior");
        assert_eq!(json["remote_policy"], "remote");
    }
}
