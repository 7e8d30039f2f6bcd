//! Extraction orchestrator.
//!
//! Turns one posting into [`StructuredAttributes`]:
//!
//! 1. build the prompt (description plus generated schema)
//! 2. submit it, retrying transport failures with backoff
//! 3. parse leniently; on failure send one stricter repair prompt
//!
//! Failures are per posting and never affect siblings.

use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{BackendError, ExtractError};
use crate::pipeline::prompts;
use crate::pipeline::retry::RetryDecision;
use crate::traits::backend::{CompletionRequest, ExtractionBackend};
use crate::types::attributes::{RemotePolicy, Seniority, StructuredAttributes};
use crate::types::config::ExtractionConfig;
use crate::types::posting::Posting;

lazy_static! {
    static ref THINK_BLOCK: Regex = Regex::new(r"(?is)<think>.*?(?:</think>|$)").expect("think pattern");
    static ref CODE_FENCE: Regex = Regex::new(r"```(?:json|JSON)?").expect("fence pattern");
}

const KNOWN_KEYS: [&str; 8] = [
    "seniority",
    "remote_policy",
    "required_skills",
    "salary_min",
    "salary_max",
    "salary_currency",
    "experience_years",
    "required_studies",
];

/// Successful extraction for one posting.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub attributes: StructuredAttributes,

    /// Tokens reported across every call made for this posting.
    pub tokens_used: u64,

    /// Backend calls made, retries included.
    pub calls: u32,
}

/// Sends postings to a backend and validates the answers.
#[derive(Clone)]
pub struct Orchestrator {
    backend: Arc<dyn ExtractionBackend>,
    config: ExtractionConfig,
}

impl Orchestrator {
    pub fn new(backend: Arc<dyn ExtractionBackend>, config: ExtractionConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Extract attributes for `posting`.
    pub async fn extract(&self, posting: &Posting) -> Result<Extraction, ExtractError> {
        let mut usage = Usage::default();

        let request = prompts::extraction_request(posting, &self.config);
        let text = self.submit_with_retry(&request, &posting.fingerprint, &mut usage).await?;

        let reason = match parse_attributes(&text, &self.config) {
            Ok(attributes) => return Ok(usage.finish(attributes)),
            Err(reason) => reason,
        };

        warn!(
            fingerprint = %posting.fingerprint,
            backend = self.backend.name(),
            reason = %reason,
            "Unparseable extraction response, sending repair prompt"
        );

        let repair = prompts::repair_request(posting, &self.config, &reason);
        let text = self.submit_with_retry(&repair, &posting.fingerprint, &mut usage).await?;

        parse_attributes(&text, &self.config)
            .map(|attributes| usage.finish(attributes))
            .map_err(|reason| ExtractError::Unparseable { reason })
    }

    async fn submit_with_retry(
        &self,
        request: &CompletionRequest,
        key: &str,
        usage: &mut Usage,
    ) -> Result<String, ExtractError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            usage.calls += 1;

            let error = match self.backend.submit(request).await {
                Ok(completion) => {
                    usage.tokens += completion.total_tokens.unwrap_or(0);
                    debug!(
                        fingerprint = %key,
                        attempt,
                        tokens = completion.total_tokens,
                        "Backend answered"
                    );
                    return Ok(completion.text);
                }
                Err(e) => e,
            };

            if !error.is_retryable() {
                warn!(fingerprint = %key, error = %error, "Non-retryable backend error");
                return Err(ExtractError::Unavailable {
                    attempts: attempt,
                    reason: error.to_string(),
                });
            }

            match self.config.retry.decide(attempt, key) {
                RetryDecision::GiveUp => {
                    return Err(ExtractError::Unavailable {
                        attempts: attempt,
                        reason: error.to_string(),
                    })
                }
                RetryDecision::Retry(delay) => {
                    let delay = match &error {
                        BackendError::RateLimited {
                            retry_after: Some(after),
                        } => delay.max(*after),
                        _ => delay,
                    };
                    warn!(
                        fingerprint = %key,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Backend call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[derive(Default)]
struct Usage {
    tokens: u64,
    calls: u32,
}

impl Usage {
    fn finish(&self, attributes: StructuredAttributes) -> Extraction {
        Extraction {
            attributes,
            tokens_used: self.tokens,
            calls: self.calls,
        }
    }
}

/// Parse a model answer into attributes.
///
/// Tolerates reasoning blocks, code fences, doubled braces and prose around
/// the object. Labels are matched leniently and unknown ones become
/// `unspecified`. An answer without any known key is rejected.
pub fn parse_attributes(
    text: &str,
    config: &ExtractionConfig,
) -> Result<StructuredAttributes, String> {
    let object = parse_object(text)?;

    if !KNOWN_KEYS.iter().any(|k| object.contains_key(*k)) {
        return Err("answer contains none of the expected keys".to_string());
    }

    let mut attributes = StructuredAttributes {
        seniority: object
            .get("seniority")
            .and_then(|v| v.as_str())
            .map(Seniority::from_label)
            .unwrap_or_default(),
        remote_policy: object
            .get("remote_policy")
            .and_then(|v| v.as_str())
            .map(RemotePolicy::from_label)
            .unwrap_or_default(),
        required_skills: object.get("required_skills").map(skills).unwrap_or_default(),
        salary_min: object.get("salary_min").and_then(amount),
        salary_max: object.get("salary_max").and_then(amount),
        salary_currency: object.get("salary_currency").and_then(text_value).map(|c| c.to_uppercase()),
        experience_years: object
            .get("experience_years")
            .and_then(amount)
            .and_then(|years| u32::try_from(years).ok()),
        required_studies: object.get("required_studies").and_then(text_value),
    };

    repair_salary(&mut attributes);

    if !config.include_salary {
        attributes.salary_min = None;
        attributes.salary_max = None;
        attributes.salary_currency = None;
    }
    if !config.include_skills {
        attributes.required_skills.clear();
    }

    Ok(attributes)
}

fn parse_object(text: &str) -> Result<serde_json::Map<String, serde_json::Value>, String> {
    let cleaned = THINK_BLOCK.replace_all(text, "");
    let cleaned = CODE_FENCE.replace_all(&cleaned, "");

    let candidate = outermost_object(&cleaned).ok_or_else(|| "no JSON object in answer".to_string())?;

    let value: serde_json::Value = match serde_json::from_str(candidate) {
        Ok(v) => v,
        Err(first) => {
            let undoubled = candidate.replace("{{", "{").replace("}}", "}");
            serde_json::from_str(&undoubled).map_err(|_| first.to_string())?
        }
    };

    match value {
        serde_json::Value::Object(map) => Ok(map),
        _ => Err("answer is not a JSON object".to_string()),
    }
}

/// From the first `{` to the last `}`.
fn outermost_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

fn text_value(value: &serde_json::Value) -> Option<String> {
    let text = match value {
        serde_json::Value::String(s) => s.trim().to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let lowered = text.to_lowercase();
    if text.is_empty() || matches!(lowered.as_str(), "null" | "none" | "n/a" | "unspecified") {
        None
    } else {
        Some(text)
    }
}

fn skills(value: &serde_json::Value) -> Vec<String> {
    let raw: Vec<String> = match value {
        serde_json::Value::Array(items) => items.iter().filter_map(text_value).collect(),
        serde_json::Value::String(s) => s.split(',').map(|p| p.trim().to_string()).collect(),
        _ => Vec::new(),
    };

    let mut seen = std::collections::HashSet::new();
    raw.into_iter()
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(s.to_lowercase()))
        .collect()
}

/// Non-negative whole amount from a number or a loosely formatted string
/// (`"45 000"`, `"€50,000"`, `"55k"`).
fn amount(value: &serde_json::Value) -> Option<u64> {
    let number = match value {
        serde_json::Value::Number(n) => n.as_f64()?,
        serde_json::Value::String(s) => {
            let lowered = s.trim().to_lowercase();
            let multiplier = if lowered.ends_with('k') { 1_000.0 } else { 1.0 };
            if lowered.starts_with('-') {
                return None;
            }
            let digits: String = lowered
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.')
                .collect();
            digits.parse::<f64>().ok()? * multiplier
        }
        _ => return None,
    };

    if number.is_finite() && number >= 0.0 {
        Some(number.round() as u64)
    } else {
        None
    }
}

/// Swap inverted ranges; drop a currency that has no amount.
fn repair_salary(attributes: &mut StructuredAttributes) {
    if let (Some(min), Some(max)) = (attributes.salary_min, attributes.salary_max) {
        if min > max {
            attributes.salary_min = Some(max);
            attributes.salary_max = Some(min);
        }
    }
    if !attributes.has_salary() {
        attributes.salary_currency = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendError;
    use crate::pipeline::retry::RetryPolicy;
    use crate::testing::{sample_posting, valid_response, MockBackend};

    fn config() -> ExtractionConfig {
        ExtractionConfig::default().with_retry(RetryPolicy::immediate(4))
    }

    #[test]
    fn test_parse_local_model_answer() {
        let answer = "<think>The posting says senior...</think>\n```json\n\
                      {\"seniority\": \"Mid-Senior\", \"remote_policy\": \"On-site\", \
                      \"required_skills\": [\"Rust\", \"rust\", \" Tokio \"], \
                      \"salary_min\": \"55k\", \"salary_max\": 45000, \"salary_currency\": \"eur\"}\n```";

        let attrs = parse_attributes(answer, &config()).unwrap();
        assert_eq!(attrs.seniority, Seniority::Mid);
        assert_eq!(attrs.remote_policy, RemotePolicy::Onsite);
        assert_eq!(attrs.required_skills, vec!["Rust", "Tokio"]);
        assert_eq!(attrs.salary_min, Some(45_000));
        assert_eq!(attrs.salary_max, Some(55_000));
        assert_eq!(attrs.salary_currency.as_deref(), Some("EUR"));
    }

    #[test]
    fn test_parse_doubled_braces() {
        let attrs = parse_attributes(r#"{{"seniority": "lead", "remote_policy": "remote"}}"#, &config()).unwrap();
        assert_eq!(attrs.seniority, Seniority::Lead);
        assert_eq!(attrs.remote_policy, RemotePolicy::Remote);
    }

    #[test]
    fn test_parse_rejects_prose_and_foreign_objects() {
        assert!(parse_attributes("I cannot help with that.", &config()).is_err());
        assert!(parse_attributes(r#"{"answer": "none"}"#, &config()).is_err());
        assert!(parse_attributes(r#"{"seniority": "#, &config()).is_err());
    }

    #[test]
    fn test_negative_salary_dropped_and_switches_applied() {
        let answer = r#"{"seniority":"junior","remote_policy":"hybrid","salary_min":-5,
                         "salary_currency":"USD","required_skills":"Go, SQL"}"#;

        let attrs = parse_attributes(answer, &config()).unwrap();
        assert_eq!(attrs.salary_min, None);
        assert_eq!(attrs.salary_currency, None);
        assert_eq!(attrs.required_skills, vec!["Go", "SQL"]);

        let no_skills = config().with_skills(false);
        assert!(parse_attributes(answer, &no_skills).unwrap().required_skills.is_empty());
    }

    #[tokio::test]
    async fn test_unparseable_once_then_repaired() {
        let posting = sample_posting(1);
        let backend = MockBackend::new().with_script(
            &posting.description,
            vec![
                Ok("Sure! Here are the attributes you asked for.".into()),
                Ok(valid_response()),
            ],
        );
        let orchestrator = Orchestrator::new(Arc::new(backend.clone()), config());

        let extraction = orchestrator.extract(&posting).await.unwrap();

        assert_eq!(extraction.attributes.seniority, Seniority::Senior);
        assert_eq!(extraction.calls, 2);
        let calls = backend.calls();
        assert!(calls[1].prompt.contains("could not be used"));
    }

    #[tokio::test]
    async fn test_unparseable_twice_fails() {
        let posting = sample_posting(1);
        let backend = MockBackend::new().with_script(&posting.description, vec![Ok("nope".into())]);
        let orchestrator = Orchestrator::new(Arc::new(backend.clone()), config());

        let err = orchestrator.extract(&posting).await.unwrap_err();

        assert!(matches!(err, ExtractError::Unparseable { .. }));
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn test_transport_failures_retried() {
        let posting = sample_posting(1);
        let backend = MockBackend::new().with_script(
            &posting.description,
            vec![
                Err(BackendError::Transport("connection reset".into())),
                Err(BackendError::RateLimited { retry_after: None }),
                Ok(valid_response()),
            ],
        );
        let orchestrator = Orchestrator::new(Arc::new(backend.clone()), config());

        let extraction = orchestrator.extract(&posting).await.unwrap();

        assert_eq!(backend.call_count(), 3);
        assert_eq!(extraction.calls, 3);
    }

    #[tokio::test]
    async fn test_permanent_transport_failure_exhausts_budget() {
        let posting = sample_posting(1);
        let backend = MockBackend::new().with_script(
            &posting.description,
            vec![Err(BackendError::Transport("timeout".into()))],
        );
        let orchestrator = Orchestrator::new(Arc::new(backend.clone()), config());

        let err = orchestrator.extract(&posting).await.unwrap_err();

        assert_eq!(
            err,
            ExtractError::Unavailable {
                attempts: 4,
                reason: "transport error: timeout".into()
            }
        );
        assert_eq!(backend.call_count(), 4);
    }

    #[tokio::test]
    async fn test_auth_error_not_retried() {
        let posting = sample_posting(1);
        let backend = MockBackend::new().with_script(
            &posting.description,
            vec![Err(BackendError::from_status(401, "invalid api key"))],
        );
        let orchestrator = Orchestrator::new(Arc::new(backend.clone()), config());

        let err = orchestrator.extract(&posting).await.unwrap_err();

        assert!(matches!(err, ExtractError::Unavailable { attempts: 1, .. }));
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_tokens_summed_across_calls() {
        let posting = sample_posting(1);
        let backend = MockBackend::new()
            .with_script(&posting.description, vec![Ok("garbage".into()), Ok(valid_response())])
            .with_tokens_per_call(100);
        let orchestrator = Orchestrator::new(Arc::new(backend), config());

        let extraction = orchestrator.extract(&posting).await.unwrap();
        assert_eq!(extraction.tokens_used, 200);
    }

    #[test]
    fn test_extract_outside_async_context() {
        let orchestrator = Orchestrator::new(Arc::new(MockBackend::new()), config());

        let extraction = tokio_test::block_on(orchestrator.extract(&sample_posting(2))).unwrap();
        assert_eq!(extraction.calls, 1);
        assert_eq!(extraction.attributes.salary_currency.as_deref(), Some("EUR"));
    }
}
