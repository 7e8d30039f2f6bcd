//! Testing utilities including mock implementations.
//!
//! Useful for exercising the pipeline without network calls or a real
//! language model. Mocks are cheap to clone and clones share state, so a
//! test can keep a handle for assertions after passing one to the pipeline.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::error::{BackendResult, EnrichmentError, Result};
use crate::traits::backend::{Completion, CompletionRequest, ExtractionBackend};
use crate::traits::language::{LanguageModel, Prediction};
use crate::types::posting::{Posting, PostingStatus};
use crate::types::raw::RawPosting;

/// Record of a call made to the mock backend.
#[derive(Debug, Clone)]
pub struct MockBackendCall {
    pub system: String,
    pub prompt: String,
}

/// A scripted extraction backend.
///
/// Responses are chosen by the first registered marker that appears in the
/// prompt (a posting's description works well). Each marker has a queue of
/// results; the last one repeats once the others are used up. Prompts
/// matching no marker get the default response.
#[derive(Clone, Default)]
pub struct MockBackend {
    scripts: Arc<RwLock<Vec<(String, VecDeque<BackendResult<String>>)>>>,
    delays: Arc<RwLock<HashMap<String, Duration>>>,
    default_response: Option<String>,
    tokens_per_call: Option<u64>,
    calls: Arc<RwLock<Vec<MockBackendCall>>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer for prompts that match no script.
    pub fn with_default_response(mut self, response: impl Into<String>) -> Self {
        self.default_response = Some(response.into());
        self
    }

    /// Script results for prompts containing `marker`.
    pub fn with_script(self, marker: &str, results: Vec<BackendResult<String>>) -> Self {
        self.scripts
            .write()
            .unwrap()
            .push((marker.to_string(), results.into_iter().collect()));
        self
    }

    /// Sleep before answering prompts containing `marker`.
    pub fn with_delay(self, marker: &str, delay: Duration) -> Self {
        self.delays.write().unwrap().insert(marker.to_string(), delay);
        self
    }

    /// Report this many tokens for every successful call.
    pub fn with_tokens_per_call(mut self, tokens: u64) -> Self {
        self.tokens_per_call = Some(tokens);
        self
    }

    pub fn calls(&self) -> Vec<MockBackendCall> {
        self.calls.read().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.read().unwrap().len()
    }

    /// Calls whose prompt contained `marker`.
    pub fn calls_matching(&self, marker: &str) -> usize {
        self.calls
            .read()
            .unwrap()
            .iter()
            .filter(|c| c.prompt.contains(marker))
            .count()
    }

    fn next_result(&self, prompt: &str) -> BackendResult<String> {
        let mut scripts = self.scripts.write().unwrap();
        for (marker, queue) in scripts.iter_mut() {
            if !prompt.contains(marker.as_str()) {
                continue;
            }
            return if queue.len() > 1 {
                queue.pop_front().unwrap_or_else(|| Ok(valid_response()))
            } else {
                queue.front().cloned().unwrap_or_else(|| Ok(valid_response()))
            };
        }
        Ok(self.default_response.clone().unwrap_or_else(valid_response))
    }

    fn delay_for(&self, prompt: &str) -> Option<Duration> {
        self.delays
            .read()
            .unwrap()
            .iter()
            .find(|(marker, _)| prompt.contains(marker.as_str()))
            .map(|(_, delay)| *delay)
    }
}

#[async_trait]
impl ExtractionBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn submit(&self, request: &CompletionRequest) -> BackendResult<Completion> {
        self.calls.write().unwrap().push(MockBackendCall {
            system: request.system.clone(),
            prompt: request.prompt.clone(),
        });

        if let Some(delay) = self.delay_for(&request.prompt) {
            tokio::time::sleep(delay).await;
        }

        let text = self.next_result(&request.prompt)?;
        Ok(Completion {
            text,
            total_tokens: self.tokens_per_call,
        })
    }
}

#[derive(Clone)]
enum LanguageMode {
    Fixed(Prediction),
    NoOpinion,
    Unavailable,
}

/// A language model with canned predictions.
#[derive(Clone)]
pub struct MockLanguageModel {
    mode: LanguageMode,
    overrides: Arc<RwLock<Vec<(String, Prediction)>>>,
    fail_after: Option<usize>,
    calls: Arc<AtomicUsize>,
}

impl MockLanguageModel {
    /// Predict `code` with `confidence` for every text.
    pub fn fixed(code: &str, confidence: f64) -> Self {
        Self::with_mode(LanguageMode::Fixed(Prediction::new(code, confidence)))
    }

    /// Never has an opinion.
    pub fn no_opinion() -> Self {
        Self::with_mode(LanguageMode::NoOpinion)
    }

    /// Fails every call with `ClassifierUnavailable`.
    pub fn unavailable() -> Self {
        Self::with_mode(LanguageMode::Unavailable)
    }

    fn with_mode(mode: LanguageMode) -> Self {
        Self {
            mode,
            overrides: Arc::default(),
            fail_after: None,
            calls: Arc::default(),
        }
    }

    /// Predict `code` for texts containing `marker`.
    pub fn with_text(self, marker: &str, code: &str, confidence: f64) -> Self {
        self.overrides
            .write()
            .unwrap()
            .push((marker.to_string(), Prediction::new(code, confidence)));
        self
    }

    /// Answer `n` calls, then become unavailable.
    pub fn fail_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl LanguageModel for MockLanguageModel {
    fn predict(&self, text: &str) -> Result<Option<Prediction>> {
        let previous = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_after.is_some_and(|n| previous >= n) {
            return Err(EnrichmentError::ClassifierUnavailable(
                "mock model stopped answering".into(),
            ));
        }

        if let Some((_, prediction)) = self
            .overrides
            .read()
            .unwrap()
            .iter()
            .find(|(marker, _)| text.contains(marker.as_str()))
        {
            return Ok(Some(prediction.clone()));
        }

        match &self.mode {
            LanguageMode::Fixed(p) => Ok(Some(p.clone())),
            LanguageMode::NoOpinion => Ok(None),
            LanguageMode::Unavailable => Err(EnrichmentError::ClassifierUnavailable(
                "mock model not loaded".into(),
            )),
        }
    }
}

/// A schema-conformant answer.
pub fn valid_response() -> String {
    serde_json::json!({
        "seniority": "senior",
        "remote_policy": "hybrid",
        "required_skills": ["Rust", "PostgreSQL"],
        "salary_min": 60000,
        "salary_max": 75000,
        "salary_currency": "EUR",
        "experience_years": 5,
        "required_studies": "Master's degree"
    })
    .to_string()
}

/// A distinct raw record. Its description contains `posting-{n}`, which is
/// convenient as a mock marker.
pub fn sample_raw(n: usize) -> RawPosting {
    RawPosting::new(
        format!("Backend Engineer {n}"),
        format!("https://jobs.example.com/view/{n}"),
    )
    .with_source_id(format!("{}", 4_000_000 + n))
    .with_company(format!("Company {n}"))
    .with_location("Paris, France")
    .with_description(format!(
        "We are hiring for posting-{n}. You will build data pipelines in Rust."
    ))
    .with_fetched_at("2025-01-15T09:30:00Z")
}

/// Marker contained in the description of `sample_raw(n)`.
pub fn marker(n: usize) -> String {
    format!("posting-{n}.")
}

/// A normalized posting built from `sample_raw(n)`.
pub fn sample_posting(n: usize) -> Posting {
    let raw = sample_raw(n);
    Posting {
        source_id: raw.source_id,
        title: raw.title.unwrap_or_default(),
        company: raw.company.unwrap_or_default(),
        location: raw.location.unwrap_or_default(),
        description: raw.description.unwrap_or_default(),
        url: raw.url,
        fetched_at: Utc.with_ymd_and_hms(2025, 1, 15, 9, 30, 0).unwrap(),
        posted_at: None,
        position: None,
        criteria: Default::default(),
        fingerprint: format!("{:064x}", n),
        language: None,
        title_language: None,
        extracted: None,
        status: PostingStatus::Normalized,
        failure: None,
        tokens_used: 0,
    }
}
