//! Local backend for Ollama-compatible `/api/generate` servers.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::backends::openai::error_for_response;
use crate::error::{BackendError, BackendResult};
use crate::traits::backend::{Completion, CompletionRequest, ExtractionBackend};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(180);

/// Client for a locally hosted model.
#[derive(Clone)]
pub struct LocalBackend {
    client: Client,
    base_url: String,
    model: String,
}

impl LocalBackend {
    pub const DEFAULT_URL: &'static str = "http://localhost:11434";
    pub const DEFAULT_MODEL: &'static str = "deepseek-r1:1.5b";

    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> BackendResult<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        url::Url::parse(&base_url)
            .map_err(|e| BackendError::Config(format!("invalid local model url '{}': {}", base_url, e)))?;

        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| BackendError::Config(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            model: model.into(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    system: &'a str,
    prompt: &'a str,
    /// `"json"` or a JSON schema.
    format: serde_json::Value,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
    prompt_eval_count: Option<u64>,
    eval_count: Option<u64>,
}

impl GenerateResponse {
    fn total_tokens(&self) -> Option<u64> {
        match (self.prompt_eval_count, self.eval_count) {
            (None, None) => None,
            (a, b) => Some(a.unwrap_or(0) + b.unwrap_or(0)),
        }
    }
}

#[async_trait]
impl ExtractionBackend for LocalBackend {
    fn name(&self) -> &str {
        "local"
    }

    async fn submit(&self, request: &CompletionRequest) -> BackendResult<Completion> {
        let body = GenerateRequest {
            model: &self.model,
            system: &request.system,
            prompt: &request.prompt,
            format: request
                .schema
                .clone()
                .unwrap_or_else(|| serde_json::Value::String("json".into())),
            stream: false,
            options: GenerateOptions { temperature: 0.0 },
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(error_for_response(response).await);
        }

        let generated: GenerateResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        if generated.response.trim().is_empty() {
            return Err(BackendError::EmptyResponse);
        }

        let total_tokens = generated.total_tokens();
        Ok(Completion {
            text: generated.response,
            total_tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_url_rejected() {
        assert!(matches!(
            LocalBackend::new("not a url", "m"),
            Err(BackendError::Config(_))
        ));
    }

    #[test]
    fn test_token_count_sums_prompt_and_eval() {
        let parsed: GenerateResponse = serde_json::from_str(
            r#"{"response":"{}","prompt_eval_count":120,"eval_count":30,"done":true}"#,
        )
        .unwrap();
        assert_eq!(parsed.total_tokens(), Some(150));

        let bare: GenerateResponse = serde_json::from_str(r#"{"response":"{}"}"#).unwrap();
        assert_eq!(bare.total_tokens(), None);
    }
}
