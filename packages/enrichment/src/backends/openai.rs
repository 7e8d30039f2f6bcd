//! Cloud backend for OpenAI-compatible chat completion APIs, including
//! Azure OpenAI deployments.
//!
//! # Example
//!
//! ```rust,ignore
//! use enrichment::backends::CloudBackend;
//! use enrichment::security::BackendCredentials;
//!
//! let backend = CloudBackend::new(BackendCredentials::new("sk-...").with_model("gpt-4o"))?;
//! ```

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{BackendError, BackendResult};
use crate::security::{ApiFlavor, BackendCredentials};
use crate::traits::backend::{Completion, CompletionRequest, ExtractionBackend};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Chat completions client.
///
/// Sends the schema as a strict `json_schema` response format when the
/// request carries one, `json_object` otherwise.
#[derive(Clone)]
pub struct CloudBackend {
    client: Client,
    credentials: BackendCredentials,
}

impl CloudBackend {
    pub fn new(credentials: BackendCredentials) -> BackendResult<Self> {
        Self::with_timeout(credentials, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(credentials: BackendCredentials, timeout: Duration) -> BackendResult<Self> {
        if credentials.api_key.is_empty() {
            return Err(BackendError::Config("API key is empty".into()));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Config(e.to_string()))?;
        Ok(Self {
            client,
            credentials,
        })
    }

    pub fn model(&self) -> &str {
        &self.credentials.model
    }

    fn build_request<'a>(&'a self, request: &'a CompletionRequest) -> ChatRequest<'a> {
        let response_format = match &request.schema {
            Some(schema) => ResponseFormat::JsonSchema {
                json_schema: JsonSchemaFormat {
                    name: "job_attributes",
                    strict: true,
                    schema,
                },
            },
            None => ResponseFormat::JsonObject,
        };

        ChatRequest {
            model: &self.credentials.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            temperature: 0.0,
            response_format,
        }
    }

    fn http_request(&self, body: &ChatRequest<'_>) -> reqwest::RequestBuilder {
        let key = self.credentials.api_key.expose();
        let builder = self.client.post(self.credentials.chat_completions_url());
        let builder = match self.credentials.flavor {
            ApiFlavor::OpenAi => builder.bearer_auth(key),
            ApiFlavor::Azure { .. } => builder.header("api-key", key),
        };
        builder.json(body)
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    response_format: ResponseFormat<'a>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseFormat<'a> {
    JsonObject,
    JsonSchema { json_schema: JsonSchemaFormat<'a> },
}

#[derive(Serialize)]
struct JsonSchemaFormat<'a> {
    name: &'a str,
    strict: bool,
    schema: &'a serde_json::Value,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    total_tokens: Option<u64>,
}

/// Seconds from a `Retry-After` header, when present and numeric.
pub(crate) fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Map a non-success HTTP response to a backend error.
pub(crate) async fn error_for_response(response: reqwest::Response) -> BackendError {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        return BackendError::RateLimited {
            retry_after: retry_after(response.headers()),
        };
    }
    let body = response.text().await.unwrap_or_default();
    BackendError::from_status(status.as_u16(), body)
}

#[async_trait]
impl ExtractionBackend for CloudBackend {
    fn name(&self) -> &str {
        "cloud"
    }

    async fn submit(&self, request: &CompletionRequest) -> BackendResult<Completion> {
        let body = self.build_request(request);

        let response = self
            .http_request(&body)
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(error_for_response(response).await);
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        let text = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|t| !t.trim().is_empty())
            .ok_or(BackendError::EmptyResponse)?;

        Ok(Completion {
            text,
            total_tokens: chat.usage.and_then(|u| u.total_tokens),
        })
    }
}
