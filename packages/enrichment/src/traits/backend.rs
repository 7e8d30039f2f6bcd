//! Text-generation backend capability.
//!
//! The extraction orchestrator only knows this trait. Cloud and local
//! providers both take a prompt and return text; which one answers is a
//! configuration decision.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::BackendResult;

/// One prompt sent to a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Instructions for the model.
    pub system: String,

    /// The posting-specific prompt.
    pub prompt: String,

    /// JSON schema the answer must follow, for providers that enforce it.
    pub schema: Option<serde_json::Value>,
}

impl CompletionRequest {
    pub fn new(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            prompt: prompt.into(),
            schema: None,
        }
    }

    pub fn with_schema(mut self, schema: serde_json::Value) -> Self {
        self.schema = Some(schema);
        self
    }
}

/// A backend's answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,

    /// Total tokens billed for the call, when the provider reports it.
    pub total_tokens: Option<u64>,
}

impl Completion {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            total_tokens: None,
        }
    }

    pub fn with_tokens(mut self, tokens: u64) -> Self {
        self.total_tokens = Some(tokens);
        self
    }
}

/// Prompt in, schema-shaped text out.
#[async_trait]
pub trait ExtractionBackend: Send + Sync {
    /// Provider name for logs.
    fn name(&self) -> &str;

    /// Submit one prompt.
    async fn submit(&self, request: &CompletionRequest) -> BackendResult<Completion>;
}

#[async_trait]
impl<T: ExtractionBackend + ?Sized> ExtractionBackend for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn submit(&self, request: &CompletionRequest) -> BackendResult<Completion> {
        (**self).submit(request).await
    }
}
