//! Rate-limited backend wrapper.
//!
//! Wraps any backend so that calls, retries included, never exceed a
//! sustained request rate. Uses the governor crate.

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;

use crate::error::{BackendError, BackendResult};
use crate::traits::backend::{Completion, CompletionRequest, ExtractionBackend};

type DirectRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// A backend that waits for a permit before every call.
pub struct RateLimitedBackend<B: ExtractionBackend> {
    inner: B,
    limiter: Arc<DirectRateLimiter>,
}

impl<B: ExtractionBackend> RateLimitedBackend<B> {
    /// Allow `requests_per_second` calls per second, with bursts of the
    /// same size.
    pub fn new(inner: B, requests_per_second: u32) -> BackendResult<Self> {
        let rate = NonZeroU32::new(requests_per_second)
            .ok_or_else(|| BackendError::Config("requests_per_second must be > 0".into()))?;
        Ok(Self::with_quota(inner, Quota::per_second(rate)))
    }

    pub fn with_quota(inner: B, quota: Quota) -> Self {
        Self {
            inner,
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }
}

#[async_trait]
impl<B: ExtractionBackend> ExtractionBackend for RateLimitedBackend<B> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn submit(&self, request: &CompletionRequest) -> BackendResult<Completion> {
        self.limiter.until_ready().await;
        self.inner.submit(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockBackend;

    #[test]
    fn test_zero_rate_rejected() {
        assert!(matches!(
            RateLimitedBackend::new(MockBackend::new(), 0),
            Err(BackendError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_calls_pass_through() {
        let mock = MockBackend::new().with_default_response(r#"{"seniority":"junior"}"#);
        let backend = RateLimitedBackend::new(mock, 50).unwrap();

        let request = CompletionRequest::new("sys", "prompt");
        let completion = backend.submit(&request).await.unwrap();

        assert!(completion.text.contains("junior"));
        assert_eq!(backend.inner().call_count(), 1);
        assert_eq!(backend.name(), "mock");
    }
}
