//! Typed errors for the enrichment library.
//!
//! Uses `thiserror` for library errors (not `anyhow`). Errors are split by
//! blast radius: [`RecordError`] and [`ExtractError`] are per-posting and are
//! absorbed by the coordinator, while [`EnrichmentError`] covers conditions
//! that end a run.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::types::result::EnrichmentResult;

/// Run-level errors.
#[derive(Debug, Error)]
pub enum EnrichmentError {
    /// The language model could not be loaded or stopped answering.
    #[error("language classifier unavailable: {0}")]
    ClassifierUnavailable(String),

    /// A fingerprint was recorded twice within one run.
    #[error("fingerprint already recorded in this run: {fingerprint}")]
    AlreadyRecorded { fingerprint: String },

    /// The dedup index or record log could not be written, read or decoded.
    #[error("storage unwritable at {}: {source}", path.display())]
    StorageUnwritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration error
    #[error("config error: {0}")]
    Config(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EnrichmentError {
    /// Build a storage error for `path`.
    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::StorageUnwritable {
            path: path.into(),
            source,
        }
    }

    /// Whether this error aborts a run.
    pub fn is_run_fatal(&self) -> bool {
        matches!(
            self,
            Self::ClassifierUnavailable(_) | Self::StorageUnwritable { .. }
        )
    }
}

/// A raw record that cannot become a posting.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("malformed record: {reason}")]
    Malformed { reason: String },
}

impl RecordError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }
}

/// Per-posting extraction failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    /// The model answered twice with text that does not fit the schema.
    #[error("extraction response unparseable: {reason}")]
    Unparseable { reason: String },

    /// The backend could not be reached within the retry budget.
    #[error("extraction backend unavailable after {attempts} attempt(s): {reason}")]
    Unavailable { attempts: u32, reason: String },

    /// The run was aborted while this extraction was in flight.
    #[error("extraction cancelled")]
    Cancelled,
}

/// Errors raised by an extraction backend for a single call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// Connection failed, timed out, or the response body was unreadable.
    #[error("transport error: {0}")]
    Transport(String),

    /// HTTP 429 or an equivalent provider signal.
    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },

    /// Non-success HTTP status.
    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// The provider answered without any completion text.
    #[error("empty response")]
    EmptyResponse,

    /// Misconfigured backend (missing key, bad URL).
    #[error("backend config error: {0}")]
    Config(String),
}

impl BackendError {
    /// Whether retrying the same request can succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::RateLimited { .. } | Self::EmptyResponse => true,
            Self::Api { status, .. } => *status >= 500 || *status == 408,
            Self::Config(_) => false,
        }
    }

    /// Classify an HTTP error status.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        if status == 429 {
            Self::RateLimited { retry_after: None }
        } else {
            Self::Api {
                status,
                body: body.into(),
            }
        }
    }
}

/// A run-fatal error with the work completed before it.
#[derive(Debug, Error)]
#[error("run aborted: {cause}")]
pub struct RunAborted {
    #[source]
    pub cause: EnrichmentError,
    pub partial: Box<EnrichmentResult>,
}

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, EnrichmentError>;

/// Result type alias for backend calls.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(BackendError::Transport("reset".into()).is_retryable());
        assert!(BackendError::RateLimited { retry_after: None }.is_retryable());
        assert!(BackendError::from_status(503, "busy").is_retryable());
        assert!(!BackendError::from_status(401, "bad key").is_retryable());
        assert!(!BackendError::Config("no key".into()).is_retryable());
        assert_eq!(
            BackendError::from_status(429, ""),
            BackendError::RateLimited { retry_after: None }
        );
    }

    #[test]
    fn test_run_fatal_classification() {
        assert!(EnrichmentError::ClassifierUnavailable("gone".into()).is_run_fatal());
        assert!(EnrichmentError::storage(
            "/tmp/x",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "ro")
        )
        .is_run_fatal());
        assert!(!EnrichmentError::AlreadyRecorded {
            fingerprint: "abc".into()
        }
        .is_run_fatal());
    }
}
