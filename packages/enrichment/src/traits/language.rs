//! Local statistical language model.

use crate::error::Result;

/// A model's best guess for a text.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// Language code as reported by the model.
    pub code: String,

    /// Confidence in `[0, 1]`.
    pub confidence: f64,
}

impl Prediction {
    pub fn new(code: impl Into<String>, confidence: f64) -> Self {
        Self {
            code: code.into(),
            confidence,
        }
    }
}

/// A loaded language identification model.
///
/// Implementations are loaded before a run starts and shared by handle.
/// `predict` returns `Ok(None)` when the model has no opinion and
/// `Err(ClassifierUnavailable)` when it cannot answer at all.
#[cfg_attr(test, mockall::automock)]
pub trait LanguageModel: Send + Sync {
    fn predict(&self, text: &str) -> Result<Option<Prediction>>;
}
