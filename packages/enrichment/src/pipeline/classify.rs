//! Language classification.

use std::sync::Arc;

use crate::error::Result;
use crate::traits::language::LanguageModel;
use crate::types::config::ClassifierConfig;
use crate::types::posting::LanguageTag;

/// Tags text with a language code and confidence.
///
/// Wraps a shared [`LanguageModel`] handle; the model is loaded once before
/// the run and never reloaded here.
#[derive(Clone)]
pub struct Classifier {
    model: Arc<dyn LanguageModel>,
    config: ClassifierConfig,
}

impl Classifier {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self {
            model,
            config: ClassifierConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ClassifierConfig) -> Self {
        self.config = config;
        self
    }

    pub fn min_confidence(&self) -> f64 {
        self.config.min_confidence
    }

    /// Classify `text`.
    ///
    /// Blank text is `unknown` with confidence 0 and never reaches the model.
    /// Predictions under the threshold are `unknown` but keep their
    /// confidence. Model failures propagate as `ClassifierUnavailable`.
    pub fn classify(&self, text: &str) -> Result<LanguageTag> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(LanguageTag::unknown(0.0));
        }

        let prediction = match self.model.predict(text)? {
            Some(p) => p,
            None => return Ok(LanguageTag::unknown(0.0)),
        };

        let confidence = prediction.confidence.clamp(0.0, 1.0);
        let code = prediction.code.trim().to_lowercase();
        if code.is_empty() || confidence < self.config.min_confidence {
            return Ok(LanguageTag::unknown(confidence));
        }

        Ok(LanguageTag::new(code, confidence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EnrichmentError;
    use crate::traits::language::{MockLanguageModel, Prediction};

    #[test]
    fn test_confident_prediction() {
        let mut model = MockLanguageModel::new();
        model
            .expect_predict()
            .times(1)
            .returning(|_| Ok(Some(Prediction::new("EN", 0.95))));

        let classifier = Classifier::new(Arc::new(model));
        let tag = classifier.classify("We are hiring a Rust engineer").unwrap();

        assert_eq!(tag, LanguageTag::new("en", 0.95));
    }

    #[test]
    fn test_low_confidence_is_unknown() {
        let mut model = MockLanguageModel::new();
        model
            .expect_predict()
            .returning(|_| Ok(Some(Prediction::new("fr", 0.3))));

        let classifier = Classifier::new(Arc::new(model))
            .with_config(ClassifierConfig::default().with_min_confidence(0.5));
        let tag = classifier.classify("ok").unwrap();

        assert!(!tag.is_known());
        assert_eq!(tag.confidence, 0.3);
    }

    #[test]
    fn test_blank_text_skips_model() {
        let mut model = MockLanguageModel::new();
        model.expect_predict().times(0);

        let classifier = Classifier::new(Arc::new(model));
        assert_eq!(classifier.classify(" \n ").unwrap(), LanguageTag::unknown(0.0));
    }

    #[test]
    fn test_model_failure_propagates() {
        let mut model = MockLanguageModel::new();
        model
            .expect_predict()
            .returning(|_| Err(EnrichmentError::ClassifierUnavailable("unloaded".into())));

        let classifier = Classifier::new(Arc::new(model));
        assert!(matches!(
            classifier.classify("text"),
            Err(EnrichmentError::ClassifierUnavailable(_))
        ));
    }
}
