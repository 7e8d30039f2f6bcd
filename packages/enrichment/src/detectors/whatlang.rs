//! Trigram language model backed by the `whatlang` crate.

use std::path::Path;
use ::whatlang::{Detector, Lang};

use crate::error::{EnrichmentError, Result};
use crate::traits::language::{LanguageModel, Prediction};

/// ISO 639-3 code used by whatlang to ISO 639-1.
const ISO_639_1: [(&str, &str); 69] = [
    ("afr", "af"), ("aka", "ak"), ("amh", "am"), ("ara", "ar"), ("aze", "az"),
    ("bel", "be"), ("ben", "bn"), ("bul", "bg"), ("cat", "ca"), ("ces", "cs"),
    ("cmn", "zh"), ("dan", "da"), ("deu", "de"), ("ell", "el"), ("eng", "en"),
    ("epo", "eo"), ("est", "et"), ("fin", "fi"), ("fra", "fr"), ("guj", "gu"),
    ("heb", "he"), ("hin", "hi"), ("hrv", "hr"), ("hun", "hu"), ("hye", "hy"),
    ("ind", "id"), ("ita", "it"), ("jav", "jv"), ("jpn", "ja"), ("kan", "kn"),
    ("kat", "ka"), ("khm", "km"), ("kor", "ko"), ("lat", "la"), ("lav", "lv"),
    ("lit", "lt"), ("mal", "ml"), ("mar", "mr"), ("mkd", "mk"), ("mya", "my"),
    ("nep", "ne"), ("nld", "nl"), ("nob", "nb"), ("ori", "or"), ("pan", "pa"),
    ("pes", "fa"), ("pol", "pl"), ("por", "pt"), ("ron", "ro"), ("rus", "ru"),
    ("sin", "si"), ("slk", "sk"), ("slv", "sl"), ("sna", "sn"), ("spa", "es"),
    ("srp", "sr"), ("swe", "sv"), ("tam", "ta"), ("tel", "te"), ("tgl", "tl"),
    ("tha", "th"), ("tuk", "tk"), ("tur", "tr"), ("ukr", "uk"), ("urd", "ur"),
    ("uzb", "uz"), ("vie", "vi"), ("yid", "yi"), ("zul", "zu"),
];

/// Two-letter code where one exists, whatlang's own code otherwise.
pub fn short_code(lang: Lang) -> &'static str {
    let code = lang.code();
    ISO_639_1
        .iter()
        .find(|(long, _)| *long == code)
        .map(|(_, short)| *short)
        .unwrap_or(code)
}

/// Parse a two- or three-letter code.
pub fn parse_code(code: &str) -> Option<Lang> {
    let code = code.trim().to_lowercase();
    let long = ISO_639_1
        .iter()
        .find(|(_, short)| *short == code)
        .map(|(long, _)| *long)
        .unwrap_or(code.as_str());
    Lang::from_code(long)
}

/// Language model using whatlang's built-in trigram profiles.
///
/// The profiles are compiled into the binary, so "loading" only means
/// choosing which languages may be predicted.
pub struct WhatlangModel {
    detector: Detector,
    languages: Option<Vec<Lang>>,
}

impl Default for WhatlangModel {
    fn default() -> Self {
        Self::new()
    }
}

impl WhatlangModel {
    /// Consider every language whatlang knows.
    pub fn new() -> Self {
        Self {
            detector: Detector::new(),
            languages: None,
        }
    }

    /// Restrict predictions to `codes`.
    pub fn with_languages<S: AsRef<str>>(codes: &[S]) -> Result<Self> {
        let mut languages = Vec::with_capacity(codes.len());
        for code in codes {
            let lang = parse_code(code.as_ref()).ok_or_else(|| {
                EnrichmentError::ClassifierUnavailable(format!(
                    "unknown language code '{}'",
                    code.as_ref()
                ))
            })?;
            if !languages.contains(&lang) {
                languages.push(lang);
            }
        }
        if languages.is_empty() {
            return Err(EnrichmentError::ClassifierUnavailable(
                "language allow-list is empty".into(),
            ));
        }

        Ok(Self {
            detector: Detector::with_allowlist(languages.clone()),
            languages: Some(languages),
        })
    }

    /// Load an allow-list file: one code per line, `#` starts a comment.
    pub fn from_allowlist_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            EnrichmentError::ClassifierUnavailable(format!(
                "cannot read language model at {}: {}",
                path.display(),
                e
            ))
        })?;

        let codes: Vec<&str> = contents
            .lines()
            .map(|line| line.split('#').next().unwrap_or("").trim())
            .filter(|line| !line.is_empty())
            .collect();

        Self::with_languages(&codes)
    }

    /// Languages this model may predict; `None` means all.
    pub fn languages(&self) -> Option<Vec<&'static str>> {
        self.languages
            .as_ref()
            .map(|langs| langs.iter().map(|l| short_code(*l)).collect())
    }
}

impl LanguageModel for WhatlangModel {
    fn predict(&self, text: &str) -> Result<Option<Prediction>> {
        Ok(self
            .detector
            .detect(text)
            .map(|info| Prediction::new(short_code(info.lang()), info.confidence())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_code_mapping() {
        assert_eq!(short_code(Lang::Eng), "en");
        assert_eq!(short_code(Lang::Fra), "fr");
        assert_eq!(parse_code("DE"), Some(Lang::Deu));
        assert_eq!(parse_code("spa"), Some(Lang::Spa));
        assert_eq!(parse_code("xx"), None);
    }

    #[test]
    fn test_detects_english_and_french() {
        let model = WhatlangModel::with_languages(&["en", "fr"]).unwrap();

        let english = model
            .predict("We are looking for an experienced software engineer to join our growing team in Paris.")
            .unwrap()
            .unwrap();
        assert_eq!(english.code, "en");

        let french = model
            .predict("Nous recherchons un développeur expérimenté pour rejoindre notre équipe à Lyon.")
            .unwrap()
            .unwrap();
        assert_eq!(french.code, "fr");
        assert!(french.confidence > 0.0 && french.confidence <= 1.0);
    }

    #[test]
    fn test_allowlist_file() {
        let path = std::env::temp_dir().join(format!("langs-{}.txt", Uuid::new_v4()));
        std::fs::write(&path, "# languages we read\nen\nfr  # french\n\n").unwrap();

        let model = WhatlangModel::from_allowlist_file(&path).unwrap();
        assert_eq!(model.languages(), Some(vec!["en", "fr"]));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_missing_or_empty_file_is_unavailable() {
        let missing = std::env::temp_dir().join(format!("missing-{}.txt", Uuid::new_v4()));
        assert!(matches!(
            WhatlangModel::from_allowlist_file(&missing),
            Err(EnrichmentError::ClassifierUnavailable(_))
        ));

        let empty = std::env::temp_dir().join(format!("empty-{}.txt", Uuid::new_v4()));
        std::fs::write(&empty, "# nothing here\n").unwrap();
        assert!(matches!(
            WhatlangModel::from_allowlist_file(&empty),
            Err(EnrichmentError::ClassifierUnavailable(_))
        ));
        std::fs::remove_file(&empty).ok();
    }
}
