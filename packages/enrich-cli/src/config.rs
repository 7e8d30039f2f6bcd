use anyhow::{bail, Context, Result};
use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use enrichment::{
    BackendCredentials, ClassifierConfig, CloudBackend, ExperienceLevel, ExtractionBackend,
    ExtractionConfig, JobType, LocalBackend, PipelineConfig, RateLimitedBackend, RetryPolicy,
    SearchSettings, SecretString, WhatlangModel,
};

/// Which extraction backend a run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Cloud,
    /// Azure OpenAI deployment.
    Azure,
    Local,
    /// Extraction disabled.
    None,
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "cloud" | "openai" => Ok(Self::Cloud),
            "azure" => Ok(Self::Azure),
            "local" | "ollama" => Ok(Self::Local),
            "none" | "" => Ok(Self::None),
            other => bail!("invalid extraction backend '{}', must be one of: cloud, azure, local, none", other),
        }
    }
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub search: SearchSettings,
    pub desired_language: Option<String>,
    pub language_model_path: Option<PathBuf>,
    pub min_confidence: f64,
    pub backend: BackendKind,
    pub openai_api_key: Option<SecretString>,
    pub openai_base_url: String,
    pub openai_model: String,
    pub azure_endpoint: Option<String>,
    pub azure_api_key: Option<SecretString>,
    pub azure_deployment: Option<String>,
    pub azure_api_version: String,
    pub local_llm_url: String,
    pub local_llm_model: String,
    pub concurrency: usize,
    pub max_attempts: u32,
    pub requests_per_second: Option<u32>,
    pub extract_salary: bool,
    pub extract_skills: bool,
    pub max_postings: usize,
    pub max_per_position: usize,
    pub output_dir: PathBuf,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str, default: &str| -> String {
            lookup(name).unwrap_or_else(|| default.to_string())
        };
        let optional = |name: &str| -> Option<String> {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let search = SearchSettings {
            positions: SearchSettings::parse_positions(&var(
                "JOB_SEARCH_POSITIONS",
                "Software Developer",
            )),
            location: var("JOB_SEARCH_LOCATION", "France"),
            job_type: var("JOB_TYPE", "Remote")
                .parse::<JobType>()
                .context("JOB_TYPE is invalid")?,
            experience_level: var("JOB_EXPERIENCE_LEVEL", "Mid-Senior")
                .parse::<ExperienceLevel>()
                .context("JOB_EXPERIENCE_LEVEL is invalid")?,
        };

        Ok(Self {
            search,
            desired_language: optional("JOB_DESIRED_LANGUAGE").map(|l| l.to_lowercase()),
            language_model_path: optional("LANGUAGE_MODEL_PATH").map(PathBuf::from),
            min_confidence: var("LANGUAGE_MIN_CONFIDENCE", "0.5")
                .parse()
                .context("LANGUAGE_MIN_CONFIDENCE must be a number between 0 and 1")?,
            backend: var("EXTRACTION_BACKEND", "none")
                .parse()
                .context("EXTRACTION_BACKEND is invalid")?,
            openai_api_key: optional("OPENAI_API_KEY").map(SecretString::new),
            openai_base_url: var("OPENAI_BASE_URL", BackendCredentials::DEFAULT_BASE_URL),
            openai_model: var("OPENAI_MODEL", BackendCredentials::DEFAULT_MODEL),
            azure_endpoint: optional("AZURE_OPENAI_ENDPOINT"),
            azure_api_key: optional("AZURE_OPENAI_API_KEY").map(SecretString::new),
            azure_deployment: optional("AZURE_OPENAI_MODEL_NAME"),
            azure_api_version: var(
                "AZURE_OPENAI_API_VERSION",
                BackendCredentials::DEFAULT_AZURE_API_VERSION,
            ),
            local_llm_url: var("LOCAL_LLM_URL", LocalBackend::DEFAULT_URL),
            local_llm_model: var("LOCAL_LLM_MODEL", LocalBackend::DEFAULT_MODEL),
            concurrency: var("EXTRACTION_CONCURRENCY", "4")
                .parse()
                .context("EXTRACTION_CONCURRENCY must be a valid number")?,
            max_attempts: var("EXTRACTION_MAX_ATTEMPTS", "4")
                .parse()
                .context("EXTRACTION_MAX_ATTEMPTS must be a valid number")?,
            requests_per_second: optional("EXTRACTION_REQUESTS_PER_SECOND")
                .map(|v| v.parse())
                .transpose()
                .context("EXTRACTION_REQUESTS_PER_SECOND must be a valid number")?,
            extract_salary: parse_bool(&var("EXTRACT_SALARY", "true"))
                .context("EXTRACT_SALARY must be true or false")?,
            extract_skills: parse_bool(&var("EXTRACT_SKILLS", "true"))
                .context("EXTRACT_SKILLS must be true or false")?,
            max_postings: var("MAX_POSTINGS", "300")
                .parse()
                .context("MAX_POSTINGS must be a valid number")?,
            max_per_position: var("MAX_POSTINGS_PER_POSITION", "100")
                .parse()
                .context("MAX_POSTINGS_PER_POSITION must be a valid number")?,
            output_dir: PathBuf::from(var("OUTPUT_DIR", "output")),
        })
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        let mut config = PipelineConfig::new()
            .with_concurrency(self.concurrency)
            .with_max_postings(self.max_postings)
            .with_max_per_position(self.max_per_position);
        if let Some(language) = &self.desired_language {
            config = config.with_desired_language(language.as_str());
        }
        if self.backend == BackendKind::None {
            config = config.without_extraction();
        }
        config
    }

    pub fn extraction_config(&self) -> ExtractionConfig {
        ExtractionConfig::new()
            .with_salary(self.extract_salary)
            .with_skills(self.extract_skills)
            .with_retry(RetryPolicy::new(self.max_attempts))
    }

    pub fn classifier_config(&self) -> ClassifierConfig {
        ClassifierConfig::default().with_min_confidence(self.min_confidence)
    }

    /// Load the language model. A configured allow-list file must exist.
    pub fn language_model(&self) -> Result<WhatlangModel> {
        match &self.language_model_path {
            Some(path) => WhatlangModel::from_allowlist_file(path)
                .with_context(|| format!("Failed to load language model from {}", path.display())),
            None => Ok(WhatlangModel::new()),
        }
    }

    /// Build the configured backend, rate limited when a rate is set.
    pub fn backend(&self) -> Result<Option<Arc<dyn ExtractionBackend>>> {
        let backend: Arc<dyn ExtractionBackend> = match self.backend {
            BackendKind::None => return Ok(None),
            BackendKind::Cloud => {
                let key = self
                    .openai_api_key
                    .clone()
                    .context("OPENAI_API_KEY must be set for the cloud backend")?;
                let credentials = BackendCredentials::new(key)
                    .with_base_url(self.openai_base_url.as_str())
                    .with_model(self.openai_model.as_str());
                let backend =
                    CloudBackend::new(credentials).context("Failed to create cloud backend")?;
                self.rate_limited(backend)?
            }
            BackendKind::Azure => {
                let endpoint = self
                    .azure_endpoint
                    .clone()
                    .context("AZURE_OPENAI_ENDPOINT must be set for the azure backend")?;
                let key = self
                    .azure_api_key
                    .clone()
                    .context("AZURE_OPENAI_API_KEY must be set for the azure backend")?;
                let deployment = self
                    .azure_deployment
                    .clone()
                    .context("AZURE_OPENAI_MODEL_NAME must be set for the azure backend")?;
                let credentials = BackendCredentials::azure(endpoint, key, deployment)
                    .with_api_version(self.azure_api_version.as_str());
                let backend =
                    CloudBackend::new(credentials).context("Failed to create azure backend")?;
                self.rate_limited(backend)?
            }
            BackendKind::Local => {
                let backend = LocalBackend::new(&self.local_llm_url, &self.local_llm_model)
                    .context("Failed to create local backend")?;
                self.rate_limited(backend)?
            }
        };
        Ok(Some(backend))
    }

    fn rate_limited<B>(&self, backend: B) -> Result<Arc<dyn ExtractionBackend>>
    where
        B: ExtractionBackend + 'static,
    {
        Ok(match self.requests_per_second {
            Some(rps) => Arc::new(
                RateLimitedBackend::new(backend, rps)
                    .context("EXTRACTION_REQUESTS_PER_SECOND must be positive")?,
            ),
            None => Arc::new(backend),
        })
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => bail!("'{}' is not a boolean", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config.search.positions, vec!["Software Developer"]);
        assert_eq!(config.search.job_type, JobType::Remote);
        assert_eq!(config.backend, BackendKind::None);
        assert_eq!(config.max_postings, 300);
        assert_eq!(config.max_per_position, 100);
        assert_eq!(config.output_dir, PathBuf::from("output"));
        assert!(config.desired_language.is_none());
        assert!(!config.pipeline_config().extract);
        assert!(config.backend().unwrap().is_none());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(config_from(&[("JOB_TYPE", "Anywhere")]).is_err());
        assert!(config_from(&[("EXTRACTION_BACKEND", "gpt")]).is_err());
        assert!(config_from(&[("EXTRACT_SALARY", "maybe")]).is_err());
        assert!(config_from(&[("MAX_POSTINGS", "lots")]).is_err());
    }

    #[test]
    fn test_cloud_backend_requires_key() {
        let config = config_from(&[("EXTRACTION_BACKEND", "cloud")]).unwrap();
        assert!(config.backend().is_err());

        let config = config_from(&[
            ("EXTRACTION_BACKEND", "cloud"),
            ("OPENAI_API_KEY", "sk-test"),
            ("EXTRACTION_REQUESTS_PER_SECOND", "2"),
        ])
        .unwrap();
        let backend = config.backend().unwrap().unwrap();
        assert_eq!(backend.name(), "cloud");
        assert!(!format!("{:?}", config).contains("sk-test"));
    }

    #[test]
    fn test_pipeline_and_extraction_settings() {
        let config = config_from(&[
            ("EXTRACTION_BACKEND", "local"),
            ("JOB_DESIRED_LANGUAGE", " EN "),
            ("EXTRACT_SKILLS", "false"),
            ("EXTRACTION_MAX_ATTEMPTS", "2"),
        ])
        .unwrap();

        let pipeline = config.pipeline_config();
        assert!(pipeline.extract);
        assert_eq!(pipeline.desired_language.as_deref(), Some("en"));

        let extraction = config.extraction_config();
        assert!(!extraction.include_skills);
        assert_eq!(extraction.retry.max_attempts, 2);
    }

    #[test]
    fn test_azure_backend_settings() {
        let missing = config_from(&[
            ("EXTRACTION_BACKEND", "azure"),
            ("AZURE_OPENAI_ENDPOINT", "https://acme.openai.azure.com"),
            ("AZURE_OPENAI_API_KEY", "az-secret"),
        ])
        .unwrap();
        let err = missing.backend().err().unwrap();
        assert!(err.to_string().contains("AZURE_OPENAI_MODEL_NAME"));

        let config = config_from(&[
            ("EXTRACTION_BACKEND", "Azure"),
            ("AZURE_OPENAI_ENDPOINT", "https://acme.openai.azure.com"),
            ("AZURE_OPENAI_API_KEY", "az-secret"),
            ("AZURE_OPENAI_MODEL_NAME", "gpt4o-prod"),
            ("AZURE_OPENAI_API_VERSION", "2024-10-21"),
        ])
        .unwrap();
        assert_eq!(config.backend, BackendKind::Azure);
        assert_eq!(config.azure_api_version, "2024-10-21");
        assert!(config.pipeline_config().extract);
        assert_eq!(config.backend().unwrap().unwrap().name(), "cloud");
        assert!(!format!("{:?}", config).contains("az-secret"));
    }
}
