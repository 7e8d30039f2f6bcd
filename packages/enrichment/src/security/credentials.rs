//! API keys kept out of logs.

use secrecy::{ExposeSecret, SecretBox};
use std::fmt;

/// A string that prints as `[REDACTED]` in Debug and Display.
pub struct SecretString(SecretBox<str>);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretBox::new(value.into().into_boxed_str()))
    }

    /// Borrow the secret. Only call this where the value is sent.
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    pub fn is_empty(&self) -> bool {
        self.expose().trim().is_empty()
    }
}

impl Clone for SecretString {
    fn clone(&self) -> Self {
        Self::new(self.expose())
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// How a hosted API addresses models and authenticates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiFlavor {
    /// `{base_url}/chat/completions` with a bearer token.
    OpenAi,
    /// `{endpoint}/openai/deployments/{deployment}/chat/completions` with an
    /// `api-key` header.
    Azure { api_version: String },
}

/// Endpoint, key and model for a hosted text-generation API.
///
/// For Azure, `base_url` is the resource endpoint and `model` the
/// deployment name.
#[derive(Clone)]
pub struct BackendCredentials {
    pub api_key: SecretString,
    pub model: String,
    pub base_url: String,
    pub flavor: ApiFlavor,
}

impl BackendCredentials {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.openai.com/v1";
    pub const DEFAULT_MODEL: &'static str = "gpt-4o-mini";
    pub const DEFAULT_AZURE_API_VERSION: &'static str = "2024-08-01-preview";

    pub fn new(api_key: impl Into<SecretString>) -> Self {
        Self {
            api_key: api_key.into(),
            model: Self::DEFAULT_MODEL.to_string(),
            base_url: Self::DEFAULT_BASE_URL.to_string(),
            flavor: ApiFlavor::OpenAi,
        }
    }

    /// Credentials for an Azure OpenAI deployment.
    pub fn azure(
        endpoint: impl Into<String>,
        api_key: impl Into<SecretString>,
        deployment: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            model: deployment.into(),
            base_url: String::new(),
            flavor: ApiFlavor::Azure {
                api_version: Self::DEFAULT_AZURE_API_VERSION.to_string(),
            },
        }
        .with_base_url(endpoint)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the base URL (proxies, compatible servers, Azure endpoints).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Override the Azure API version. No effect on other flavors.
    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        if let ApiFlavor::Azure { api_version } = &mut self.flavor {
            *api_version = version.into();
        }
        self
    }

    /// Full chat completions URL for these credentials.
    pub fn chat_completions_url(&self) -> String {
        match &self.flavor {
            ApiFlavor::OpenAi => format!("{}/chat/completions", self.base_url),
            ApiFlavor::Azure { api_version } => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                self.base_url, self.model, api_version
            ),
        }
    }
}

impl fmt::Debug for BackendCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendCredentials")
            .field("api_key", &self.api_key)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("flavor", &self.flavor)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_never_printed() {
        let secret = SecretString::new("sk-live-abcdef");
        assert_eq!(format!("{:?}", secret), "[REDACTED]");
        assert_eq!(format!("{}", secret), "[REDACTED]");
        assert_eq!(secret.expose(), "sk-live-abcdef");
    }

    #[test]
    fn test_credentials_debug_redacts_key() {
        let creds = BackendCredentials::new("sk-live-abcdef").with_base_url("http://proxy.local/v1/");
        let debug = format!("{:?}", creds);

        assert!(!debug.contains("sk-live"));
        assert!(debug.contains("gpt-4o-mini"));
        assert_eq!(creds.base_url, "http://proxy.local/v1");
    }

    #[test]
    fn test_chat_completions_url() {
        let openai = BackendCredentials::new("sk-test");
        assert_eq!(
            openai.chat_completions_url(),
            "https://api.openai.com/v1/chat/completions"
        );

        let azure = BackendCredentials::azure("https://acme.openai.azure.com/", "az-key", "gpt4o-prod");
        assert_eq!(
            azure.chat_completions_url(),
            "https://acme.openai.azure.com/openai/deployments/gpt4o-prod/chat/completions?api-version=2024-08-01-preview"
        );
        assert!(azure
            .with_api_version("2024-10-21")
            .chat_completions_url()
            .ends_with("?api-version=2024-10-21"));
    }
}
