use std::time::Duration;

use crate::errors::LabError;

use super::options::OpenAiRequestOptions;

/// Configuration for the OpenAI backend client.
#[derive(Clone, Debug)]
pub struct OpenAiClientConfig {
    /// API key used for bearer auth.
    pub api_key: String,
    /// Base URL for the OpenAI-compatible endpoint.
    ///
    /// Useful for proxies or local test servers.
    pub base_url: String,
    /// Default HTTP timeout for a single request.
    pub timeout: Duration,
    /// Headers applied to every request.
    pub options: OpenAiRequestOptions,
}

impl OpenAiClientConfig {
    /// Creates a config with sensible defaults and a provided API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.openai.com".to_string(),
            timeout: Duration::from_secs(120),
            options: OpenAiRequestOptions::default(),
        }
    }

    /// Builds a config from `OPENAI_API_KEY`.
    ///
    /// `OPENAI_BASE_URL`, `OPENAI_ORG_ID` and `OPENAI_PROJECT_ID` are honoured
    /// when set.
    pub fn from_env() -> Result<Self, LabError> {
        let api_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
        if api_key.trim().is_empty() {
            return Err(LabError::Config(
                "missing OPENAI_API_KEY (set it in the environment or a .env file)".into(),
            ));
        }
        let mut config = Self::new(api_key);
        if let Some(base_url) = non_empty_env("OPENAI_BASE_URL") {
            config = config.base_url(base_url);
        }
        if let Some(org) = non_empty_env("OPENAI_ORG_ID") {
            config.options = config.options.organization(org);
        }
        if let Some(project) = non_empty_env("OPENAI_PROJECT_ID") {
            config.options = config.options.project(project);
        }
        Ok(config)
    }

    /// Overrides the API base URL (for proxies or test servers).
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Overrides the default HTTP timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Replaces the per-request header options.
    pub fn options(mut self, options: OpenAiRequestOptions) -> Self {
        self.options = options;
        self
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!(
            "{}/v1/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
