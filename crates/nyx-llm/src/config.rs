//! Client configuration

use crate::error::{LlmError, LlmResult};
use serde_json::{Map, Value};
use std::time::Duration;

/// Default OpenAI-compatible endpoint (LM Studio)
pub const DEFAULT_BASE_URL: &str = "http://localhost:1234/v1";

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Connection settings for an OpenAI-compatible server
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL, e.g. `http://localhost:1234/v1`
    pub base_url: String,

    /// Bearer token, if the server requires one
    pub api_key: Option<String>,

    /// Chat model identifier
    pub model: String,

    /// Embedding model identifier
    pub embedding_model: String,

    /// Per-request timeout
    pub timeout: Duration,

    /// Extra body parameters merged into every chat request (temperature, ...)
    pub extra_parameters: Map<String, Value>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            model: "local-model".to_string(),
            embedding_model: "text-embedding-nomic-embed-text-v1.5".to_string(),
            timeout: DEFAULT_TIMEOUT,
            extra_parameters: Map::new(),
        }
    }
}

impl ClientConfig {
    /// Create a configuration for the given endpoint and model
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            ..Default::default()
        }
    }

    /// Load from `NYX_LLM_*` environment variables (and `.env` if present)
    ///
    /// Recognised: `NYX_LLM_BASE_URL`, `NYX_LLM_API_KEY`, `NYX_LLM_MODEL`,
    /// `NYX_LLM_EMBEDDING_MODEL`, `NYX_LLM_TIMEOUT_SECS`.
    pub fn from_env() -> LlmResult<Self> {
        dotenv::dotenv().ok();

        let mut config = Self::default();
        if let Ok(url) = std::env::var("NYX_LLM_BASE_URL") {
            config.base_url = url;
        }
        if let Ok(key) = std::env::var("NYX_LLM_API_KEY") {
            if !key.is_empty() {
                config.api_key = Some(key);
            }
        }
        if let Ok(model) = std::env::var("NYX_LLM_MODEL") {
            config.model = model;
        }
        if let Ok(model) = std::env::var("NYX_LLM_EMBEDDING_MODEL") {
            config.embedding_model = model;
        }
        if let Ok(secs) = std::env::var("NYX_LLM_TIMEOUT_SECS") {
            let secs: u64 = secs
                .parse()
                .map_err(|e| LlmError::config("NYX_LLM_TIMEOUT_SECS", e))?;
            config.timeout = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    /// Set API key
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set embedding model
    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }

    /// Set request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set extra request parameters
    pub fn with_extra_parameters(mut self, extra: Map<String, Value>) -> Self {
        self.extra_parameters = extra;
        self
    }

    /// Check the URL and timeout
    pub fn validate(&self) -> LlmResult<()> {
        url::Url::parse(&self.base_url).map_err(|e| LlmError::config("base_url", e))?;
        if self.timeout.is_zero() {
            return Err(LlmError::config("timeout", "must be greater than zero"));
        }
        if self.model.trim().is_empty() {
            return Err(LlmError::config("model", "must not be empty"));
        }
        Ok(())
    }

    /// Full URL for an endpoint path such as `chat/completions`
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_without_double_slash() {
        let config = ClientConfig::new("http://localhost:1234/v1/", "m");
        assert_eq!(
            config.endpoint("chat/completions"),
            "http://localhost:1234/v1/chat/completions"
        );
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let config = ClientConfig::new("not a url", "m");
        assert!(matches!(
            config.validate(),
            Err(LlmError::Config { ref field, .. }) if field == "base_url"
        ));
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let config = ClientConfig::default().with_timeout(Duration::ZERO);
        assert!(config.validate().is_err());
    }
}
