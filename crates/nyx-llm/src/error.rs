//! Error types for LLM calls

use std::time::Duration;

/// Result alias for LLM operations
pub type LlmResult<T> = Result<T, LlmError>;

/// Failures talking to a chat completion or embedding backend
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// Transport-level failure (connection refused, TLS, body read)
    #[cfg(feature = "openai")]
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status
    #[error("api returned status {status}: {body}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body, as text
        body: String,
    },

    /// The response could not be interpreted
    #[error("failed to parse {context}: {message}")]
    Parse {
        /// What was being parsed
        context: String,
        /// Parser message
        message: String,
    },

    /// Invalid client configuration
    #[error("invalid configuration for {field}: {message}")]
    Config {
        /// Offending setting
        field: String,
        /// Why it was rejected
        message: String,
    },

    /// The request did not complete in time
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

impl LlmError {
    /// Create a parse error
    pub fn parse(context: impl Into<String>, message: impl ToString) -> Self {
        Self::Parse {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error
    pub fn config(field: impl Into<String>, message: impl ToString) -> Self {
        Self::Config {
            field: field.into(),
            message: message.to_string(),
        }
    }

    /// Whether retrying the same request could succeed
    pub fn is_transient(&self) -> bool {
        match self {
            #[cfg(feature = "openai")]
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::Timeout(_) => true,
            Self::Parse { .. } | Self::Config { .. } => false,
        }
    }
}
