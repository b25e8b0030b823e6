//! Error types for the memory engine
//!
//! Every failure is scoped to the turn that produced it. Storage errors are
//! surfaced to the caller; capability errors (embedding, summarization,
//! topics, chat completion) have a documented local fallback at the call
//! site.

use std::time::Duration;

/// Result alias used across nyx-core
pub type NyxResult<T> = Result<T, NyxError>;

/// Boxed error source
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised by the memory engine
#[derive(Debug, thiserror::Error)]
pub enum NyxError {
    /// Backend failure while reading or writing the graph
    #[error("storage operation '{operation}' failed: {source}")]
    Storage {
        /// Operation that failed
        operation: String,
        /// Underlying cause
        #[source]
        source: BoxError,
    },

    /// A write would break a uniqueness or structural invariant
    #[error("constraint violated: {constraint} ({detail})")]
    Constraint {
        /// Name of the invariant
        constraint: &'static str,
        /// What triggered it
        detail: String,
    },

    /// Embedding capability failure
    #[error("embedding failed: {message}")]
    Embedding {
        /// Cause
        message: String,
    },

    /// Summarization capability failure
    #[error("summarization failed: {message}")]
    Summarization {
        /// Cause
        message: String,
    },

    /// Topic capability failure
    #[error("topic inference failed: {message}")]
    Topic {
        /// Cause
        message: String,
    },

    /// Chat completion failure
    #[error("llm call '{operation}' failed: {source}")]
    Llm {
        /// What the call was for
        operation: String,
        /// Client error
        #[source]
        source: nyx_llm::LlmError,
    },

    /// Unknown tool or bad tool arguments
    #[error("tool '{tool}' failed: {message}")]
    ToolExecution {
        /// Requested tool name
        tool: String,
        /// Cause
        message: String,
    },

    /// Invalid input
    #[error("invalid {field}: {constraint} (got {value})")]
    Validation {
        /// Field name
        field: String,
        /// Rule that was broken
        constraint: String,
        /// Offending value
        value: String,
    },

    /// A capability call exceeded its deadline
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// Operation that timed out
        operation: String,
        /// Configured deadline
        after: Duration,
    },
}

impl NyxError {
    /// Create a storage error
    pub fn storage(
        operation: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::Storage {
            operation: operation.into(),
            source: source.into(),
        }
    }

    /// Create a constraint violation
    pub fn constraint(constraint: &'static str, detail: impl Into<String>) -> Self {
        Self::Constraint {
            constraint,
            detail: detail.into(),
        }
    }

    /// Create an embedding error
    pub fn embedding(message: impl ToString) -> Self {
        Self::Embedding {
            message: message.to_string(),
        }
    }

    /// Create a summarization error
    pub fn summarization(message: impl ToString) -> Self {
        Self::Summarization {
            message: message.to_string(),
        }
    }

    /// Create a topic error
    pub fn topic(message: impl ToString) -> Self {
        Self::Topic {
            message: message.to_string(),
        }
    }

    /// Wrap an LLM client error
    pub fn llm(operation: impl Into<String>, source: nyx_llm::LlmError) -> Self {
        Self::Llm {
            operation: operation.into(),
            source,
        }
    }

    /// Create a tool execution error
    pub fn tool(tool: impl Into<String>, message: impl ToString) -> Self {
        Self::ToolExecution {
            tool: tool.into(),
            message: message.to_string(),
        }
    }

    /// Create a validation error
    pub fn validation(
        field: impl Into<String>,
        constraint: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self::Validation {
            field: field.into(),
            constraint: constraint.into(),
            value: value.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            after,
        }
    }

    /// Whether this belongs to the StorageError family
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage { .. } | Self::Constraint { .. })
    }

    /// Whether the same call could succeed on a later turn
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Llm { source, .. } => source.is_transient(),
            Self::Timeout { .. } => true,
            _ => false,
        }
    }
}

/// Run a capability future under a deadline
pub(crate) async fn with_timeout<T, F>(operation: &str, after: Duration, fut: F) -> NyxResult<T>
where
    F: std::future::Future<Output = NyxResult<T>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => Err(NyxError::timeout(operation, after)),
    }
}
