//! Runtime configuration
//!
//! Loaded once at startup: an optional YAML file, then `NYX_*` environment
//! overrides (nested keys separated by `__`, lists by `,`). A `.env` file in
//! the working directory is read first.

use crate::bot::AccessPolicy;
use nyx_core::agent::AgentConfig;
use nyx_core::memory::{BotIdentity, ChainConfig, SegmenterConfig};
use nyx_llm::ClientConfig;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File or environment could not be read or deserialized
    #[error("failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    /// A value is out of range
    #[error("invalid configuration value '{key}': {reason}")]
    Invalid {
        /// Offending key
        key: &'static str,
        /// What is wrong with it
        reason: String,
    },
}

impl ConfigError {
    fn invalid(key: &'static str, reason: impl ToString) -> Self {
        Self::Invalid {
            key,
            reason: reason.to_string(),
        }
    }
}

/// Where embeddings come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// The `/embeddings` endpoint of the configured server
    Http,
    /// Offline feature hashing
    Hash,
}

/// Everything the `nyx` binary can be configured with
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NyxConfig {
    /// Platform id of the assistant's own account
    pub bot_id: String,
    /// Display name of the assistant
    pub bot_name: String,
    /// System prompt prefix
    pub system_prompt: String,

    /// Chat model
    pub model: String,
    /// OpenAI-compatible endpoint
    pub base_url: String,
    /// Bearer token
    pub api_key: Option<String>,
    /// Embedding model
    pub embedding_model: String,
    /// Embedding source
    pub embedding_backend: EmbeddingBackend,
    /// Vector length of the embedding model
    pub embedding_dimensions: usize,
    /// Extra body parameters for chat requests (temperature, ...)
    pub extra_api_parameters: Map<String, Value>,

    /// Answer direct messages
    pub allow_dms: bool,
    /// Channels the bot listens in; empty means all
    pub allowed_channel_ids: Vec<String>,
    /// Users whose messages are ignored
    pub blocked_user_ids: Vec<String>,

    /// Entries kept per conversation window
    pub context_window_size: usize,
    /// Conversation windows kept in memory
    pub max_conversations: usize,
    /// Reply hops followed when rebuilding a chain
    pub chain_max_hops: usize,
    /// Messages kept in a rebuilt chain
    pub chain_limit: usize,
    /// Minimum topic weight for a segment boundary
    pub segmentation_threshold: f32,
    /// Keywords in a segment label
    pub topic_keywords: usize,
    /// Default floor for memory search
    pub search_min_similarity: f32,
    /// Hits returned by memory search
    pub search_limit: usize,
    /// Chat completion calls per user turn
    pub max_tool_turns: usize,
    /// Offer tools on a conversation's first reply
    pub tools_on_first_message: bool,
    /// Deadline for every capability call
    pub capability_timeout_secs: u64,
    /// Offset used for prompt and tool times
    pub utc_offset_hours: i32,

    /// Graph snapshot file
    pub store_path: PathBuf,
}

impl Default for NyxConfig {
    fn default() -> Self {
        let agent = AgentConfig::default();
        let chain = ChainConfig::default();
        let segmenter = SegmenterConfig::default();
        let client = ClientConfig::default();

        Self {
            bot_id: "nyx".to_string(),
            bot_name: "Nyx".to_string(),
            system_prompt: agent.system_prompt,
            model: client.model,
            base_url: client.base_url,
            api_key: None,
            embedding_model: client.embedding_model,
            embedding_backend: EmbeddingBackend::Http,
            embedding_dimensions: 768,
            extra_api_parameters: Map::new(),
            allow_dms: true,
            allowed_channel_ids: Vec::new(),
            blocked_user_ids: Vec::new(),
            context_window_size: agent.window_size,
            max_conversations: agent.max_conversations,
            chain_max_hops: chain.max_hops,
            chain_limit: chain.limit,
            segmentation_threshold: segmenter.threshold,
            topic_keywords: segmenter.label_keywords,
            search_min_similarity: agent.search_min_similarity,
            search_limit: agent.search_limit,
            max_tool_turns: agent.max_turns,
            tools_on_first_message: agent.tools_on_first_message,
            capability_timeout_secs: agent.capability_timeout.as_secs(),
            utc_offset_hours: agent.utc_offset_hours,
            store_path: PathBuf::from("nyx-graph.json"),
        }
    }
}

impl NyxConfig {
    /// Load `path` (if it exists) plus `NYX_*` overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let settings = ::config::Config::builder()
            .add_source(::config::File::from(path.as_ref()).required(false))
            .add_source(
                ::config::Environment::with_prefix("NYX")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("allowed_channel_ids")
                    .with_list_parse_key("blocked_user_ids"),
            )
            .build()?;

        let loaded: Self = settings.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Check ranges the downstream builders rely on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bot_id.trim().is_empty() {
            return Err(ConfigError::invalid("bot_id", "must not be empty"));
        }
        if self.chain_limit == 0 {
            return Err(ConfigError::invalid("chain_limit", "must be at least 1"));
        }
        if self.embedding_dimensions == 0 {
            return Err(ConfigError::invalid("embedding_dimensions", "must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.segmentation_threshold) {
            return Err(ConfigError::invalid(
                "segmentation_threshold",
                "must be between 0 and 1",
            ));
        }
        if self.capability_timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "capability_timeout_secs",
                "must be greater than zero",
            ));
        }
        self.agent()
            .validate()
            .map_err(|e| ConfigError::invalid("agent", e))
    }

    /// Capability deadline
    pub fn capability_timeout(&self) -> Duration {
        Duration::from_secs(self.capability_timeout_secs)
    }

    /// Bot identity for stored responses
    pub fn identity(&self) -> BotIdentity {
        BotIdentity::new(&self.bot_id, &self.bot_name)
    }

    /// Agent settings
    pub fn agent(&self) -> AgentConfig {
        AgentConfig::new(&self.system_prompt)
            .with_window_size(self.context_window_size)
            .with_max_conversations(self.max_conversations)
            .with_max_turns(self.max_tool_turns)
            .with_tools_on_first_message(self.tools_on_first_message)
            .with_search(self.search_min_similarity, self.search_limit)
            .with_capability_timeout(self.capability_timeout())
            .with_utc_offset_hours(self.utc_offset_hours)
    }

    /// Chain traversal bounds
    pub fn chain(&self) -> ChainConfig {
        ChainConfig {
            max_hops: self.chain_max_hops,
            limit: self.chain_limit,
        }
    }

    /// Segmentation settings
    pub fn segmenter(&self) -> SegmenterConfig {
        SegmenterConfig {
            threshold: self.segmentation_threshold,
            label_keywords: self.topic_keywords,
            timeout: self.capability_timeout(),
        }
    }

    /// Chat and embedding client settings
    pub fn client(&self) -> ClientConfig {
        let mut client = ClientConfig::new(&self.base_url, &self.model)
            .with_embedding_model(&self.embedding_model)
            .with_extra_parameters(self.extra_api_parameters.clone());
        if let Some(key) = self.api_key.as_deref().filter(|k| !k.is_empty()) {
            client = client.with_api_key(key);
        }
        client
    }

    /// Who the bot listens to
    pub fn access(&self) -> AccessPolicy {
        AccessPolicy {
            bot_id: self.bot_id.clone(),
            allow_dms: self.allow_dms,
            allowed_channel_ids: self.allowed_channel_ids.iter().cloned().collect(),
            blocked_user_ids: self.blocked_user_ids.iter().cloned().collect(),
        }
    }
}
