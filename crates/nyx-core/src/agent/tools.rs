//! Tools the model may call during a turn
//!
//! The set is closed: a call is parsed into a [`ToolRequest`] first, and
//! anything that does not parse becomes an error payload for the model.

use super::config::AgentConfig;
use crate::error::{NyxError, NyxResult};
use crate::memory::MemoryStore;
use chrono::{DateTime, Utc};
use nyx_llm::{ToolCall, ToolDefinition};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

/// Name of the clock tool
pub const GET_CURRENT_TIME: &str = "get_current_time";

/// Name of the memory search tool
pub const SEARCH_MEMORIES: &str = "search_memories";

/// A parsed tool call
#[derive(Debug, Clone, PartialEq)]
pub enum ToolRequest {
    /// Current time and date in the configured offset
    GetCurrentTime,

    /// Similarity search over stored messages
    SearchMemories {
        /// Search text
        query: String,
        /// Floor overriding the configured default
        min_similarity: Option<f32>,
    },
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: String,
    #[serde(default, alias = "minSimilarity")]
    min_similarity: Option<f32>,
}

impl ToolRequest {
    /// Parse a tool name and its JSON argument string
    pub fn parse(name: &str, arguments: &str) -> NyxResult<Self> {
        let arguments = if arguments.trim().is_empty() { "{}" } else { arguments };

        match name {
            GET_CURRENT_TIME => Ok(Self::GetCurrentTime),
            SEARCH_MEMORIES => {
                let args: SearchArgs = serde_json::from_str(arguments)
                    .map_err(|e| NyxError::tool(name, format!("invalid arguments: {e}")))?;
                if args.query.trim().is_empty() {
                    return Err(NyxError::tool(name, "query must not be empty"));
                }
                if let Some(min) = args.min_similarity {
                    if !(0.0..=1.0).contains(&min) {
                        return Err(NyxError::tool(name, "min_similarity must be between 0 and 1"));
                    }
                }
                Ok(Self::SearchMemories {
                    query: args.query,
                    min_similarity: args.min_similarity,
                })
            }
            other => Err(NyxError::tool(other, "Unknown tool")),
        }
    }

    /// Wire name of the tool
    pub fn name(&self) -> &'static str {
        match self {
            Self::GetCurrentTime => GET_CURRENT_TIME,
            Self::SearchMemories { .. } => SEARCH_MEMORIES,
        }
    }
}

/// Schemas advertised to the model
pub fn tool_definitions(default_min_similarity: f32) -> Vec<ToolDefinition> {
    vec![
        ToolDefinition::function(
            GET_CURRENT_TIME,
            "Get the current system time",
            json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
        ),
        ToolDefinition::function(
            SEARCH_MEMORIES,
            "Search through messages with all users for additional context",
            json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Search query to find relevant memories"
                    },
                    "min_similarity": {
                        "type": "number",
                        "description": "Minimum similarity threshold (between 0 and 1)",
                        "default": default_min_similarity
                    }
                },
                "required": ["query"]
            }),
        ),
    ]
}

/// Executes tool calls against memory and the clock
#[derive(Clone)]
pub struct ToolKit {
    memory: MemoryStore,
    config: AgentConfig,
}

impl ToolKit {
    /// Toolkit backed by a memory store
    pub fn new(memory: MemoryStore, config: AgentConfig) -> Self {
        Self { memory, config }
    }

    /// Schemas for the tools this kit executes
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        tool_definitions(self.config.search_min_similarity)
    }

    /// Execute one call; failures become `{"error": ...}` payloads
    pub async fn execute(&self, call: &ToolCall) -> Value {
        self.execute_at(call, Utc::now()).await
    }

    /// [`Self::execute`] with an explicit clock
    pub async fn execute_at(&self, call: &ToolCall, now: DateTime<Utc>) -> Value {
        let result = match ToolRequest::parse(&call.function.name, &call.function.arguments) {
            Ok(request) => self.run(request, now).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(payload) => {
                debug!(tool = %call.function.name, call_id = %call.id, "Tool executed");
                payload
            }
            Err(e) => {
                warn!(tool = %call.function.name, call_id = %call.id, error = %e, "Tool call failed");
                let message = match e {
                    NyxError::ToolExecution { message, .. } => message,
                    other => other.to_string(),
                };
                json!({ "error": message })
            }
        }
    }

    /// Run a parsed request
    pub async fn run(&self, request: ToolRequest, now: DateTime<Utc>) -> NyxResult<Value> {
        match request {
            ToolRequest::GetCurrentTime => {
                let local = self.config.local_time(now);
                Ok(json!({
                    "current_time": local.format("%I:%M %p").to_string(),
                    "date": local.format("%B %d, %Y").to_string(),
                }))
            }
            ToolRequest::SearchMemories {
                query,
                min_similarity,
            } => {
                let min = min_similarity.unwrap_or(self.config.search_min_similarity);
                let hits = self
                    .memory
                    .search(&query, min, self.config.search_limit)
                    .await?;

                let memories: Vec<Value> = hits
                    .into_iter()
                    .map(|hit| {
                        json!({
                            "content": hit.content,
                            "author": hit.sender_name,
                            "timestamp": hit.timestamp.to_rfc3339(),
                            "similarity": hit.score,
                        })
                    })
                    .collect();
                Ok(json!({ "memories": memories }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{BotIdentity, HashEmbeddingProvider, NewUserMessage};
    use crate::storage::InMemoryGraphStore;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn toolkit() -> (ToolKit, MemoryStore) {
        let memory = MemoryStore::new(
            Arc::new(InMemoryGraphStore::new()),
            Arc::new(HashEmbeddingProvider::new(64)),
            BotIdentity::new("bot", "Nyx"),
        );
        (ToolKit::new(memory.clone(), AgentConfig::default()), memory)
    }

    #[test]
    fn test_parse_known_tools() {
        assert_eq!(ToolRequest::parse("get_current_time", "").unwrap(), ToolRequest::GetCurrentTime);
        assert_eq!(
            ToolRequest::parse("search_memories", r#"{"query":"refund","minSimilarity":0.7}"#).unwrap(),
            ToolRequest::SearchMemories {
                query: "refund".into(),
                min_similarity: Some(0.7)
            }
        );
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(matches!(
            ToolRequest::parse("launch_rockets", "{}"),
            Err(NyxError::ToolExecution { .. })
        ));
        assert!(ToolRequest::parse("search_memories", "{not json").is_err());
        assert!(ToolRequest::parse("search_memories", r#"{"query":""}"#).is_err());
        assert!(ToolRequest::parse("search_memories", r#"{"query":"x","min_similarity":3}"#).is_err());
    }

    #[tokio::test]
    async fn test_unknown_tool_becomes_error_payload() {
        let (kit, _) = toolkit();
        let payload = kit
            .execute(&ToolCall::function("call_1", "launch_rockets", "{}"))
            .await;
        assert_eq!(payload, json!({"error": "Unknown tool"}));
    }

    #[tokio::test]
    async fn test_current_time_payload() {
        let (kit, _) = toolkit();
        let now = Utc.with_ymd_and_hms(2024, 1, 9, 8, 7, 0).unwrap();
        let payload = kit
            .execute_at(&ToolCall::function("call_1", GET_CURRENT_TIME, "{}"), now)
            .await;
        assert_eq!(payload, json!({"current_time": "08:07 AM", "date": "January 09, 2024"}));
    }

    #[tokio::test]
    async fn test_search_payload() {
        let (kit, memory) = toolkit();
        memory
            .store_user_message(NewUserMessage::new("42", "refund policy").with_username("alex"))
            .await
            .unwrap();

        let payload = kit
            .execute(&ToolCall::function("call_1", SEARCH_MEMORIES, r#"{"query":"refund policy"}"#))
            .await;
        let memories = payload["memories"].as_array().unwrap();
        assert_eq!(memories.len(), 1);
        assert_eq!(memories[0]["author"], "alex");
    }

    #[test]
    fn test_definitions_cover_every_request() {
        let names: Vec<String> = tool_definitions(0.6)
            .into_iter()
            .map(|d| d.function.name)
            .collect();
        assert_eq!(names, vec![GET_CURRENT_TIME, SEARCH_MEMORIES]);
    }
}
