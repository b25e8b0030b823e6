//! HTTP client for OpenAI-compatible servers

use crate::config::ClientConfig;
use crate::error::{LlmError, LlmResult};
use crate::message::{ChatMessage, ChatResponse};
use crate::tools::{ToolCall, ToolDefinition};
use crate::ChatCompletion;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

/// Chat completion and embedding client
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    config: ClientConfig,
}

#[derive(Deserialize)]
struct CompletionBody {
    #[serde(default)]
    model: String,
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Deserialize)]
struct EmbeddingBody {
    #[serde(default)]
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl Client {
    /// Create a client from an explicit configuration
    pub fn new(config: ClientConfig) -> LlmResult<Self> {
        config.validate()?;
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { http, config })
    }

    /// Create a client from `NYX_LLM_*` environment variables
    pub fn from_env() -> LlmResult<Self> {
        Self::new(ClientConfig::from_env()?)
    }

    /// Active configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Embed a single text with the configured embedding model
    pub async fn embeddings(&self, input: &str) -> LlmResult<Vec<f32>> {
        let body = json!({
            "model": self.config.embedding_model,
            "input": input,
        });

        let value = self.post("embeddings", &body).await?;
        let parsed: EmbeddingBody =
            serde_json::from_value(value).map_err(|e| LlmError::parse("embedding response", e))?;

        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| LlmError::parse("embedding response", "no data returned"))
    }

    fn request_body(&self, messages: &[ChatMessage], tools: Option<&[ToolDefinition]>) -> Value {
        let mut body = self.config.extra_parameters.clone();
        body.insert("model".to_string(), json!(self.config.model));
        body.insert("messages".to_string(), json!(messages));

        if let Some(tools) = tools.filter(|t| !t.is_empty()) {
            body.insert("tools".to_string(), json!(tools));
            body.insert("tool_choice".to_string(), json!("auto"));
        }

        Value::Object(body)
    }

    async fn post(&self, path: &str, body: &Value) -> LlmResult<Value> {
        let url = self.config.endpoint(path);
        let mut request = self.http.post(&url).json(body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout(self.config.timeout)
            } else {
                LlmError::Http(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| LlmError::parse(path, e))
    }
}

#[async_trait]
impl ChatCompletion for Client {
    async fn chat_completion_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[ToolDefinition]>,
    ) -> LlmResult<ChatResponse> {
        let body = self.request_body(messages, tools);

        debug!(
            model = %self.config.model,
            message_count = messages.len(),
            tool_count = tools.map(|t| t.len()).unwrap_or(0),
            "Sending chat completion request"
        );

        let value = self.post("chat/completions", &body).await?;
        let parsed: CompletionBody =
            serde_json::from_value(value).map_err(|e| LlmError::parse("chat completion", e))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::parse("chat completion", "response has no choices"))?;

        Ok(ChatResponse {
            content: choice.message.content.unwrap_or_default(),
            tool_calls: choice.message.tool_calls.filter(|calls| !calls.is_empty()),
            finish_reason: choice.finish_reason,
            model: parsed.model,
        })
    }
}
