//! Bounded tool-calling loop for one user turn
//!
//! The turn is an explicit state machine:
//!
//! ```text
//! Requesting --(tool calls)--> Executing --> Requesting
//!      |                                         |
//!      +--(content | error | turn limit)--> Done <+
//! ```
//!
//! Every chat completion call counts as one turn; once `max_turns` calls
//! have been made the loop ends with a fallback even if the model keeps
//! asking for tools.

use super::config::AgentConfig;
use super::context::ContextAssembler;
use super::tools::ToolKit;
use crate::error::{with_timeout, NyxError, NyxResult};
use nyx_llm::{ChatCompletion, ChatMessage, ChatResponse, ToolCall, ToolDefinition};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Reply sent when the model could not be reached or answered garbage
pub const LLM_FAILURE_MESSAGE: &str = "Sorry, I encountered an error while processing your message.";

/// Reply sent when the model kept calling tools past the turn bound
pub const TURN_LIMIT_MESSAGE: &str =
    "Sorry, I got stuck looking things up for that one. Could you ask again?";

/// Why a turn ended without a model reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    /// Chat completion failed or timed out
    LlmFailure,
    /// `max_turns` exhausted while the model was still calling tools
    TurnLimit,
}

/// Result of a user turn
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// The model answered
    Reply {
        /// Assistant text
        content: String,
        /// Chat completion calls used
        turns: usize,
    },
    /// A fixed message replaces the model's answer
    Fallback {
        /// Cause
        reason: FallbackReason,
        /// User-visible text
        message: String,
    },
}

impl TurnOutcome {
    fn fallback(reason: FallbackReason) -> Self {
        let message = match reason {
            FallbackReason::LlmFailure => LLM_FAILURE_MESSAGE,
            FallbackReason::TurnLimit => TURN_LIMIT_MESSAGE,
        };
        Self::Fallback {
            reason,
            message: message.to_string(),
        }
    }

    /// Text to send to the user
    pub fn text(&self) -> &str {
        match self {
            Self::Reply { content, .. } => content,
            Self::Fallback { message, .. } => message,
        }
    }

    /// Whether the model produced the text
    pub fn is_reply(&self) -> bool {
        matches!(self, Self::Reply { .. })
    }
}

/// Where a turn currently is
#[derive(Debug, Clone, PartialEq)]
pub enum TurnState {
    /// Waiting on a chat completion
    Requesting,
    /// Running the tool calls from the last response
    Executing(Vec<ToolCall>),
    /// Finished
    Done(TurnOutcome),
}

/// Drives one user turn against a chat completion backend
#[derive(Clone)]
pub struct ToolOrchestrator {
    llm: Arc<dyn ChatCompletion>,
    assembler: ContextAssembler,
    tools: ToolKit,
    config: AgentConfig,
}

impl ToolOrchestrator {
    /// Create an orchestrator
    pub fn new(
        llm: Arc<dyn ChatCompletion>,
        assembler: ContextAssembler,
        tools: ToolKit,
        config: AgentConfig,
    ) -> Self {
        Self {
            llm,
            assembler,
            tools,
            config,
        }
    }

    /// The context assembler
    pub fn assembler(&self) -> &ContextAssembler {
        &self.assembler
    }

    async fn request(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[ToolDefinition]>,
    ) -> NyxResult<ChatResponse> {
        with_timeout("chat_completion", self.config.capability_timeout, async {
            self.llm
                .chat_completion_with_tools(messages, tools)
                .await
                .map_err(|e| NyxError::llm("chat_completion", e))
        })
        .await
    }

    /// Answer `message` in `conversation_id` on behalf of `user_id`
    ///
    /// Replies are appended to the conversation window together with the
    /// user message; fallbacks leave the window untouched.
    pub async fn respond(&self, conversation_id: &str, user_id: &str, message: &str) -> TurnOutcome {
        let store = self.assembler.store();
        let mut messages = self.assembler.assemble(conversation_id, user_id, message).await;

        let first_reply = !store.first_reply_sent(conversation_id);
        let definitions = if first_reply && !self.config.tools_on_first_message {
            None
        } else {
            Some(self.tools.definitions())
        };

        let mut turns = 0;
        let mut state = TurnState::Requesting;
        let outcome = loop {
            state = match state {
                TurnState::Requesting if turns >= self.config.max_turns => {
                    error!(
                        conversation_id,
                        max_turns = self.config.max_turns,
                        "Model kept calling tools past the turn bound"
                    );
                    TurnState::Done(TurnOutcome::fallback(FallbackReason::TurnLimit))
                }
                TurnState::Requesting => {
                    turns += 1;
                    debug!(conversation_id, turn = turns, messages = messages.len(), "Requesting completion");

                    match self.request(&messages, definitions.as_deref()).await {
                        Ok(response) => self.next_state(response, definitions.is_some(), turns),
                        Err(e) => {
                            warn!(
                                conversation_id,
                                turn = turns,
                                transient = e.is_transient(),
                                error = %e,
                                "Chat completion failed"
                            );
                            TurnState::Done(TurnOutcome::fallback(FallbackReason::LlmFailure))
                        }
                    }
                }
                TurnState::Executing(calls) => {
                    info!(
                        conversation_id,
                        turn = turns,
                        tools = ?calls.iter().map(|c| &c.function.name).collect::<Vec<_>>(),
                        "Executing tool calls"
                    );
                    messages.push(ChatMessage::assistant_tool_calls(calls.clone()));
                    for call in &calls {
                        let payload = self.tools.execute(call).await;
                        messages.push(ChatMessage::tool(
                            &call.id,
                            &call.function.name,
                            payload.to_string(),
                        ));
                    }
                    TurnState::Requesting
                }
                TurnState::Done(outcome) => break outcome,
            };
        };

        if let TurnOutcome::Reply { content, turns } = &outcome {
            store.append(conversation_id, ChatMessage::user(message));
            store.append(conversation_id, ChatMessage::assistant(content));
            store.mark_first_reply_sent(conversation_id);
            info!(conversation_id, user_id, turns, "Turn complete");
        }
        outcome
    }

    fn next_state(&self, response: ChatResponse, tools_offered: bool, turns: usize) -> TurnState {
        match response.tool_calls {
            // Calls to tools that were not offered are ignored
            Some(calls) if tools_offered && !calls.is_empty() => TurnState::Executing(calls),
            _ if response.content.trim().is_empty() => {
                warn!(turn = turns, "Model returned neither text nor tool calls");
                TurnState::Done(TurnOutcome::fallback(FallbackReason::LlmFailure))
            }
            _ => TurnState::Done(TurnOutcome::Reply {
                content: response.content,
                turns,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::context::ContextStore;
    use crate::memory::{BotIdentity, ChainConfig, ConversationChainResolver, HashEmbeddingProvider, MemoryStore};
    use crate::storage::InMemoryGraphStore;
    use async_trait::async_trait;
    use nyx_llm::{LlmError, LlmResult};
    use parking_lot::Mutex;

    /// Replays scripted responses and records what it was sent
    struct Scripted {
        responses: Mutex<Vec<LlmResult<ChatResponse>>>,
        seen_tools: Mutex<Vec<bool>>,
    }

    impl Scripted {
        fn new(mut responses: Vec<LlmResult<ChatResponse>>) -> Arc<Self> {
            responses.reverse();
            Arc::new(Self {
                responses: Mutex::new(responses),
                seen_tools: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ChatCompletion for Scripted {
        async fn chat_completion_with_tools(
            &self,
            _messages: &[ChatMessage],
            tools: Option<&[ToolDefinition]>,
        ) -> LlmResult<ChatResponse> {
            self.seen_tools.lock().push(tools.is_some());
            self.responses
                .lock()
                .pop()
                .unwrap_or_else(|| Ok(ChatResponse::text("out of script")))
        }
    }

    fn orchestrator(llm: Arc<dyn ChatCompletion>, config: AgentConfig) -> ToolOrchestrator {
        let graph = Arc::new(InMemoryGraphStore::new());
        let memory = MemoryStore::new(
            graph.clone(),
            Arc::new(HashEmbeddingProvider::new(32)),
            BotIdentity::new("bot", "Nyx"),
        );
        let assembler = ContextAssembler::new(
            Arc::new(ContextStore::new(config.window_size, config.max_conversations)),
            ConversationChainResolver::new(graph, ChainConfig::default()),
            config.clone(),
        );
        ToolOrchestrator::new(llm, assembler, ToolKit::new(memory, config.clone()), config)
    }

    fn time_call() -> ChatResponse {
        ChatResponse::with_tool_calls(vec![ToolCall::function("c1", "get_current_time", "{}")])
    }

    #[tokio::test]
    async fn test_tools_withheld_on_first_reply() {
        let llm = Scripted::new(vec![
            Ok(ChatResponse::text("hello!")),
            Ok(time_call()),
            Ok(ChatResponse::text("it is noon")),
        ]);
        let orch = orchestrator(llm.clone(), AgentConfig::default());

        let first = orch.respond("7", "42", "hi").await;
        assert_eq!(first.text(), "hello!");

        let second = orch.respond("7", "42", "what time is it?").await;
        assert_eq!(second, TurnOutcome::Reply { content: "it is noon".into(), turns: 2 });
        assert_eq!(*llm.seen_tools.lock(), vec![false, true, true]);

        let window = orch.assembler().store().snapshot("7");
        assert_eq!(window.len(), 4);
    }

    #[tokio::test]
    async fn test_llm_error_is_fallback_and_not_remembered() {
        let llm = Scripted::new(vec![Err(LlmError::Api {
            status: 500,
            body: "boom".into(),
        })]);
        let orch = orchestrator(llm, AgentConfig::default());

        let outcome = orch.respond("7", "42", "hi").await;
        assert_eq!(outcome.text(), LLM_FAILURE_MESSAGE);
        assert!(!outcome.is_reply());
        assert!(orch.assembler().store().snapshot("7").is_empty());
        assert!(!orch.assembler().store().first_reply_sent("7"));
    }

    #[tokio::test]
    async fn test_unoffered_tool_calls_are_ignored() {
        let mut response = time_call();
        response.content = "hi there".into();
        let orch = orchestrator(Scripted::new(vec![Ok(response)]), AgentConfig::default());

        let outcome = orch.respond("7", "42", "hi").await;
        assert_eq!(outcome.text(), "hi there");
    }
}
