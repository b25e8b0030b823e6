use async_trait::async_trait;
use nyx_core::agent::{
    AgentConfig, ContextAssembler, ContextStore, FallbackReason, ToolKit, ToolOrchestrator,
    TurnOutcome, TURN_LIMIT_MESSAGE,
};
use nyx_core::memory::{
    BotIdentity, ChainConfig, ConversationChainResolver, HashEmbeddingProvider, MemoryStore,
    NewUserMessage,
};
use nyx_core::storage::InMemoryGraphStore;
use nyx_llm::{
    ChatCompletion, ChatMessage, ChatResponse, LlmResult, MessageRole, ToolCall, ToolDefinition,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Asks for the clock on every call
#[derive(Default)]
struct AlwaysTools {
    calls: AtomicUsize,
}

#[async_trait]
impl ChatCompletion for AlwaysTools {
    async fn chat_completion_with_tools(
        &self,
        _messages: &[ChatMessage],
        _tools: Option<&[ToolDefinition]>,
    ) -> LlmResult<ChatResponse> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ChatResponse::with_tool_calls(vec![ToolCall::function(
            format!("call_{n}"),
            "get_current_time",
            "{}",
        )]))
    }
}

/// Echoes the last user message and records prompt sizes
#[derive(Default)]
struct Echo {
    prompt_sizes: parking_lot::Mutex<Vec<usize>>,
}

#[async_trait]
impl ChatCompletion for Echo {
    async fn chat_completion_with_tools(
        &self,
        messages: &[ChatMessage],
        _tools: Option<&[ToolDefinition]>,
    ) -> LlmResult<ChatResponse> {
        self.prompt_sizes.lock().push(messages.len());
        let last = messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
            .and_then(|m| m.content.clone())
            .unwrap_or_default();
        Ok(ChatResponse::text(format!("echo: {last}")))
    }
}

struct Harness {
    orchestrator: ToolOrchestrator,
    memory: MemoryStore,
}

fn harness(llm: Arc<dyn ChatCompletion>, config: AgentConfig) -> Harness {
    let graph = Arc::new(InMemoryGraphStore::new());
    let memory = MemoryStore::new(
        graph.clone(),
        Arc::new(HashEmbeddingProvider::new(64)),
        BotIdentity::new("bot", "Nyx"),
    );
    let assembler = ContextAssembler::new(
        Arc::new(ContextStore::new(config.window_size, config.max_conversations)),
        ConversationChainResolver::new(graph, ChainConfig::default()),
        config.clone(),
    );
    let orchestrator =
        ToolOrchestrator::new(llm, assembler, ToolKit::new(memory.clone(), config.clone()), config);
    Harness {
        orchestrator,
        memory,
    }
}

#[tokio::test]
async fn test_tool_loop_terminates_at_turn_bound() {
    let llm = Arc::new(AlwaysTools::default());
    let config = AgentConfig::default()
        .with_max_turns(3)
        .with_tools_on_first_message(true);
    let h = harness(llm.clone(), config);

    let outcome = h.orchestrator.respond("7", "42", "what time is it?").await;

    assert_eq!(
        outcome,
        TurnOutcome::Fallback {
            reason: FallbackReason::TurnLimit,
            message: TURN_LIMIT_MESSAGE.to_string(),
        }
    );
    assert_eq!(llm.calls.load(Ordering::SeqCst), 3);
    assert!(h.orchestrator.assembler().store().snapshot("7").is_empty());
}

#[tokio::test]
async fn test_window_keeps_last_entries_across_turns() {
    let llm = Arc::new(Echo::default());
    let h = harness(llm.clone(), AgentConfig::default().with_window_size(4));

    for i in 0..5 {
        let outcome = h.orchestrator.respond("7", "42", &format!("message {i}")).await;
        assert_eq!(outcome.text(), format!("echo: message {i}"));
    }

    let window = h.orchestrator.assembler().store().snapshot("7");
    let contents: Vec<&str> = window
        .iter()
        .map(|m| m.content.as_deref().unwrap_or_default())
        .collect();
    assert_eq!(
        contents,
        vec!["message 3", "echo: message 3", "message 4", "echo: message 4"]
    );
    // system + window + new user message, capped by the window
    assert_eq!(*llm.prompt_sizes.lock(), vec![2, 4, 6, 6, 6]);
}

#[tokio::test]
async fn test_window_is_seeded_from_stored_history() {
    let llm = Arc::new(Echo::default());
    let h = harness(llm.clone(), AgentConfig::default());

    let first = h
        .memory
        .store_user_message(NewUserMessage::new("42", "my parcel is late"))
        .await
        .unwrap();
    h.memory
        .store_bot_response("sorry to hear that", first.id, None)
        .await
        .unwrap();

    h.orchestrator.respond("7", "42", "any news?").await;

    let window = h.orchestrator.assembler().store().snapshot("7");
    let roles: Vec<MessageRole> = window.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![
            MessageRole::User,
            MessageRole::Assistant,
            MessageRole::User,
            MessageRole::Assistant
        ]
    );
    assert_eq!(window[0].content.as_deref(), Some("my parcel is late"));
    assert_eq!(*llm.prompt_sizes.lock(), vec![4]);
}
