use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nyx::bot::{ChatPlatform, InboundMessage, PlatformError};
use nyx::config::NyxConfig;
use nyx::runtime::Runtime;
use nyx_core::agent::LLM_FAILURE_MESSAGE;
use nyx_core::memory::{HashEmbeddingProvider, SearchResult};
use nyx_core::storage::{
    GraphStore, InMemoryGraphStore, MessageId, MessageKind, StoredMessage, SummaryId, SummaryNode,
    Transaction, UserNode, WriteOp,
};
use nyx_core::NyxResult;
use nyx_llm::{ChatCompletion, ChatMessage, ChatResponse, LlmError, LlmResult, ToolDefinition};
use parking_lot::Mutex;
use std::sync::Arc;

/// Records every known-name write on top of an in-memory graph
#[derive(Default)]
struct CountingGraph {
    inner: InMemoryGraphStore,
    known_names: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl GraphStore for CountingGraph {
    async fn apply(&self, tx: Transaction) -> NyxResult<()> {
        for op in tx.ops() {
            if let WriteOp::SetKnownName { user_id, name } = op {
                self.known_names.lock().push((user_id.clone(), name.clone()));
            }
        }
        self.inner.apply(tx).await
    }

    async fn user(&self, id: &str) -> NyxResult<Option<UserNode>> {
        self.inner.user(id).await
    }

    async fn message(&self, id: MessageId) -> NyxResult<Option<StoredMessage>> {
        self.inner.message(id).await
    }

    async fn message_by_platform_id(&self, platform_id: &str) -> NyxResult<Option<StoredMessage>> {
        self.inner.message_by_platform_id(platform_id).await
    }

    async fn recent_messages_by_user(&self, user_id: &str, limit: usize) -> NyxResult<Vec<StoredMessage>> {
        self.inner.recent_messages_by_user(user_id, limit).await
    }

    async fn reply_neighbors(&self, id: MessageId) -> NyxResult<Vec<StoredMessage>> {
        self.inner.reply_neighbors(id).await
    }

    async fn search_messages(
        &self,
        query: &[f32],
        min_similarity: f32,
        limit: usize,
    ) -> NyxResult<Vec<SearchResult<StoredMessage>>> {
        self.inner.search_messages(query, min_similarity, limit).await
    }

    async fn search_summaries(
        &self,
        query: &[f32],
        min_similarity: f32,
        limit: usize,
    ) -> NyxResult<Vec<SearchResult<SummaryNode>>> {
        self.inner.search_summaries(query, min_similarity, limit).await
    }

    async fn summaries_for_user(&self, user_id: &str) -> NyxResult<Vec<SummaryNode>> {
        self.inner.summaries_for_user(user_id).await
    }

    async fn summary_messages(&self, id: SummaryId) -> NyxResult<Vec<StoredMessage>> {
        self.inner.summary_messages(id).await
    }

    async fn last_message_time(&self, channel_id: &str) -> NyxResult<Option<DateTime<Utc>>> {
        self.inner.last_message_time(channel_id).await
    }

    async fn known_users(&self, user_id: &str) -> NyxResult<Vec<UserNode>> {
        self.inner.known_users(user_id).await
    }
}

/// Answers with a fixed text, or fails when `fail` is set
struct CannedModel {
    reply: String,
    fail: bool,
}

#[async_trait]
impl ChatCompletion for CannedModel {
    async fn chat_completion_with_tools(
        &self,
        _messages: &[ChatMessage],
        _tools: Option<&[ToolDefinition]>,
    ) -> LlmResult<ChatResponse> {
        if self.fail {
            return Err(LlmError::Api {
                status: 503,
                body: "model loading".into(),
            });
        }
        Ok(ChatResponse::text(self.reply.clone()))
    }
}

/// Records what was sent and hands out sequential ids
#[derive(Default)]
struct RecordingPlatform {
    sent: Mutex<Vec<(String, String)>>,
    typing: Mutex<Vec<String>>,
}

#[async_trait]
impl ChatPlatform for RecordingPlatform {
    async fn send(&self, channel_id: &str, text: &str) -> Result<String, PlatformError> {
        let mut sent = self.sent.lock();
        sent.push((channel_id.to_string(), text.to_string()));
        Ok(format!("out-{}", sent.len()))
    }

    async fn start_typing(&self, channel_id: &str) -> Result<(), PlatformError> {
        self.typing.lock().push(channel_id.to_string());
        Ok(())
    }
}

fn runtime(graph: Arc<dyn GraphStore>, model: CannedModel) -> Runtime {
    let config = NyxConfig {
        bot_id: "99".into(),
        allowed_channel_ids: vec!["7".into()],
        ..NyxConfig::default()
    };
    Runtime::build(
        config,
        Arc::new(model),
        graph,
        Arc::new(HashEmbeddingProvider::new(64)),
    )
}

fn canned(reply: &str) -> CannedModel {
    CannedModel {
        reply: reply.into(),
        fail: false,
    }
}

#[tokio::test]
async fn test_declared_name_is_stored_once() {
    let graph = Arc::new(CountingGraph::default());
    let rt = runtime(graph.clone(), canned("Nice to meet you, Alex!"));
    let platform = RecordingPlatform::default();

    let message = InboundMessage::new("7", "42", "<@99> my name is Alex")
        .from_user("a1ex")
        .mentioning_bot()
        .with_platform_id("in-1");
    let outcome = rt.bot.handle(&platform, message).await.unwrap();

    assert!(outcome.is_reply());
    assert_eq!(
        *graph.known_names.lock(),
        vec![("42".to_string(), "Alex".to_string())]
    );
    assert_eq!(
        rt.memory.user("42").await.unwrap().unwrap().known_name.as_deref(),
        Some("Alex")
    );
}

#[tokio::test]
async fn test_reply_is_sent_and_both_messages_stored() {
    let graph = Arc::new(InMemoryGraphStore::new());
    let rt = runtime(graph.clone(), canned("Sure thing."));
    let platform = RecordingPlatform::default();

    let message = InboundMessage::new("7", "42", "<@99> remind me about the refund")
        .mentioning_bot()
        .with_platform_id("in-1");
    rt.bot.handle(&platform, message).await.unwrap();

    assert_eq!(*platform.typing.lock(), vec!["7".to_string()]);
    assert_eq!(
        *platform.sent.lock(),
        vec![("7".to_string(), "Sure thing.".to_string())]
    );

    let user_message = graph.message_by_platform_id("in-1").await.unwrap().unwrap();
    assert_eq!(user_message.message.content, "remind me about the refund");

    let reply = graph.message_by_platform_id("out-1").await.unwrap().unwrap();
    assert_eq!(reply.sender.id, "99");
    assert!(reply.sender.is_bot);
    assert_eq!(reply.message.channel_id.as_deref(), Some("7"));

    let neighbors = graph.reply_neighbors(user_message.message.id).await.unwrap();
    assert_eq!(neighbors.len(), 1);
    assert_eq!(neighbors[0].message.id, reply.message.id);
}

#[tokio::test]
async fn test_fallback_is_sent_but_not_stored() {
    let graph = Arc::new(InMemoryGraphStore::new());
    let rt = runtime(
        graph.clone(),
        CannedModel {
            reply: String::new(),
            fail: true,
        },
    );
    let platform = RecordingPlatform::default();

    let outcome = rt
        .bot
        .handle(&platform, InboundMessage::new("dm-42", "42", "hello").direct())
        .await
        .unwrap();

    assert_eq!(outcome.text(), LLM_FAILURE_MESSAGE);
    assert_eq!(platform.sent.lock().len(), 1);
    assert_eq!(graph.message_count(), 1);
    assert!(graph.message_by_platform_id("out-1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_filtered_messages_are_ignored() {
    let graph = Arc::new(InMemoryGraphStore::new());
    let rt = runtime(graph.clone(), canned("hi"));
    let platform = RecordingPlatform::default();

    assert!(rt.bot.handle(&platform, InboundMessage::new("7", "42", "no mention")).await.is_none());
    assert!(rt
        .bot
        .handle(&platform, InboundMessage::new("8", "42", "<@99> wrong channel").mentioning_bot())
        .await
        .is_none());
    assert!(rt
        .bot
        .handle(&platform, InboundMessage::new("7", "99", "talking to myself").mentioning_bot())
        .await
        .is_none());

    assert!(platform.sent.lock().is_empty());
    assert_eq!(graph.message_count(), 0);
}

#[tokio::test]
async fn test_queue_processes_events_in_order() {
    let graph = Arc::new(InMemoryGraphStore::new());
    let rt = runtime(graph.clone(), canned("ok"));
    let platform = Arc::new(RecordingPlatform::default());

    let start = Utc::now() - chrono::Duration::hours(1);

    let (queue, worker) = rt.bot.clone().spawn(platform.clone());
    for i in 0..3 {
        let mut message = InboundMessage::new("7", "42", format!("<@99> question {i}"))
            .mentioning_bot()
            .with_platform_id(format!("in-{i}"));
        message.timestamp = start + chrono::Duration::seconds(i);
        assert!(queue.push(message));
    }
    drop(queue);
    worker.await.unwrap();

    assert_eq!(platform.sent.lock().len(), 3);
    assert_eq!(graph.message_count(), 6);

    let window = rt.bot.memory().graph().recent_messages_by_user("42", 10).await.unwrap();
    let mut contents: Vec<String> = window.into_iter().map(|m| m.message.content).collect();
    contents.reverse();
    assert_eq!(contents, vec!["question 0", "question 1", "question 2"]);

    let first_reply = graph.message_by_platform_id("out-1").await.unwrap().unwrap();
    assert_eq!(first_reply.message.kind, MessageKind::Bot);
    let answered = graph.reply_neighbors(first_reply.message.id).await.unwrap();
    assert_eq!(answered[0].message.content, "question 0");
}
