//! Memory store: the single writer of the conversation graph
//!
//! Every public write is built as one [`Transaction`] so that a message, its
//! sender and its reply edge (or a summary and its coverage edges) land
//! together or not at all.

use super::segment::ConversationSegment;
use super::vector::EmbeddingProvider;
use crate::error::{with_timeout, NyxError, NyxResult};
use crate::storage::{
    GraphStore, MessageId, MessageKind, MessageNode, StoredMessage, SummaryId, SummaryNode,
    Transaction, UserNode, WriteOp,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Similarity floor used by [`MemoryStore::relevant_summaries`]
pub const DEFAULT_SUMMARY_MIN_SIMILARITY: f32 = 0.5;

/// Platform identity used as the sender of bot responses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotIdentity {
    /// Platform user id of the bot
    pub id: String,

    /// Display name of the bot
    pub name: String,
}

impl BotIdentity {
    /// Create an identity
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// An inbound user message to persist
#[derive(Debug, Clone)]
pub struct NewUserMessage {
    /// Text
    pub content: String,

    /// Platform user id of the sender
    pub user_id: String,

    /// Platform display name, if known
    pub username: Option<String>,

    /// Platform id of the message this one answers
    pub reply_to_platform_id: Option<String>,

    /// Platform id of this message
    pub platform_message_id: Option<String>,

    /// Channel it was posted in
    pub channel_id: Option<String>,

    /// Send time
    pub timestamp: DateTime<Utc>,
}

impl NewUserMessage {
    /// Message from `user_id` sent now
    pub fn new(user_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            user_id: user_id.into(),
            username: None,
            reply_to_platform_id: None,
            platform_message_id: None,
            channel_id: None,
            timestamp: Utc::now(),
        }
    }

    /// Set the display name
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Set the reply target
    pub fn replying_to(mut self, platform_id: impl Into<String>) -> Self {
        self.reply_to_platform_id = Some(platform_id.into());
        self
    }

    /// Set the platform message id
    pub fn with_platform_id(mut self, platform_id: impl Into<String>) -> Self {
        self.platform_message_id = Some(platform_id.into());
        self
    }

    /// Set the channel
    pub fn in_channel(mut self, channel_id: impl Into<String>) -> Self {
        self.channel_id = Some(channel_id.into());
        self
    }

    /// Override the send time
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Handle to a stored message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRef {
    /// Stable id
    pub id: MessageId,

    /// Send time
    pub timestamp: DateTime<Utc>,

    /// Platform id, if bound
    pub platform_id: Option<String>,
}

impl From<&MessageNode> for MessageRef {
    fn from(node: &MessageNode) -> Self {
        Self {
            id: node.id,
            timestamp: node.timestamp,
            platform_id: node.platform_id.clone(),
        }
    }
}

/// A message returned by similarity search
#[derive(Debug, Clone, Serialize)]
pub struct MemoryResult {
    /// Message id
    pub message_id: MessageId,

    /// Text
    pub content: String,

    /// Send time
    pub timestamp: DateTime<Utc>,

    /// Cosine similarity with the query
    pub score: f32,

    /// Sender id
    pub sender_id: String,

    /// Sender display name
    pub sender_name: String,

    /// User or bot message
    pub kind: MessageKind,
}

impl MemoryResult {
    fn from_stored(stored: StoredMessage, score: f32) -> Self {
        Self {
            message_id: stored.message.id,
            content: stored.message.content,
            timestamp: stored.message.timestamp,
            score,
            sender_id: stored.sender.id,
            sender_name: stored
                .sender
                .known_name
                .unwrap_or(stored.sender.username),
            kind: stored.message.kind,
        }
    }
}

/// Graph-backed conversational memory
#[derive(Clone)]
pub struct MemoryStore {
    graph: Arc<dyn GraphStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    bot: BotIdentity,
    embed_timeout: Duration,
    summary_min_similarity: f32,
}

impl MemoryStore {
    /// Create a store over a graph backend and an embedding provider
    pub fn new(
        graph: Arc<dyn GraphStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        bot: BotIdentity,
    ) -> Self {
        Self {
            graph,
            embedder,
            bot,
            embed_timeout: Duration::from_secs(30),
            summary_min_similarity: DEFAULT_SUMMARY_MIN_SIMILARITY,
        }
    }

    /// Deadline for each embedding call
    pub fn with_embed_timeout(mut self, timeout: Duration) -> Self {
        self.embed_timeout = timeout;
        self
    }

    /// Similarity floor for [`Self::relevant_summaries`]
    pub fn with_summary_min_similarity(mut self, min_similarity: f32) -> Self {
        self.summary_min_similarity = min_similarity;
        self
    }

    /// Read access to the graph backend
    pub fn graph(&self) -> &Arc<dyn GraphStore> {
        &self.graph
    }

    /// The bot identity used for responses
    pub fn bot(&self) -> &BotIdentity {
        &self.bot
    }

    async fn embed(&self, text: &str) -> NyxResult<Vec<f32>> {
        let embedding = with_timeout("embed", self.embed_timeout, self.embedder.embed(text))
            .await
            .map_err(|e| match e {
                NyxError::Embedding { .. } => e,
                other => NyxError::embedding(other),
            })?;
        debug!(model = %embedding.model, dimensions = embedding.dimensions, "Embedded text");
        Ok(embedding.vector)
    }

    /// Persist an inbound user message
    ///
    /// Upserts the sender, creates the message with a fresh embedding and,
    /// when the reply target is already stored, the REPLIES_TO edge.
    pub async fn store_user_message(&self, new: NewUserMessage) -> NyxResult<MessageRef> {
        let embedding = self.embed(&new.content).await?;

        let node = MessageNode {
            id: MessageId::new(),
            content: new.content,
            embedding,
            timestamp: new.timestamp,
            kind: MessageKind::User,
            platform_id: new.platform_message_id,
            channel_id: new.channel_id,
        };
        let message_ref = MessageRef::from(&node);

        let mut tx = Transaction::new();
        tx.push(WriteOp::UpsertUser {
            id: new.user_id.clone(),
            username: new.username,
            is_bot: false,
            seen_at: node.timestamp,
        });
        tx.push(WriteOp::CreateMessage {
            message: node,
            sender_id: new.user_id.clone(),
        });
        if let Some(platform_id) = new.reply_to_platform_id {
            tx.push(WriteOp::LinkReplyByPlatformId {
                from: message_ref.id,
                platform_id,
            });
        }

        self.graph.apply(tx).await?;
        info!(user_id = %new.user_id, message_id = %message_ref.id, "Stored user message");
        Ok(message_ref)
    }

    /// Persist a bot response to a stored message
    ///
    /// The response inherits the channel of the message it answers.
    pub async fn store_bot_response(
        &self,
        content: impl Into<String>,
        reply_to: MessageId,
        platform_id: Option<String>,
    ) -> NyxResult<MessageRef> {
        let content = content.into();
        let replied = self.graph.message(reply_to).await?.ok_or_else(|| {
            NyxError::constraint("reply_endpoints", format!("unknown message {reply_to}"))
        })?;
        let embedding = self.embed(&content).await?;

        let node = MessageNode {
            id: MessageId::new(),
            content,
            embedding,
            // Strictly after the message it answers so chains order correctly
            timestamp: Utc::now().max(replied.message.timestamp + chrono::Duration::milliseconds(1)),
            kind: MessageKind::Bot,
            platform_id,
            channel_id: replied.message.channel_id,
        };
        let message_ref = MessageRef::from(&node);

        let tx = Transaction::new()
            .with(WriteOp::UpsertUser {
                id: self.bot.id.clone(),
                username: Some(self.bot.name.clone()),
                is_bot: true,
                seen_at: node.timestamp,
            })
            .with(WriteOp::CreateMessage {
                message: node,
                sender_id: self.bot.id.clone(),
            })
            .with(WriteOp::LinkReply {
                from: message_ref.id,
                to: reply_to,
            });

        self.graph.apply(tx).await?;
        info!(message_id = %message_ref.id, %reply_to, "Stored bot response");
        Ok(message_ref)
    }

    /// Bind the platform id of a message once the platform send completed
    pub async fn set_platform_id(
        &self,
        message_id: MessageId,
        platform_id: impl Into<String>,
    ) -> NyxResult<()> {
        let platform_id = platform_id.into();
        self.graph
            .apply(Transaction::new().with(WriteOp::SetPlatformId {
                message_id,
                platform_id,
            }))
            .await
    }

    /// Messages similar to `query`, best first
    pub async fn search(
        &self,
        query: &str,
        min_similarity: f32,
        limit: usize,
    ) -> NyxResult<Vec<MemoryResult>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let vector = self.embed(query).await?;
        let hits = self
            .graph
            .search_messages(&vector, min_similarity, limit)
            .await?;

        debug!(hits = hits.len(), min_similarity, limit, "Memory search");
        Ok(hits
            .into_iter()
            .map(|hit| MemoryResult::from_stored(hit.item, hit.score))
            .collect())
    }

    /// Persist a summarized segment for a user
    ///
    /// Covered messages are matched by platform id; those not stored yet are
    /// skipped.
    pub async fn store_conversation_summary(
        &self,
        user_id: &str,
        segment: &ConversationSegment,
    ) -> NyxResult<SummaryNode> {
        let summary = segment.summary.clone().ok_or_else(|| {
            NyxError::validation("segment.summary", "must be set before storing", "None")
        })?;
        let embedding = self
            .embed(&format!("{}: {}", segment.topic, summary))
            .await?;

        let node = SummaryNode {
            id: SummaryId::new(),
            topic: segment.topic.clone(),
            summary,
            start_time: segment.start_time,
            end_time: segment.end_time,
            embedding,
        };

        let mut tx = Transaction::new().with(WriteOp::CreateSummary {
            summary: node.clone(),
            user_id: user_id.to_string(),
        });
        for platform_id in segment.messages.iter().filter_map(|m| m.platform_id.clone()) {
            tx.push(WriteOp::LinkPartOfByPlatformId {
                platform_id,
                summary: node.id,
            });
        }

        self.graph.apply(tx).await?;
        info!(user_id, summary_id = %node.id, topic = %node.topic, "Stored conversation summary");
        Ok(node)
    }

    /// Summaries similar to `query` above the summary similarity floor
    pub async fn relevant_summaries(
        &self,
        query: &str,
        limit: usize,
    ) -> NyxResult<Vec<(SummaryNode, f32)>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let vector = self.embed(query).await?;
        let hits = self
            .graph
            .search_summaries(&vector, self.summary_min_similarity, limit)
            .await?;
        Ok(hits.into_iter().map(|hit| (hit.item, hit.score)).collect())
    }

    /// Record the name a user asked to be called
    pub async fn update_known_name(&self, user_id: &str, name: &str) -> NyxResult<()> {
        self.graph
            .apply(Transaction::new().with(WriteOp::SetKnownName {
                user_id: user_id.to_string(),
                name: name.to_string(),
            }))
            .await?;
        info!(user_id, name, "Updated known name");
        Ok(())
    }

    /// Latest message time in a channel
    pub async fn last_interaction_time(&self, channel_id: &str) -> NyxResult<Option<DateTime<Utc>>> {
        self.graph.last_message_time(channel_id).await
    }

    /// Users this user knows
    pub async fn known_users(&self, user_id: &str) -> NyxResult<Vec<UserNode>> {
        self.graph.known_users(user_id).await
    }

    /// Look up a user
    pub async fn user(&self, user_id: &str) -> NyxResult<Option<UserNode>> {
        self.graph.user(user_id).await
    }

    /// Stored summaries of a user, oldest first
    pub async fn summaries_for_user(&self, user_id: &str) -> NyxResult<Vec<SummaryNode>> {
        self.graph.summaries_for_user(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::segment::SegmentMessage;
    use crate::memory::vector::HashEmbeddingProvider;
    use crate::storage::InMemoryGraphStore;
    use chrono::TimeZone;

    fn store() -> MemoryStore {
        MemoryStore::new(
            Arc::new(InMemoryGraphStore::new()),
            Arc::new(HashEmbeddingProvider::new(64)),
            BotIdentity::new("bot", "Nyx"),
        )
    }

    #[tokio::test]
    async fn test_reply_edge_created_when_target_exists() {
        let store = store();
        let a = store
            .store_user_message(NewUserMessage::new("42", "first").with_platform_id("p1"))
            .await
            .unwrap();
        let b = store
            .store_user_message(NewUserMessage::new("42", "second").replying_to("p1"))
            .await
            .unwrap();

        let neighbors = store.graph().reply_neighbors(a.id).await.unwrap();
        assert_eq!(neighbors.len(), 1);
        assert_eq!(neighbors[0].message.id, b.id);
    }

    #[tokio::test]
    async fn test_bot_response_inherits_channel() {
        let store = store();
        let user_msg = store
            .store_user_message(NewUserMessage::new("42", "hello").in_channel("7"))
            .await
            .unwrap();
        let reply = store
            .store_bot_response("hi there", user_msg.id, Some("p9".into()))
            .await
            .unwrap();

        let stored = store.graph().message(reply.id).await.unwrap().unwrap();
        assert_eq!(stored.message.channel_id.as_deref(), Some("7"));
        assert_eq!(stored.message.kind, MessageKind::Bot);
        assert!(stored.sender.is_bot);
        assert_eq!(store.last_interaction_time("7").await.unwrap(), Some(reply.timestamp));
    }

    #[tokio::test]
    async fn test_bot_response_to_unknown_message_fails() {
        let store = store();
        let err = store
            .store_bot_response("orphan", MessageId::new(), None)
            .await
            .unwrap_err();
        assert!(err.is_storage());
    }

    #[tokio::test]
    async fn test_known_name_is_idempotent() {
        let store = store();
        store.update_known_name("42", "Alex").await.unwrap();
        store.update_known_name("42", "Alex").await.unwrap();

        let user = store.user("42").await.unwrap().unwrap();
        assert_eq!(user.known_name.as_deref(), Some("Alex"));
    }

    #[tokio::test]
    async fn test_summary_skips_unstored_messages() {
        let store = store();
        store
            .store_user_message(NewUserMessage::new("42", "refund please").with_platform_id("p1"))
            .await
            .unwrap();

        let at = Utc.timestamp_opt(100, 0).unwrap();
        let segment = ConversationSegment {
            messages: vec![
                SegmentMessage::new("user", "refund please", at).with_platform_id("p1"),
                SegmentMessage::new("user", "still waiting", at).with_platform_id("missing"),
            ],
            topic: "refund, waiting".into(),
            start_time: at,
            end_time: at,
            summary: Some("user asked for a refund".into()),
        };

        let summary = store.store_conversation_summary("42", &segment).await.unwrap();
        let covered = store.graph().summary_messages(summary.id).await.unwrap();
        assert_eq!(covered.len(), 1);
        assert_eq!(covered[0].message.platform_id.as_deref(), Some("p1"));
        assert_eq!(store.summaries_for_user("42").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_search_with_zero_limit_is_empty() {
        let store = store();
        store
            .store_user_message(NewUserMessage::new("42", "anything"))
            .await
            .unwrap();
        assert!(store.search("anything", 0.0, 0).await.unwrap().is_empty());
    }
}
