//! # Graph storage
//!
//! Backend abstraction for the conversation graph:
//!
//! ```text
//! (User)-[:SENT]->(Message)-[:REPLIES_TO]->(Message)
//! (User)-[:HAD_CONVERSATION]->(ConversationSummary)<-[:PART_OF]-(Message)
//! (User)-[:KNOWS]->(User)
//! ```
//!
//! All writes go through [`GraphStore::apply`] as a [`Transaction`]: either
//! every operation lands or none does.

mod graph;
mod snapshot;

pub use graph::InMemoryGraphStore;

use crate::error::NyxResult;
use crate::memory::vector::SearchResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier of a stored message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Fresh random id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for MessageId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Stable identifier of a conversation summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SummaryId(Uuid);

impl SummaryId {
    /// Fresh random id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SummaryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SummaryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Who wrote a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// A human participant
    User,
    /// The assistant
    Bot,
}

/// A participant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserNode {
    /// Platform user id
    pub id: String,

    /// Platform display name
    pub username: String,

    /// Name the user asked to be called
    pub known_name: Option<String>,

    /// Whether this is the assistant's own identity
    pub is_bot: bool,

    /// Last time a message from this user was stored
    pub last_seen: DateTime<Utc>,
}

/// A message node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageNode {
    /// Stable id
    pub id: MessageId,

    /// Text
    pub content: String,

    /// Embedding of `content`
    pub embedding: Vec<f32>,

    /// When the message was sent
    pub timestamp: DateTime<Utc>,

    /// User or bot message
    pub kind: MessageKind,

    /// Platform message id, bound once the platform send completes
    pub platform_id: Option<String>,

    /// Channel the message was posted in
    pub channel_id: Option<String>,
}

/// A message together with its sender
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMessage {
    /// Message node
    pub message: MessageNode,

    /// Sender (source of the SENT edge)
    pub sender: UserNode,
}

/// A topic summary over a run of messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryNode {
    /// Stable id
    pub id: SummaryId,

    /// Topic label
    pub topic: String,

    /// Summary text
    pub summary: String,

    /// First covered message time
    pub start_time: DateTime<Utc>,

    /// Last covered message time
    pub end_time: DateTime<Utc>,

    /// Embedding of topic and summary
    pub embedding: Vec<f32>,
}

/// One write operation inside a [`Transaction`]
#[derive(Debug, Clone)]
pub enum WriteOp {
    /// Create the user or refresh its username and last-seen time
    UpsertUser {
        /// Platform user id
        id: String,
        /// New display name; keeps the stored one when `None`
        username: Option<String>,
        /// Bot flag
        is_bot: bool,
        /// Activity time
        seen_at: DateTime<Utc>,
    },

    /// Set the self-declared name, creating the user if needed
    SetKnownName {
        /// Platform user id
        user_id: String,
        /// Declared name
        name: String,
    },

    /// Create a message and its SENT edge
    CreateMessage {
        /// Node to insert
        message: MessageNode,
        /// Sender; must exist or be upserted earlier in the transaction
        sender_id: String,
    },

    /// REPLIES_TO between two existing messages
    LinkReply {
        /// Replying message
        from: MessageId,
        /// Message being answered
        to: MessageId,
    },

    /// REPLIES_TO to the message with this platform id; skipped when absent
    LinkReplyByPlatformId {
        /// Replying message
        from: MessageId,
        /// Platform id of the message being answered
        platform_id: String,
    },

    /// Bind the platform id of an existing message
    SetPlatformId {
        /// Message
        message_id: MessageId,
        /// Platform id
        platform_id: String,
    },

    /// Create a summary and its HAD_CONVERSATION edge
    CreateSummary {
        /// Node to insert
        summary: SummaryNode,
        /// Owning user; must exist
        user_id: String,
    },

    /// PART_OF from the message with this platform id; skipped when absent
    LinkPartOfByPlatformId {
        /// Platform id of the covered message
        platform_id: String,
        /// Summary
        summary: SummaryId,
    },

    /// KNOWS between two existing users
    LinkKnows {
        /// Source user
        from: String,
        /// Target user
        to: String,
    },
}

/// An atomic batch of graph writes
#[derive(Debug, Clone, Default)]
pub struct Transaction {
    ops: Vec<WriteOp>,
}

impl Transaction {
    /// Empty transaction
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an operation
    pub fn push(&mut self, op: WriteOp) -> &mut Self {
        self.ops.push(op);
        self
    }

    /// Builder-style append
    pub fn with(mut self, op: WriteOp) -> Self {
        self.ops.push(op);
        self
    }

    /// Operations in order
    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    /// Consume into operations
    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }

    /// Number of operations
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether there is nothing to write
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Graph backend used by [`crate::memory::MemoryStore`]
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Apply every operation or none
    async fn apply(&self, tx: Transaction) -> NyxResult<()>;

    /// Look up a user
    async fn user(&self, id: &str) -> NyxResult<Option<UserNode>>;

    /// Look up a message
    async fn message(&self, id: MessageId) -> NyxResult<Option<StoredMessage>>;

    /// Look up a message by platform id
    async fn message_by_platform_id(&self, platform_id: &str) -> NyxResult<Option<StoredMessage>>;

    /// Messages sent by a user, newest first
    async fn recent_messages_by_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> NyxResult<Vec<StoredMessage>>;

    /// Messages one REPLIES_TO hop away, in either direction
    async fn reply_neighbors(&self, id: MessageId) -> NyxResult<Vec<StoredMessage>>;

    /// Cosine-similarity search over message embeddings
    ///
    /// Keeps `score >= min_similarity`, orders by score then recency (both
    /// descending) and returns at most `limit` hits.
    async fn search_messages(
        &self,
        query: &[f32],
        min_similarity: f32,
        limit: usize,
    ) -> NyxResult<Vec<SearchResult<StoredMessage>>>;

    /// Cosine-similarity search over summary embeddings, same contract
    async fn search_summaries(
        &self,
        query: &[f32],
        min_similarity: f32,
        limit: usize,
    ) -> NyxResult<Vec<SearchResult<SummaryNode>>>;

    /// Summaries linked to a user, oldest first
    async fn summaries_for_user(&self, user_id: &str) -> NyxResult<Vec<SummaryNode>>;

    /// Messages covered by a summary, oldest first
    async fn summary_messages(&self, id: SummaryId) -> NyxResult<Vec<StoredMessage>>;

    /// Latest message time in a channel
    async fn last_message_time(&self, channel_id: &str) -> NyxResult<Option<DateTime<Utc>>>;

    /// Users this user KNOWS
    async fn known_users(&self, user_id: &str) -> NyxResult<Vec<UserNode>>;
}
