//! Chat platform integration
//!
//! The platform pushes [`InboundMessage`]s onto an [`EventQueue`]; a single
//! worker drains it in arrival order and runs [`Bot::handle`] for each
//! event, so conversation windows and graph writes never race.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nyx_core::agent::{detect_declared_name, ToolOrchestrator, TurnOutcome};
use nyx_core::memory::{MemoryStore, MessageRef, NewUserMessage};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// A message received from the chat platform
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    /// Raw text, possibly including a mention of the bot
    pub content: String,
    /// Platform user id of the author
    pub sender_id: String,
    /// Display name of the author
    pub sender_name: String,
    /// Channel (or DM channel) the message was posted in
    pub channel_id: String,
    /// Platform id of the message this one replies to
    pub reply_to_platform_id: Option<String>,
    /// Platform id of this message
    pub platform_message_id: Option<String>,
    /// When it was sent
    pub timestamp: DateTime<Utc>,
    /// Sent in a direct message channel
    pub is_direct: bool,
    /// Mentions the bot
    pub mentions_bot: bool,
}

impl InboundMessage {
    /// Message in a guild channel, sent now
    pub fn new(
        channel_id: impl Into<String>,
        sender_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let sender_id = sender_id.into();
        Self {
            content: content.into(),
            sender_name: sender_id.clone(),
            sender_id,
            channel_id: channel_id.into(),
            reply_to_platform_id: None,
            platform_message_id: None,
            timestamp: Utc::now(),
            is_direct: false,
            mentions_bot: false,
        }
    }

    /// Set the author's display name
    pub fn from_user(mut self, name: impl Into<String>) -> Self {
        self.sender_name = name.into();
        self
    }

    /// Mark as a direct message
    pub fn direct(mut self) -> Self {
        self.is_direct = true;
        self
    }

    /// Mark as mentioning the bot
    pub fn mentioning_bot(mut self) -> Self {
        self.mentions_bot = true;
        self
    }

    /// Set the platform id
    pub fn with_platform_id(mut self, platform_id: impl Into<String>) -> Self {
        self.platform_message_id = Some(platform_id.into());
        self
    }

    /// Reply to a platform message
    pub fn replying_to(mut self, platform_id: impl Into<String>) -> Self {
        self.reply_to_platform_id = Some(platform_id.into());
        self
    }
}

/// Platform-side failures
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    /// The platform rejected or dropped the message
    #[error("failed to send to channel {channel_id}: {reason}")]
    Send {
        /// Target channel
        channel_id: String,
        /// Cause
        reason: String,
    },

    /// Local IO failure
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Outbound side of a chat platform
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Post `text` to a channel, returning the platform message id
    async fn send(&self, channel_id: &str, text: &str) -> Result<String, PlatformError>;

    /// Show a typing indicator
    async fn start_typing(&self, _channel_id: &str) -> Result<(), PlatformError> {
        Ok(())
    }
}

/// Which inbound messages the bot answers
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    /// The bot's own user id; its messages are always ignored
    pub bot_id: String,
    /// Answer direct messages
    pub allow_dms: bool,
    /// Channels to listen in; empty means all
    pub allowed_channel_ids: HashSet<String>,
    /// Users to ignore
    pub blocked_user_ids: HashSet<String>,
}

impl AccessPolicy {
    /// Whether `message` should be answered
    ///
    /// Outside direct messages the bot must be mentioned. Direct messages
    /// are governed by `allow_dms` alone and bypass `allowed_channel_ids`,
    /// since every DM lives in its own per-user channel.
    pub fn admits(&self, message: &InboundMessage) -> bool {
        if message.sender_id == self.bot_id || self.blocked_user_ids.contains(&message.sender_id) {
            return false;
        }
        if message.is_direct {
            return self.allow_dms;
        }
        if !self.allowed_channel_ids.is_empty()
            && !self.allowed_channel_ids.contains(&message.channel_id)
        {
            return false;
        }
        message.mentions_bot
    }
}

/// Strip `<@id>`, `<@!id>` and a leading `@name` mention of the bot
pub fn strip_mention(content: &str, bot_id: &str, bot_name: &str) -> String {
    let stripped = content
        .replace(&format!("<@!{bot_id}>"), "")
        .replace(&format!("<@{bot_id}>"), "");
    let trimmed = stripped.trim();

    let handle = format!("@{bot_name}");
    match trimmed.get(..handle.len()) {
        Some(prefix) if !bot_name.is_empty() && prefix.eq_ignore_ascii_case(&handle) => trimmed
            [handle.len()..]
            .trim_start_matches(|c: char| c == ',' || c == ':' || c.is_whitespace())
            .to_string(),
        _ => trimmed.to_string(),
    }
}

/// Sender half of the bot's event queue
#[derive(Debug, Clone)]
pub struct EventQueue {
    tx: mpsc::UnboundedSender<InboundMessage>,
}

impl EventQueue {
    /// Enqueue a message; `false` once the worker has stopped
    pub fn push(&self, message: InboundMessage) -> bool {
        self.tx.send(message).is_ok()
    }
}

/// Handles inbound messages end to end
pub struct Bot {
    memory: MemoryStore,
    orchestrator: ToolOrchestrator,
    access: AccessPolicy,
}

impl Bot {
    /// Create a bot
    pub fn new(memory: MemoryStore, orchestrator: ToolOrchestrator, access: AccessPolicy) -> Self {
        Self {
            memory,
            orchestrator,
            access,
        }
    }

    /// The memory store
    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }

    /// The access policy
    pub fn access(&self) -> &AccessPolicy {
        &self.access
    }

    /// Answer one inbound message
    ///
    /// Returns `None` when the message was filtered out. Storage failures
    /// are logged and do not prevent the reply from being sent.
    pub async fn handle(
        &self,
        platform: &dyn ChatPlatform,
        message: InboundMessage,
    ) -> Option<TurnOutcome> {
        if !self.access.admits(&message) {
            debug!(
                sender_id = %message.sender_id,
                channel_id = %message.channel_id,
                "Ignoring message"
            );
            return None;
        }

        let content = strip_mention(&message.content, &self.access.bot_id, &self.memory.bot().name);
        if content.is_empty() {
            debug!(sender_id = %message.sender_id, "Ignoring empty message");
            return None;
        }

        if let Err(e) = platform.start_typing(&message.channel_id).await {
            warn!(channel_id = %message.channel_id, error = %e, "Could not start typing");
        }

        if let Some(name) = detect_declared_name(&content) {
            if let Err(e) = self.memory.update_known_name(&message.sender_id, &name).await {
                error!(user_id = %message.sender_id, error = %e, "Failed to store declared name");
            }
        }

        let outcome = self
            .orchestrator
            .respond(&message.channel_id, &message.sender_id, &content)
            .await;

        let stored = self.store_user_message(&message, &content).await;

        let sent = match platform.send(&message.channel_id, outcome.text()).await {
            Ok(platform_id) => platform_id,
            Err(e) => {
                error!(channel_id = %message.channel_id, error = %e, "Failed to send reply");
                return Some(outcome);
            }
        };

        if let (true, Some(user_message)) = (outcome.is_reply(), stored) {
            if let Err(e) = self
                .memory
                .store_bot_response(outcome.text(), user_message.id, Some(sent))
                .await
            {
                error!(reply_to = %user_message.id, error = %e, "Failed to store bot response");
            }
        }

        info!(
            user_id = %message.sender_id,
            channel_id = %message.channel_id,
            replied = outcome.is_reply(),
            "Handled message"
        );
        Some(outcome)
    }

    async fn store_user_message(&self, message: &InboundMessage, content: &str) -> Option<MessageRef> {
        let mut new = NewUserMessage::new(&message.sender_id, content)
            .with_username(&message.sender_name)
            .in_channel(&message.channel_id)
            .at(message.timestamp);
        if let Some(platform_id) = &message.platform_message_id {
            new = new.with_platform_id(platform_id);
        }
        if let Some(reply_to) = &message.reply_to_platform_id {
            new = new.replying_to(reply_to);
        }

        match self.memory.store_user_message(new).await {
            Ok(stored) => Some(stored),
            Err(e) => {
                error!(user_id = %message.sender_id, error = %e, "Failed to store user message");
                None
            }
        }
    }

    /// Start the single worker draining the event queue
    ///
    /// The worker stops once every [`EventQueue`] clone is dropped and the
    /// queue is empty.
    pub fn spawn(self: Arc<Self>, platform: Arc<dyn ChatPlatform>) -> (EventQueue, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<InboundMessage>();

        let worker = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                self.handle(platform.as_ref(), message).await;
            }
            debug!("Event queue closed");
        });

        (EventQueue { tx }, worker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> AccessPolicy {
        AccessPolicy {
            bot_id: "99".into(),
            allow_dms: true,
            allowed_channel_ids: HashSet::from(["7".to_string()]),
            blocked_user_ids: HashSet::from(["13".to_string()]),
        }
    }

    #[test]
    fn test_access_policy() {
        let policy = policy();
        assert!(policy.admits(&InboundMessage::new("7", "42", "hi").mentioning_bot()));
        assert!(!policy.admits(&InboundMessage::new("7", "42", "hi")));
        assert!(!policy.admits(&InboundMessage::new("8", "42", "hi").mentioning_bot()));
        assert!(!policy.admits(&InboundMessage::new("7", "13", "hi").mentioning_bot()));
        assert!(!policy.admits(&InboundMessage::new("7", "99", "hi").mentioning_bot()));
        assert!(policy.admits(&InboundMessage::new("dm-42", "42", "hi").direct()));

        let closed = AccessPolicy {
            allow_dms: false,
            ..policy
        };
        assert!(!closed.admits(&InboundMessage::new("dm-42", "42", "hi").direct()));
    }

    #[test]
    fn test_direct_messages_skip_channel_allow_list() {
        let policy = policy();
        assert!(!policy.allowed_channel_ids.contains("dm-42"));
        assert!(policy.admits(&InboundMessage::new("dm-42", "42", "hi").direct()));
        assert!(!policy.admits(&InboundMessage::new("dm-42", "13", "hi").direct()));
    }

    #[test]
    fn test_strip_mention() {
        assert_eq!(strip_mention("<@99> what time is it?", "99", "Nyx"), "what time is it?");
        assert_eq!(strip_mention("hey <@!99>", "99", "Nyx"), "hey");
        assert_eq!(strip_mention("@nyx, remind me", "99", "Nyx"), "remind me");
        assert_eq!(strip_mention("ask @Nyx later", "99", "Nyx"), "ask @Nyx later");
        assert_eq!(strip_mention("<@99>", "99", "Nyx"), "");
    }
}
