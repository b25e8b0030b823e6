//! Rolling context windows and prompt assembly
//!
//! Each conversation owns a bounded FIFO of role/content entries. Windows
//! are created on first use, seeded once from the user's conversation
//! chain, and dropped least-recently-used once more than
//! `max_conversations` exist.

use super::config::AgentConfig;
use crate::error::NyxResult;
use crate::memory::ConversationChainResolver;
use chrono::{DateTime, Utc};
use nyx_llm::ChatMessage;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};

/// Bounded FIFO of chat entries for one conversation
#[derive(Debug, Clone)]
pub struct ContextWindow {
    entries: VecDeque<ChatMessage>,
    capacity: usize,
    seeded: bool,
    first_reply_sent: bool,
}

impl ContextWindow {
    /// Empty window holding at most `capacity` entries
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            seeded: false,
            first_reply_sent: false,
        }
    }

    /// Append an entry, returning the evicted oldest one when full
    pub fn push(&mut self, entry: ChatMessage) -> Option<ChatMessage> {
        let evicted = if self.entries.len() >= self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(entry);
        evicted
    }

    /// Entries, oldest first
    pub fn entries(&self) -> impl Iterator<Item = &ChatMessage> {
        self.entries.iter()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the window is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of entries
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[derive(Debug)]
struct Slot {
    window: ContextWindow,
    last_used: u64,
}

#[derive(Debug, Default)]
struct Slots {
    windows: HashMap<String, Slot>,
    clock: u64,
}

/// All live context windows, keyed by conversation id
#[derive(Debug)]
pub struct ContextStore {
    slots: Mutex<Slots>,
    window_size: usize,
    max_conversations: usize,
}

impl ContextStore {
    /// Store creating windows of `window_size` and keeping `max_conversations`
    pub fn new(window_size: usize, max_conversations: usize) -> Self {
        Self {
            slots: Mutex::new(Slots::default()),
            window_size,
            max_conversations: max_conversations.max(1),
        }
    }

    /// Run `f` on the conversation's window, creating it if needed
    fn with_window<R>(&self, conversation_id: &str, f: impl FnOnce(&mut ContextWindow) -> R) -> R {
        let mut slots = self.slots.lock();
        slots.clock += 1;
        let now = slots.clock;

        if !slots.windows.contains_key(conversation_id) {
            if slots.windows.len() >= self.max_conversations {
                let oldest = slots
                    .windows
                    .iter()
                    .min_by_key(|(_, slot)| slot.last_used)
                    .map(|(id, _)| id.clone());
                if let Some(oldest) = oldest {
                    slots.windows.remove(&oldest);
                    debug!(conversation_id = %oldest, "Evicted context window");
                }
            }
            slots.windows.insert(
                conversation_id.to_string(),
                Slot {
                    window: ContextWindow::new(self.window_size),
                    last_used: now,
                },
            );
        }

        match slots.windows.get_mut(conversation_id) {
            Some(slot) => {
                slot.last_used = now;
                f(&mut slot.window)
            }
            // Inserted above under the same lock
            None => f(&mut ContextWindow::new(self.window_size)),
        }
    }

    /// Whether a window exists for the conversation
    pub fn contains(&self, conversation_id: &str) -> bool {
        self.slots.lock().windows.contains_key(conversation_id)
    }

    /// Number of live windows
    pub fn len(&self) -> usize {
        self.slots.lock().windows.len()
    }

    /// Whether no window exists
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the window was already seeded from history
    pub fn is_seeded(&self, conversation_id: &str) -> bool {
        self.slots
            .lock()
            .windows
            .get(conversation_id)
            .map_or(false, |slot| slot.window.seeded)
    }

    /// Seed the window once; later calls are ignored
    pub fn seed(&self, conversation_id: &str, history: impl IntoIterator<Item = ChatMessage>) -> bool {
        self.with_window(conversation_id, |window| {
            if window.seeded {
                return false;
            }
            for entry in history {
                window.push(entry);
            }
            window.seeded = true;
            true
        })
    }

    /// Append an entry to the conversation's window
    pub fn append(&self, conversation_id: &str, entry: ChatMessage) {
        self.with_window(conversation_id, |window| {
            window.push(entry);
        });
    }

    /// Copy of the window entries, oldest first
    pub fn snapshot(&self, conversation_id: &str) -> Vec<ChatMessage> {
        self.with_window(conversation_id, |window| window.entries().cloned().collect())
    }

    /// Whether the conversation already got a reply
    pub fn first_reply_sent(&self, conversation_id: &str) -> bool {
        self.slots
            .lock()
            .windows
            .get(conversation_id)
            .map_or(false, |slot| slot.window.first_reply_sent)
    }

    /// Record that the conversation got a reply
    pub fn mark_first_reply_sent(&self, conversation_id: &str) {
        self.with_window(conversation_id, |window| window.first_reply_sent = true);
    }
}

/// Builds the message array for one chat completion call
#[derive(Clone)]
pub struct ContextAssembler {
    store: Arc<ContextStore>,
    resolver: ConversationChainResolver,
    config: AgentConfig,
}

impl ContextAssembler {
    /// Assembler over a context store and chain resolver
    pub fn new(
        store: Arc<ContextStore>,
        resolver: ConversationChainResolver,
        config: AgentConfig,
    ) -> Self {
        Self {
            store,
            resolver,
            config,
        }
    }

    /// The context store
    pub fn store(&self) -> &Arc<ContextStore> {
        &self.store
    }

    /// The configuration in use
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// System entry text for `now`
    pub fn system_prompt_at(&self, now: DateTime<Utc>) -> String {
        format!(
            "{}\nCurrent time: {}",
            self.config.system_prompt,
            self.config.local_time(now).format("%B %d %Y %I:%M %p")
        )
    }

    /// Seed the conversation's window from the user's chain on first use
    ///
    /// A failed chain lookup leaves the window unseeded so the next turn
    /// retries.
    pub async fn ensure_seeded(&self, conversation_id: &str, user_id: &str) -> NyxResult<()> {
        if self.store.is_seeded(conversation_id) {
            return Ok(());
        }

        let chain = self.resolver.resolve(user_id).await?;
        let skip = chain.len().saturating_sub(self.config.window_size);
        let history: Vec<ChatMessage> = chain.iter().skip(skip).map(|e| e.to_chat_message()).collect();
        let seeded = history.len();
        if self.store.seed(conversation_id, history) {
            debug!(conversation_id, user_id, seeded, "Seeded context window");
        }
        Ok(())
    }

    /// System prompt, window and user message, in that order
    pub async fn assemble(
        &self,
        conversation_id: &str,
        user_id: &str,
        message: &str,
    ) -> Vec<ChatMessage> {
        self.assemble_at(conversation_id, user_id, message, Utc::now()).await
    }

    /// [`Self::assemble`] with an explicit clock
    pub async fn assemble_at(
        &self,
        conversation_id: &str,
        user_id: &str,
        message: &str,
        now: DateTime<Utc>,
    ) -> Vec<ChatMessage> {
        if let Err(e) = self.ensure_seeded(conversation_id, user_id).await {
            warn!(conversation_id, user_id, error = %e, "Could not seed context window");
        }

        let window = self.store.snapshot(conversation_id);
        let mut messages = Vec::with_capacity(window.len() + 2);
        messages.push(ChatMessage::system(self.system_prompt_at(now)));
        messages.extend(window);
        messages.push(ChatMessage::user(message));
        messages
    }
}
