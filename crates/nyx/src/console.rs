//! stdin/stdout chat platform for local runs

use crate::bot::{Bot, ChatPlatform, InboundMessage, PlatformError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::debug;

/// Channel id used for every console message
pub const CONSOLE_CHANNEL: &str = "console";

/// Prints replies to stdout and numbers them like platform messages
pub struct ConsolePlatform {
    bot_name: String,
    next_id: AtomicU64,
    last_sent: Mutex<Option<String>>,
}

impl ConsolePlatform {
    /// Platform printing replies as `bot_name`
    pub fn new(bot_name: impl Into<String>) -> Self {
        Self {
            bot_name: bot_name.into(),
            next_id: AtomicU64::new(1),
            last_sent: Mutex::new(None),
        }
    }

    /// Next platform message id
    pub fn next_message_id(&self) -> String {
        format!("console-{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Id of the last reply sent
    pub fn last_sent(&self) -> Option<String> {
        self.last_sent.lock().clone()
    }
}

#[async_trait]
impl ChatPlatform for ConsolePlatform {
    async fn send(&self, channel_id: &str, text: &str) -> Result<String, PlatformError> {
        let id = self.next_message_id();
        let mut stdout = tokio::io::stdout();
        stdout
            .write_all(format!("{}: {}\n", self.bot_name, text).as_bytes())
            .await?;
        stdout.flush().await?;

        debug!(channel_id, message_id = %id, "Printed reply");
        *self.last_sent.lock() = Some(id.clone());
        Ok(id)
    }
}

/// Read lines from stdin as direct messages from `user_id` until EOF
///
/// Each line is answered before the next one is read and replies to the
/// last answer printed, so the session forms one reply chain.
pub async fn run(bot: Arc<Bot>, platform: Arc<ConsolePlatform>, user_id: &str) -> std::io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let message = next_message(&platform, user_id, line);
        if bot.handle(platform.as_ref(), message).await.is_none() {
            debug!(user_id, "Console line was not answered");
        }
    }
    Ok(())
}

fn next_message(platform: &ConsolePlatform, user_id: &str, line: String) -> InboundMessage {
    let message = InboundMessage::new(CONSOLE_CHANNEL, user_id, line)
        .direct()
        .with_platform_id(platform.next_message_id());
    match platform.last_sent() {
        Some(last) => message.replying_to(last),
        None => message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_ids_are_sequential() {
        let platform = ConsolePlatform::new("Nyx");
        assert_eq!(platform.next_message_id(), "console-1");
        assert_eq!(platform.next_message_id(), "console-2");
        assert_eq!(platform.last_sent(), None);
    }

    #[test]
    fn test_send_records_last_id() {
        let platform = ConsolePlatform::new("Nyx");
        let id = tokio_test::block_on(platform.send(CONSOLE_CHANNEL, "hello")).unwrap();
        assert_eq!(platform.last_sent(), Some(id));
    }

    #[test]
    fn test_lines_reply_to_the_latest_answer() {
        let platform = ConsolePlatform::new("Nyx");

        let first = next_message(&platform, "42", "hello".into());
        assert!(first.is_direct);
        assert_eq!(first.reply_to_platform_id, None);

        let answer = tokio_test::block_on(platform.send(CONSOLE_CHANNEL, "hi")).unwrap();
        let second = next_message(&platform, "42", "how are you".into());
        assert_eq!(second.reply_to_platform_id, Some(answer));
        assert_ne!(second.platform_message_id, first.platform_message_id);
    }
}
