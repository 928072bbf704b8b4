pub mod types;

use async_trait::async_trait;
use teloxide::payloads::SendMessageSetters;
use teloxide::prelude::*;
use teloxide::types::{ChatId, LinkPreviewOptions, ParseMode, UserId};
use tokio::sync::OnceCell;
use tracing::{debug, error, warn};

use crate::config::TelegramConfig;

/// Outbound Telegram surface: sending messages, admin checks, and the
/// bot's own identity. Behind a trait so handler tests can substitute a
/// recording mock.
#[async_trait]
pub trait TelegramApi: Send + Sync {
    /// Best-effort send; failures are logged, never returned.
    async fn send_message(&self, chat_id: i64, text: &str);

    /// Whether the user may run admin-only commands in the chat.
    async fn is_admin(&self, chat_id: i64, user_id: u64) -> bool;

    /// The bot's own username, fetched once and cached for the life of
    /// the process. None when the token is missing or the fetch fails.
    async fn bot_username(&self) -> Option<String>;
}

/// Teloxide-backed implementation of [`TelegramApi`].
pub struct TelegramClient {
    /// None when no bot token is configured; every call becomes a no-op
    /// (or fail-closed, for the admin check).
    bot: Option<Bot>,
    bot_username: OnceCell<String>,
}

impl TelegramClient {
    pub fn new(config: &TelegramConfig) -> Self {
        let bot = if config.has_token() {
            Some(Bot::new(config.bot_token.clone()))
        } else {
            warn!("No Telegram bot token configured; outbound messages are disabled");
            None
        };
        Self {
            bot,
            bot_username: OnceCell::new(),
        }
    }
}

#[async_trait]
impl TelegramApi for TelegramClient {
    async fn send_message(&self, chat_id: i64, text: &str) {
        let Some(bot) = &self.bot else {
            debug!("Dropping message to chat {}: no bot token", chat_id);
            return;
        };

        let no_preview = LinkPreviewOptions {
            is_disabled: true,
            url: None,
            prefer_small_media: false,
            prefer_large_media: false,
            show_above_text: false,
        };

        if let Err(e) = bot
            .send_message(ChatId(chat_id), text)
            .parse_mode(ParseMode::Html)
            .link_preview_options(no_preview)
            .await
        {
            error!("Failed to send message to chat {}: {}", chat_id, e);
        }
    }

    async fn is_admin(&self, chat_id: i64, user_id: u64) -> bool {
        // Positive chat id = private chat; the counterparty is implicitly
        // allowed to configure their own conversation with the bot.
        if chat_id > 0 {
            return true;
        }

        let Some(bot) = &self.bot else {
            return false;
        };

        // Fail closed on any transport or parse error.
        match bot.get_chat_member(ChatId(chat_id), UserId(user_id)).await {
            Ok(member) => member.kind.is_privileged(),
            Err(e) => {
                warn!(
                    "Admin check failed for user {} in chat {}: {}",
                    user_id, chat_id, e
                );
                false
            }
        }
    }

    async fn bot_username(&self) -> Option<String> {
        let bot = self.bot.as_ref()?;

        // OnceCell only stores successful lookups, so a failed getMe is
        // retried on the next call instead of being cached.
        let fetched = self
            .bot_username
            .get_or_try_init(|| async {
                let me = bot.get_me().await?;
                me.user
                    .username
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("getMe returned no username"))
            })
            .await;

        match fetched {
            Ok(username) => Some(username.clone()),
            Err(e) => {
                debug!("Failed to fetch bot identity: {:#}", e);
                None
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TelegramConfig;

    fn unconfigured_client() -> TelegramClient {
        TelegramClient::new(&TelegramConfig {
            bot_token: String::new(),
        })
    }

    #[tokio::test]
    async fn private_chat_always_passes_admin_check() {
        // No token, no network: the positive-chat-id bypass must not
        // depend on the Bot API being reachable.
        let client = unconfigured_client();
        assert!(client.is_admin(12345, 1).await);
    }

    #[tokio::test]
    async fn group_chat_admin_check_fails_closed_without_token() {
        let client = unconfigured_client();
        assert!(!client.is_admin(-100123, 1).await);
    }

    #[tokio::test]
    async fn bot_username_is_none_without_token() {
        let client = unconfigured_client();
        assert_eq!(client.bot_username().await, None);
    }

    #[tokio::test]
    async fn send_without_token_is_a_silent_noop() {
        let client = unconfigured_client();
        client.send_message(-100123, "hello").await;
    }
}
