use std::sync::Arc;

use teloxide::utils::html::escape;
use tracing::{error, info};

use crate::config::RewardsConfig;
use crate::rewards::RewardsApi;
use crate::store::{ConfigStore, EventKind};
use crate::telegram::types::{Message, User};
use crate::telegram::TelegramApi;

/// Classes of upstream trigger failures the bot answers differently.
enum TriggerFailure {
    Cooldown,
    UnknownEvent,
    Other,
}

/// Compatibility contract with the rewards API's error strings. The API
/// reports business errors as free text; these substrings are the only
/// two classes it currently distinguishes. Replace with a structured
/// error-kind field if the upstream contract grows one.
fn classify_trigger_error(error: &str) -> TriggerFailure {
    if error.contains("cooldown") {
        TriggerFailure::Cooldown
    } else if error.contains("not found") || error.contains("Invalid event") {
        TriggerFailure::UnknownEvent
    } else {
        TriggerFailure::Other
    }
}

/// Routes one inbound message to exactly one command branch.
pub struct MessageHandler {
    store: ConfigStore,
    telegram: Arc<dyn TelegramApi>,
    rewards: Arc<dyn RewardsApi>,
    rewards_config: RewardsConfig,
}

impl MessageHandler {
    pub fn new(
        store: ConfigStore,
        telegram: Arc<dyn TelegramApi>,
        rewards: Arc<dyn RewardsApi>,
        rewards_config: RewardsConfig,
    ) -> Self {
        Self {
            store,
            telegram,
            rewards,
            rewards_config,
        }
    }

    pub async fn handle(&self, message: &Message) {
        let Some(from) = &message.from else {
            return;
        };
        // Never react to other bots (prevents bot-to-bot loops).
        if from.is_bot {
            return;
        }

        let chat_id = message.chat.id;

        if !message.new_chat_members.is_empty() {
            self.handle_join(chat_id, &message.new_chat_members).await;
            return;
        }

        let text = message.text.as_deref().unwrap_or("");

        if text.starts_with("/checkin") {
            self.handle_checkin(chat_id, from).await;
        } else if text.starts_with("/balance") || text.starts_with("/ltz") {
            self.telegram
                .send_message(
                    chat_id,
                    &format!(
                        "View your LTZ balance and perks at {}",
                        self.rewards_config.portal_url
                    ),
                )
                .await;
        } else if text.starts_with("/config_checkin") {
            self.handle_config(chat_id, from, text, EventKind::Checkin)
                .await;
        } else if text.starts_with("/config_join") {
            self.handle_config(chat_id, from, text, EventKind::Join).await;
        } else if text.starts_with("/start") {
            self.telegram
                .send_message(
                    chat_id,
                    "Hello! I connect this chat to the LoyalTeez rewards program.\n\n\
                     Commands:\n\
                     /checkin - Claim your check-in reward\n\
                     /balance - View your LTZ balance\n\
                     /config_checkin - Set the check-in event (admins)\n\
                     /config_join - Set the join event (admins)",
                )
                .await;
        }
    }

    /// Stored event id for this chat, or None when unset (or unreadable:
    /// a broken store read degrades to "not configured" rather than
    /// failing the update).
    async fn event_id_for(&self, kind: EventKind, chat_id: i64) -> Option<String> {
        let key = kind.storage_key(chat_id);
        match self.store.get(&key).await {
            Ok(value) => value,
            Err(e) => {
                error!("Config read failed for {}: {:#}", key, e);
                None
            }
        }
    }

    async fn handle_join(&self, chat_id: i64, members: &[User]) {
        let humans: Vec<&User> = members.iter().filter(|m| !m.is_bot).collect();
        if humans.is_empty() {
            return;
        }

        let configured = self.event_id_for(EventKind::Join, chat_id).await;
        let Some(event_type) = configured
            .as_deref()
            .or_else(|| self.rewards_config.default_join_event())
        else {
            // One notice per join update, however many members it names.
            self.telegram
                .send_message(
                    chat_id,
                    "Join reward is not configured for this chat yet. \
                     An admin can set one with /config_join.",
                )
                .await;
            return;
        };

        for member in humans {
            let outcome = self.rewards.trigger(event_type, member, chat_id).await;
            let name = escape(&member.display_name());

            let text = match outcome.distributed_amount {
                Some(amount) if outcome.success => {
                    format!("Welcome, {}! You just received {} LTZ 🎉", name, amount)
                }
                _ => format!("Welcome, {}! Your join reward is being processed.", name),
            };
            self.telegram.send_message(chat_id, &text).await;
        }
    }

    async fn handle_checkin(&self, chat_id: i64, from: &User) {
        let Some(event_type) = self.event_id_for(EventKind::Checkin, chat_id).await else {
            self.telegram
                .send_message(
                    chat_id,
                    "Check-in is not configured for this chat yet. \
                     An admin can set it up with /config_checkin.",
                )
                .await;
            return;
        };

        let outcome = self.rewards.trigger(&event_type, from, chat_id).await;

        if outcome.success {
            let text = match outcome.distributed_amount {
                Some(amount) => format!("Checked in! You earned {} LTZ ✅", amount),
                None => "Checked in! ✅".to_string(),
            };
            self.telegram.send_message(chat_id, &text).await;
            return;
        }

        let error = outcome.error.unwrap_or_default();
        let text = match classify_trigger_error(&error) {
            TriggerFailure::Cooldown => {
                "You already checked in recently. Come back once the cooldown expires. ⏳"
                    .to_string()
            }
            TriggerFailure::UnknownEvent => {
                "The configured check-in event no longer exists. \
                 An admin may need to set it again with /config_checkin."
                    .to_string()
            }
            TriggerFailure::Other => {
                format!("Could not process your check-in: {}", escape(&error))
            }
        };
        self.telegram.send_message(chat_id, &text).await;
    }

    async fn handle_config(&self, chat_id: i64, from: &User, text: &str, kind: EventKind) {
        if !self.telegram.is_admin(chat_id, from.id).await {
            self.telegram
                .send_message(chat_id, "Only chat admins can change the reward configuration.")
                .await;
            return;
        }

        let mut parts = text.split_whitespace();
        let command = parts.next().unwrap_or("");
        let Some(input) = parts.next() else {
            self.telegram
                .send_message(
                    chat_id,
                    &format!("Usage: {} followed by the event name or id.", command),
                )
                .await;
            return;
        };

        let resolved = self.rewards.resolve_event_name(input).await;

        let key = kind.storage_key(chat_id);
        if let Err(e) = self.store.put(&key, &resolved).await {
            error!("Config write failed for {}: {:#}", key, e);
            self.telegram
                .send_message(chat_id, "Could not save the configuration, please try again.")
                .await;
            return;
        }

        info!(
            "Chat {} {} event set to {}",
            chat_id,
            kind.label(),
            resolved
        );

        let text = if resolved != input {
            format!(
                "{} event \"{}\" resolved to <code>{}</code> and saved.",
                kind.label(),
                escape(input),
                escape(&resolved)
            )
        } else {
            format!(
                "{} event set to <code>{}</code>.",
                kind.label(),
                escape(&resolved)
            )
        };
        self.telegram.send_message(chat_id, &text).await;
    }
}
