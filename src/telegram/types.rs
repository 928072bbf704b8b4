//! Inbound webhook update schema.
//!
//! Deliberately lenient: every field Telegram may omit is optional or
//! defaulted, so the dispatcher can parse minimal payloads and ignore
//! update kinds it does not handle. Only the fields this bot reads are
//! modeled; serde skips the rest.
//! Docs: <https://core.telegram.org/bots/api#update>

use serde::Deserialize;

/// A single webhook update. Anything without a `message` is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Update {
    #[serde(default)]
    pub update_id: Option<i64>,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<User>,
    #[serde(default)]
    pub text: Option<String>,
    /// Members added to the chat in this update, if any.
    #[serde(default)]
    pub new_chat_members: Vec<User>,
}

/// Chat identity. Positive ids are one-to-one private chats, negative ids
/// are groups and channels.
#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: u64,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

impl User {
    /// Human-facing name: "First Last", falling back to username, then id.
    pub fn display_name(&self) -> String {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => format!("{} {}", first, last),
            (Some(first), None) => first.clone(),
            _ => match &self.username {
                Some(username) => username.clone(),
                None => format!("user {}", self.id),
            },
        }
    }
}
