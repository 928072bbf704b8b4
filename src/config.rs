use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub rewards: RewardsConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct TelegramConfig {
    /// Bot API token. Empty disables all outbound Telegram calls.
    #[serde(default)]
    pub bot_token: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RewardsConfig {
    /// Rewards-platform tenant key. Empty makes reward triggers fail softly.
    #[serde(default)]
    pub brand_id: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Low-latency internal channel to the rewards API. Tried before
    /// `api_url` when set; any failure falls back to the public URL.
    #[serde(default)]
    pub internal_api_url: String,
    /// Join-event identifier used when a chat has none configured.
    /// Empty means joins in unconfigured chats get an admin prompt instead.
    #[serde(default)]
    pub default_join_event: String,
    #[serde(default = "default_portal_url")]
    pub portal_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    /// Shared token checked against the `secret` query parameter on
    /// inbound webhook calls. Empty disables the check.
    #[serde(default)]
    pub webhook_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_db_path")]
    pub database_path: PathBuf,
}

impl RewardsConfig {
    pub fn has_brand(&self) -> bool {
        !self.brand_id.is_empty()
    }

    /// Returns the internal channel base URL, or None when not configured.
    pub fn internal_api_url(&self) -> Option<&str> {
        if self.internal_api_url.is_empty() {
            None
        } else {
            Some(&self.internal_api_url)
        }
    }

    pub fn default_join_event(&self) -> Option<&str> {
        if self.default_join_event.is_empty() {
            None
        } else {
            Some(&self.default_join_event)
        }
    }
}

impl TelegramConfig {
    pub fn has_token(&self) -> bool {
        !self.bot_token.is_empty()
    }
}

fn default_api_url() -> String {
    "https://api.loyalteez.app".to_string()
}

fn default_portal_url() -> String {
    "https://perks.loyalteez.app".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_db_path() -> PathBuf {
    PathBuf::from("perkbot.db")
}

impl Default for RewardsConfig {
    fn default() -> Self {
        Self {
            brand_id: String::new(),
            api_url: default_api_url(),
            internal_api_url: String::new(),
            default_join_event: String::new(),
            portal_url: default_portal_url(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            webhook_secret: String::new(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: default_db_path(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }
}
