mod config;
mod handler;
mod rewards;
mod server;
mod store;
mod telegram;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::handler::MessageHandler;
use crate::rewards::RewardsClient;
use crate::server::AppState;
use crate::store::ConfigStore;
use crate::telegram::{TelegramApi, TelegramClient};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,perkbot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded");
    info!(
        "  Brand: {}",
        if config.rewards.has_brand() {
            config.rewards.brand_id.as_str()
        } else {
            "(missing)"
        }
    );
    info!("  Rewards API: {}", config.rewards.api_url);
    info!(
        "  Internal channel: {}",
        config.rewards.internal_api_url().unwrap_or("(none)")
    );
    info!(
        "  Telegram token: {}",
        if config.telegram.has_token() {
            "configured"
        } else {
            "(missing)"
        }
    );
    info!(
        "  Webhook secret: {}",
        if config.server.webhook_secret.is_empty() {
            "(none)"
        } else {
            "configured"
        }
    );

    let store = ConfigStore::open(&config.store.database_path)?;

    let telegram: Arc<dyn TelegramApi> = Arc::new(TelegramClient::new(&config.telegram));
    let rewards = Arc::new(RewardsClient::new(config.rewards.clone(), telegram.clone()));
    let handler = MessageHandler::new(store, telegram, rewards, config.rewards.clone());

    let state = AppState {
        config: Arc::new(config),
        handler: Arc::new(handler),
    };

    info!("perkbot is starting...");
    server::run(state).await
}
