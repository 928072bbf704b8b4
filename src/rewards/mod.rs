pub mod resolver;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::RewardsConfig;
use crate::rewards::resolver::{match_event_config, EventConfigListing, CUSTOM_EVENT_PREFIX};
use crate::telegram::types::User;
use crate::telegram::TelegramApi;

/// Domain the rewards platform files these users under; also the domain of
/// the synthesized pseudo-emails.
const LOYALTEEZ_DOMAIN: &str = "loyalteez.app";

const MANUAL_EVENT_PATH: &str = "/manual-event";
const PREGENERATE_WALLET_PATH: &str = "/pregenerate-wallet";

/// Result of one reward trigger. Constructed fresh per call.
#[derive(Debug, Clone, Default)]
pub struct TriggerOutcome {
    pub success: bool,
    pub distributed_amount: Option<f64>,
    pub error: Option<String>,
}

impl TriggerOutcome {
    fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            distributed_amount: None,
            error: Some(error.into()),
        }
    }
}

/// Rewards-platform surface the message handler depends on. Behind a trait
/// so tests can substitute a scripted mock.
#[async_trait]
pub trait RewardsApi: Send + Sync {
    /// Triggers a reward event for the user. Never returns an error;
    /// every failure mode is folded into the outcome.
    async fn trigger(&self, event_type: &str, user: &User, chat_id: i64) -> TriggerOutcome;

    /// Resolves a friendly event name to an event identifier. Never
    /// fails; unresolvable names are returned unchanged.
    async fn resolve_event_name(&self, name: &str) -> String;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TriggerRequest<'a> {
    brand_id: &'a str,
    event_type: &'a str,
    email: &'a str,
    domain: &'a str,
    metadata: TriggerMetadata<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TriggerMetadata<'a> {
    platform: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<&'a str>,
    display_name: &'a str,
    chat_id: i64,
    /// Milliseconds since the Unix epoch.
    timestamp: i64,
    /// Lets the rewards API authenticate which bot filed the event.
    #[serde(skip_serializing_if = "Option::is_none")]
    bot_username: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TriggerResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    distributed_amount: Option<f64>,
    #[serde(default)]
    error: Option<String>,
}

/// Reqwest-backed implementation of [`RewardsApi`].
pub struct RewardsClient {
    client: reqwest::Client,
    config: RewardsConfig,
    telegram: Arc<dyn TelegramApi>,
}

/// Deterministic pseudo-email the rewards platform keys wallets on.
fn synthesize_email(user_id: u64) -> String {
    format!("telegram_{}@{}", user_id, LOYALTEEZ_DOMAIN)
}

impl RewardsClient {
    pub fn new(config: RewardsConfig, telegram: Arc<dyn TelegramApi>) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            telegram,
        }
    }

    /// POST with the two-step transport policy: internal channel first
    /// when configured, public URL otherwise. The internal attempt's
    /// result is discarded entirely on failure; the public attempt is
    /// authoritative.
    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        payload: &impl Serialize,
    ) -> Result<T> {
        if let Some(internal) = self.config.internal_api_url() {
            match self.attempt_post(internal, path, payload).await {
                Ok(parsed) => return Ok(parsed),
                Err(e) => debug!(
                    "Internal channel failed for {}, falling back to HTTP: {:#}",
                    path, e
                ),
            }
        }
        self.attempt_post(&self.config.api_url, path, payload).await
    }

    async fn attempt_post<T: serde::de::DeserializeOwned>(
        &self,
        base: &str,
        path: &str,
        payload: &impl Serialize,
    ) -> Result<T> {
        let url = format!("{}{}", base, path);
        let response = self
            .client
            .post(&url)
            .json(payload)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Rewards API error ({}): {}", status, body);
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse response from {}", url))
    }

    /// GET with the same internal-first transport policy as [`post_json`].
    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        if let Some(internal) = self.config.internal_api_url() {
            match self.attempt_get(internal, path).await {
                Ok(parsed) => return Ok(parsed),
                Err(e) => debug!(
                    "Internal channel failed for {}, falling back to HTTP: {:#}",
                    path, e
                ),
            }
        }
        self.attempt_get(&self.config.api_url, path).await
    }

    async fn attempt_get<T: serde::de::DeserializeOwned>(&self, base: &str, path: &str) -> Result<T> {
        let url = format!("{}{}", base, path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Rewards API error ({}): {}", status, body);
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse response from {}", url))
    }

    /// Best-effort: make sure a wallet exists before the reward event.
    /// Failure is logged and ignored; the reward call may create the
    /// wallet as a side effect anyway.
    async fn pregenerate_wallet(&self, email: &str) {
        let payload = serde_json::json!({
            "brandId": self.config.brand_id,
            "email": email,
        });
        if let Err(e) = self
            .post_json::<serde_json::Value>(PREGENERATE_WALLET_PATH, &payload)
            .await
        {
            debug!("Wallet pregeneration failed for {}: {:#}", email, e);
        }
    }
}

#[async_trait]
impl RewardsApi for RewardsClient {
    async fn trigger(&self, event_type: &str, user: &User, chat_id: i64) -> TriggerOutcome {
        if !self.config.has_brand() {
            warn!("Reward trigger dropped: no brand_id configured");
            return TriggerOutcome::failure("configuration error");
        }

        let email = synthesize_email(user.id);
        let bot_username = self.telegram.bot_username().await;

        self.pregenerate_wallet(&email).await;

        let display_name = user.display_name();
        let request = TriggerRequest {
            brand_id: &self.config.brand_id,
            event_type,
            email: &email,
            domain: LOYALTEEZ_DOMAIN,
            metadata: TriggerMetadata {
                platform: "telegram",
                username: user.username.as_deref(),
                display_name: &display_name,
                chat_id,
                timestamp: chrono::Utc::now().timestamp_millis(),
                bot_username: bot_username.as_deref(),
            },
        };

        match self
            .post_json::<TriggerResponse>(MANUAL_EVENT_PATH, &request)
            .await
        {
            Ok(response) => {
                info!(
                    "Reward event {} for {}: success={}",
                    event_type, email, response.success
                );
                TriggerOutcome {
                    success: response.success,
                    distributed_amount: response.distributed_amount,
                    error: response.error,
                }
            }
            Err(e) => {
                warn!("Reward trigger failed for {}: {:#}", email, e);
                TriggerOutcome::failure(format!("{:#}", e))
            }
        }
    }

    async fn resolve_event_name(&self, name: &str) -> String {
        // Platform-generated identifiers are already canonical.
        if name.starts_with(CUSTOM_EVENT_PREFIX) {
            return name.to_string();
        }

        if !self.config.has_brand() {
            return name.to_string();
        }

        let path = format!("/event-configs/{}", self.config.brand_id);
        match self.get_json::<EventConfigListing>(&path).await {
            Ok(listing) => match match_event_config(&listing.event_configs, name) {
                Some(resolved) => resolved,
                None => {
                    debug!("No event config matched '{}'; keeping it as-is", name);
                    name.to_string()
                }
            },
            Err(e) => {
                warn!("Event lookup failed, keeping '{}' as-is: {:#}", name, e);
                name.to_string()
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Scripted mock: returns a preset outcome and records every trigger
    /// and resolution request.
    pub(crate) struct MockRewards {
        pub outcome: TriggerOutcome,
        pub resolutions: HashMap<String, String>,
        pub triggered: Mutex<Vec<(String, u64, i64)>>,
        pub resolve_calls: Mutex<Vec<String>>,
    }

    impl MockRewards {
        pub(crate) fn succeeding(amount: Option<f64>) -> Self {
            Self {
                outcome: TriggerOutcome {
                    success: true,
                    distributed_amount: amount,
                    error: None,
                },
                resolutions: HashMap::new(),
                triggered: Mutex::new(Vec::new()),
                resolve_calls: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn failing(error: &str) -> Self {
            Self {
                outcome: TriggerOutcome::failure(error),
                ..Self::succeeding(None)
            }
        }

        pub(crate) fn with_resolution(mut self, from: &str, to: &str) -> Self {
            self.resolutions.insert(from.to_string(), to.to_string());
            self
        }

        pub(crate) fn triggered_events(&self) -> Vec<(String, u64, i64)> {
            self.triggered.lock().unwrap().clone()
        }

        pub(crate) fn resolve_count(&self) -> usize {
            self.resolve_calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl RewardsApi for MockRewards {
        async fn trigger(&self, event_type: &str, user: &User, chat_id: i64) -> TriggerOutcome {
            self.triggered
                .lock()
                .unwrap()
                .push((event_type.to_string(), user.id, chat_id));
            self.outcome.clone()
        }

        async fn resolve_event_name(&self, name: &str) -> String {
            self.resolve_calls.lock().unwrap().push(name.to_string());
            self.resolutions
                .get(name)
                .cloned()
                .unwrap_or_else(|| name.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telegram::mock::MockTelegram;

    fn client(config: RewardsConfig) -> RewardsClient {
        RewardsClient::new(config, Arc::new(MockTelegram::new()))
    }

    #[test]
    fn email_is_deterministic_per_user() {
        assert_eq!(synthesize_email(42), "telegram_42@loyalteez.app");
        assert_eq!(synthesize_email(42), synthesize_email(42));
    }

    #[test]
    fn trigger_payload_uses_camel_case_and_omits_absent_fields() {
        let display_name = "Ana B".to_string();
        let request = TriggerRequest {
            brand_id: "acme",
            event_type: "custom_abc123",
            email: "telegram_1@loyalteez.app",
            domain: LOYALTEEZ_DOMAIN,
            metadata: TriggerMetadata {
                platform: "telegram",
                username: None,
                display_name: &display_name,
                chat_id: -100,
                timestamp: 1_700_000_000_000,
                bot_username: Some("perk_bot"),
            },
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["brandId"], "acme");
        assert_eq!(value["eventType"], "custom_abc123");
        assert_eq!(value["domain"], "loyalteez.app");
        assert_eq!(value["metadata"]["displayName"], "Ana B");
        assert_eq!(value["metadata"]["chatId"], -100);
        assert_eq!(value["metadata"]["botUsername"], "perk_bot");
        assert!(value["metadata"].get("username").is_none());
    }

    #[test]
    fn trigger_response_tolerates_partial_bodies() {
        let parsed: TriggerResponse =
            serde_json::from_str(r#"{"success":true,"distributedAmount":12.5}"#).unwrap();
        assert!(parsed.success);
        assert_eq!(parsed.distributed_amount, Some(12.5));
        assert_eq!(parsed.error, None);

        let failed: TriggerResponse =
            serde_json::from_str(r#"{"success":false,"error":"cooldown active"}"#).unwrap();
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("cooldown active"));
    }

    #[tokio::test]
    async fn trigger_without_brand_is_a_soft_configuration_error() {
        let rewards = client(RewardsConfig::default());
        let user = User {
            id: 1,
            is_bot: false,
            username: None,
            first_name: Some("Ana".into()),
            last_name: None,
        };

        let outcome = rewards.trigger("custom_abc123", &user, -100).await;
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("configuration error"));
        assert_eq!(outcome.distributed_amount, None);
    }

    #[tokio::test]
    async fn custom_prefixed_names_resolve_without_a_network_call() {
        // brand_id is set, but the reserved prefix must short-circuit
        // before any request is built.
        let rewards = client(RewardsConfig {
            brand_id: "acme".to_string(),
            api_url: "http://127.0.0.1:1".to_string(),
            ..RewardsConfig::default()
        });
        assert_eq!(
            rewards.resolve_event_name("custom_abc123").await,
            "custom_abc123"
        );
    }

    #[tokio::test]
    async fn unreachable_listing_keeps_the_name_as_is() {
        // Port 1 refuses connections, so the lookup fails and resolution
        // degrades to the identity transform.
        let rewards = client(RewardsConfig {
            brand_id: "acme".to_string(),
            api_url: "http://127.0.0.1:1".to_string(),
            ..RewardsConfig::default()
        });
        assert_eq!(rewards.resolve_event_name("daily_checkin").await, "daily_checkin");
    }
}
