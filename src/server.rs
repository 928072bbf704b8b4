use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Query, State};
use axum::http::{Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use chrono::Utc;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::handler::MessageHandler;
use crate::telegram::types::Update;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub handler: Arc<MessageHandler>,
}

/// Serve the webhook endpoint until the process is stopped.
pub async fn run(state: AppState) -> Result<()> {
    let addr = format!("0.0.0.0:{}", state.config.server.port);

    // A single fallback route: Telegram is configured with an arbitrary
    // webhook path, so dispatch checks method and secret itself instead
    // of relying on the router.
    let app = Router::new().fallback(dispatch).with_state(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .await
        .context("HTTP server terminated")?;
    Ok(())
}

async fn dispatch(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    Query(query): Query<HashMap<String, String>>,
    body: String,
) -> Response {
    handle_request(&state, &method, uri.path(), &query, &body).await
}

/// The inbound contract, kept free of axum extractors so tests can drive
/// it directly: health and preflight specials, method gate, shared-secret
/// gate, lenient body parse, then a fixed acknowledgment.
pub(crate) async fn handle_request(
    state: &AppState,
    method: &Method,
    path: &str,
    query: &HashMap<String, String>,
    body: &str,
) -> Response {
    if *method == Method::GET && path == "/health" {
        return Json(health_document(&state.config)).into_response();
    }

    if *method == Method::OPTIONS {
        return StatusCode::OK.into_response();
    }

    if *method != Method::POST {
        return (StatusCode::METHOD_NOT_ALLOWED, "method not allowed").into_response();
    }

    let secret = &state.config.server.webhook_secret;
    // Plain comparison, matching what the platform sends back verbatim.
    // TODO: switch to a constant-time comparison.
    if !secret.is_empty() && query.get("secret").map(String::as_str) != Some(secret.as_str()) {
        warn!("Rejected webhook call with a missing or invalid secret");
        return (StatusCode::UNAUTHORIZED, "invalid secret").into_response();
    }

    let update: Update = match serde_json::from_str(body) {
        Ok(update) => update,
        Err(e) => {
            warn!("Failed to parse webhook body: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("failed to parse update: {}", e),
            )
                .into_response();
        }
    };

    match &update.message {
        Some(message) => state.handler.handle(message).await,
        None => debug!("Ignoring update without a message"),
    }

    // Always acknowledge: handler failures were already relayed into the
    // chat, and a non-200 here would make Telegram redeliver the update.
    (StatusCode::OK, "OK").into_response()
}

fn health_document(config: &Config) -> serde_json::Value {
    json!({
        "status": "ok",
        "service": "perkbot",
        "timestamp": Utc::now().to_rfc3339(),
        "config": {
            "brand_id": if config.rewards.has_brand() { "configured" } else { "missing" },
            "api_url": config.rewards.api_url,
            "kv_configured": true,
            "token_configured": config.telegram.has_token(),
        }
    })
}
