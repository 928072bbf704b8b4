//! Friendly-name resolution against the brand's event-config listing.
//!
//! Admins may configure events by the human alias (`taskName`) instead of
//! the platform-assigned identifier. Resolution is best-effort: any lookup
//! failure keeps the input unchanged and lets the reward trigger surface a
//! clearer error if the identifier is truly invalid.

use serde::Deserialize;

/// Identifiers the rewards platform generates itself start with this
/// prefix; they are never resolved again.
pub const CUSTOM_EVENT_PREFIX: &str = "custom_";

/// One entry of the remote event-config listing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventConfig {
    /// Platform-assigned event identifier (e.g. `custom_abc123`).
    pub event_type: String,
    /// Optional human alias an admin may use instead of `event_type`.
    #[serde(default)]
    pub task_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventConfigListing {
    #[serde(default)]
    pub event_configs: Vec<EventConfig>,
}

/// Matches a name against the listing: friendly alias first, then the raw
/// event type (older configs were stored by raw type).
pub fn match_event_config(configs: &[EventConfig], name: &str) -> Option<String> {
    if let Some(entry) = configs
        .iter()
        .find(|entry| entry.task_name.as_deref() == Some(name))
    {
        return Some(entry.event_type.clone());
    }

    configs
        .iter()
        .find(|entry| entry.event_type == name)
        .map(|entry| entry.event_type.clone())
}
