use crate::model::Config;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event type used for flows started by hand.
pub const MANUAL_TRIGGER: &str = "manual_trigger";

/// External event that starts flow matching and execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerContext {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Routing metadata; `userId` names the owning user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Config>,
}

impl TriggerContext {
    pub fn new(
        event_type: impl Into<String>,
        source: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            source: source.into(),
            payload,
            timestamp: None,
            metadata: None,
        }
    }

    /// Synthetic event for a manually started flow.
    pub fn manual(payload: serde_json::Value) -> Self {
        Self::new(MANUAL_TRIGGER, "manual", payload).stamped()
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata
            .get_or_insert_with(Config::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn with_user(self, user_id: impl Into<String>) -> Self {
        self.with_metadata("userId", user_id.into())
    }

    pub fn user_id(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get("userId"))
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }

    /// Fills in the timestamp if the sender left it out.
    pub fn stamped(mut self) -> Self {
        if self.timestamp.is_none() {
            self.timestamp = Some(Utc::now());
        }
        self
    }
}
