use crate::missing_fields;
use async_trait::async_trait;
use chrono::Utc;
use malcore::{ActionHandler, Config, EffectClass, ExecutionContext, NodeConfig, NodeError};
use serde_json::{json, Value};

/// Internal notification to the flow's owner. Only logged for now.
pub struct NotifyUserAction;

#[async_trait]
impl ActionHandler for NotifyUserAction {
    fn subtype(&self) -> &str {
        "notify_user"
    }

    fn description(&self) -> &str {
        "Send an internal notification to the flow owner"
    }

    fn effect(&self) -> EffectClass {
        EffectClass::None
    }

    fn validate_config(&self, config: &Config) -> Vec<String> {
        missing_fields(self.subtype(), config, &["message"])
    }

    async fn run(&self, config: &Config, _input: &Value, ctx: &ExecutionContext) -> Result<Value, NodeError> {
        let cfg = NodeConfig::new(self.subtype(), config);
        let message = cfg.require_str("message")?;
        let notification_type = cfg.opt_str("notificationType")?.unwrap_or("info");

        tracing::info!(
            user_id = %ctx.user_id,
            notification_type,
            "[NOTIFICATION] {}",
            message
        );

        Ok(json!({
            "message": message,
            "notificationType": notification_type,
            "sentAt": Utc::now(),
        }))
    }
}

/// Writes a message into the execution log at a chosen level
pub struct LogEventAction;

#[async_trait]
impl ActionHandler for LogEventAction {
    fn subtype(&self) -> &str {
        "log_event"
    }

    fn description(&self) -> &str {
        "Write a message to the execution log"
    }

    fn effect(&self) -> EffectClass {
        EffectClass::None
    }

    async fn run(&self, config: &Config, _input: &Value, ctx: &ExecutionContext) -> Result<Value, NodeError> {
        let cfg = NodeConfig::new(self.subtype(), config);
        let message = cfg.opt_str("message")?.unwrap_or("Automation log event");
        let level = cfg.opt_str("level")?.unwrap_or("info");
        let data = cfg.value("data").cloned().unwrap_or(Value::Null);

        match level {
            "info" => tracing::info!(user_id = %ctx.user_id, %data, "{}", message),
            "warn" => tracing::warn!(user_id = %ctx.user_id, %data, "{}", message),
            "error" => tracing::error!(user_id = %ctx.user_id, %data, "{}", message),
            _ => tracing::debug!(user_id = %ctx.user_id, %data, "{}", message),
        }

        Ok(json!({
            "message": message,
            "level": level,
            "customData": data,
            "timestamp": Utc::now(),
        }))
    }
}
