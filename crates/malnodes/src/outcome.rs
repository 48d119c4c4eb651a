use crate::missing_fields;
use async_trait::async_trait;
use chrono::Utc;
use malcore::ports::OutcomeRecord;
use malcore::{ActionHandler, Config, EffectClass, ExecutionContext, NodeConfig, NodeError};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogType {
    Success,
    Attempt,
}

impl LogType {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "success" => Some(LogType::Success),
            "attempt" => Some(LogType::Attempt),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            LogType::Success => "success",
            LogType::Attempt => "attempt",
        }
    }
}

/// Records what worked, or what was tried, in the outcome log
pub struct UpdateOutcomeLogAction;

#[async_trait]
impl ActionHandler for UpdateOutcomeLogAction {
    fn subtype(&self) -> &str {
        "update_outcome_log"
    }

    fn description(&self) -> &str {
        "Log a success pattern or an attempt for the campaign and contact"
    }

    fn effect(&self) -> EffectClass {
        EffectClass::ExternalWrite
    }

    fn validate_config(&self, config: &Config) -> Vec<String> {
        let mut errors = missing_fields(self.subtype(), config, &["outcome"]);
        let cfg = NodeConfig::new(self.subtype(), config);
        if let Ok(Some(raw)) = cfg.opt_str("logType") {
            if LogType::parse(raw).is_none() {
                errors.push("logType must be \"success\" or \"attempt\"".to_string());
            }
        }
        errors
    }

    async fn run(&self, config: &Config, input: &Value, ctx: &ExecutionContext) -> Result<Value, NodeError> {
        let cfg = NodeConfig::new(self.subtype(), config);
        let outcome = cfg.require_str("outcome")?;
        let raw_log_type = cfg.opt_str("logType")?.unwrap_or("success");
        let log_type = LogType::parse(raw_log_type).ok_or_else(|| {
            NodeError::invalid_config(self.subtype(), "logType", format!("unknown log type '{}'", raw_log_type))
        })?;
        let campaign_id = cfg.path_or("campaignIdField", "event.campaignId")?.resolve_id(input);
        let contact_id = cfg.path_or("contactIdField", "event.contactId")?.resolve_id(input);

        let record = OutcomeRecord {
            campaign_id: campaign_id.clone(),
            contact_id: contact_id.clone(),
            outcome: outcome.to_string(),
            metadata: json!({
                "source": "automation",
                "executionId": ctx.execution_id,
                "timestamp": Utc::now(),
                "stepInput": input,
            }),
        };

        let outcomes = &ctx.clients.outcomes;
        let result = match log_type {
            LogType::Success => outcomes.log_success_pattern(record).await,
            LogType::Attempt => outcomes.log_attempt(record).await,
        };
        result.map_err(|e| NodeError::action(self.subtype(), "Failed to update outcome log", e))?;

        tracing::info!(log_type = log_type.as_str(), "Updated outcome log: {}", outcome);
        Ok(json!({
            "outcome": outcome,
            "logType": log_type.as_str(),
            "campaignId": campaign_id,
            "contactId": contact_id,
        }))
    }
}
