use crate::missing_fields;
use crate::time::{days_from_now, wait};
use async_trait::async_trait;
use malcore::ports::CampaignDraft;
use malcore::{ActionHandler, Config, EffectClass, ExecutionContext, NodeConfig, NodeError};
use serde_json::{json, Value};

/// Creates a campaign and sends it right away
pub struct SendEmailCampaignAction;

#[async_trait]
impl ActionHandler for SendEmailCampaignAction {
    fn subtype(&self) -> &str {
        "send_email_campaign"
    }

    fn description(&self) -> &str {
        "Create and send an email campaign to a segment or contacts"
    }

    fn effect(&self) -> EffectClass {
        EffectClass::ExternalWrite
    }

    fn validate_config(&self, config: &Config) -> Vec<String> {
        let mut errors = missing_fields(self.subtype(), config, &["subject", "body", "fromEmail"]);
        let cfg = NodeConfig::new(self.subtype(), config);
        if !cfg.has("toSegmentId") && !cfg.has("toContactIds") {
            errors.push("Either toSegmentId or toContactIds is required".to_string());
        }
        errors
    }

    async fn run(&self, config: &Config, _input: &Value, ctx: &ExecutionContext) -> Result<Value, NodeError> {
        let cfg = NodeConfig::new(self.subtype(), config);
        let subject = cfg.require_str("subject")?;
        let body = cfg.require_str("body")?;
        let from_email = cfg.require_str("fromEmail")?;
        let to_segment_id = cfg.opt_str("toSegmentId")?.map(str::to_string);
        let to_contact_ids = cfg.opt_str_list("toContactIds")?;
        if to_segment_id.is_none() && to_contact_ids.is_none() {
            return Err(NodeError::MissingConfig {
                subtype: self.subtype().to_string(),
                field: "toSegmentId".to_string(),
            });
        }

        if let Some(seconds) = cfg.opt_f64("delaySeconds")?.filter(|s| *s > 0.0) {
            tracing::info!("Delaying email send by {} seconds", seconds);
            wait(ctx, self.subtype(), seconds).await?;
        }

        let email = &ctx.clients.email;
        let campaign_id = email
            .create_campaign(CampaignDraft {
                name: format!("Automation: {}", subject),
                subject: subject.to_string(),
                body: body.to_string(),
                from_email: from_email.to_string(),
                to_segment_id,
                to_contact_ids,
            })
            .await
            .map_err(|e| NodeError::action(self.subtype(), "Failed to create email campaign", e))?;

        email
            .send_campaign(&campaign_id)
            .await
            .map_err(|e| NodeError::action(self.subtype(), "Failed to send email campaign", e))?;

        tracing::info!(%campaign_id, "Sent email campaign");
        Ok(json!({ "campaignId": campaign_id }))
    }
}

/// Creates a follow-up campaign scheduled some days ahead
pub struct ScheduleFollowupAction;

#[async_trait]
impl ActionHandler for ScheduleFollowupAction {
    fn subtype(&self) -> &str {
        "schedule_followup"
    }

    fn description(&self) -> &str {
        "Schedule a follow-up campaign"
    }

    fn effect(&self) -> EffectClass {
        EffectClass::ExternalWrite
    }

    fn validate_config(&self, config: &Config) -> Vec<String> {
        missing_fields(self.subtype(), config, &["subject", "body", "fromEmail", "delayDays"])
    }

    async fn run(&self, config: &Config, input: &Value, ctx: &ExecutionContext) -> Result<Value, NodeError> {
        let cfg = NodeConfig::new(self.subtype(), config);
        let subject = cfg.require_str("subject")?;
        let body = cfg.require_str("body")?;
        let from_email = cfg.require_str("fromEmail")?;
        let delay_days = cfg.require_f64("delayDays")?;
        if delay_days <= 0.0 {
            return Err(NodeError::invalid_config(self.subtype(), "delayDays", "must be > 0"));
        }
        let send_at = days_from_now(delay_days)
            .ok_or_else(|| NodeError::invalid_config(self.subtype(), "delayDays", "out of range"))?;
        let original_campaign_id = cfg
            .path_or("campaignIdField", "event.campaignId")?
            .resolve_id(input);

        let email = &ctx.clients.email;
        let campaign_id = email
            .create_campaign(CampaignDraft {
                name: format!("Follow-up: {}", subject),
                subject: subject.to_string(),
                body: body.to_string(),
                from_email: from_email.to_string(),
                to_segment_id: None,
                to_contact_ids: None,
            })
            .await
            .map_err(|e| NodeError::action(self.subtype(), "Failed to create follow-up campaign", e))?;

        email
            .schedule_campaign(&campaign_id, send_at)
            .await
            .map_err(|e| NodeError::action(self.subtype(), "Failed to schedule follow-up", e))?;

        tracing::info!(%campaign_id, %send_at, "Scheduled follow-up campaign");
        Ok(json!({
            "campaignId": campaign_id,
            "scheduleDate": send_at,
            "originalCampaignId": original_campaign_id,
        }))
    }
}
