use crate::missing_fields;
use async_trait::async_trait;
use malcore::{
    ActionHandler, Config, ConditionHandler, ConditionResult, EffectClass, ExecutionContext, NodeConfig, NodeError,
};
use serde_json::{json, Value};

/// Contact is a member of a segment
pub struct SegmentCondition;

#[async_trait]
impl ConditionHandler for SegmentCondition {
    fn subtype(&self) -> &str {
        "if_segment"
    }

    fn description(&self) -> &str {
        "Check whether the contact belongs to a segment"
    }

    async fn evaluate(
        &self,
        config: &Config,
        input: &Value,
        ctx: &ExecutionContext,
    ) -> Result<ConditionResult, NodeError> {
        let cfg = NodeConfig::new(self.subtype(), config);
        let segment_id = cfg.require_str("segmentId")?;
        let contact_field = cfg.path_or("contactIdField", "event.contactId")?;

        let Some(contact_id) = contact_field.resolve_id(input) else {
            return Ok(ConditionResult::new(
                false,
                json!({ "reason": format!("no contact id at {}", contact_field), "segmentId": segment_id }),
            ));
        };

        let members = ctx
            .clients
            .segments
            .list_segment_contacts(segment_id)
            .await
            .map_err(|e| NodeError::condition(self.subtype(), "Failed to list segment contacts", e))?;
        let in_segment = members.iter().any(|m| *m == contact_id);

        Ok(ConditionResult::new(
            in_segment,
            json!({ "contactId": contact_id, "segmentId": segment_id, "inSegment": in_segment }),
        ))
    }
}

/// A tag is present on the step input, ignoring case
pub struct TagPresentCondition;

#[async_trait]
impl ConditionHandler for TagPresentCondition {
    fn subtype(&self) -> &str {
        "if_tag_present"
    }

    fn description(&self) -> &str {
        "Check the step input's tag list for a tag"
    }

    async fn evaluate(
        &self,
        config: &Config,
        input: &Value,
        _ctx: &ExecutionContext,
    ) -> Result<ConditionResult, NodeError> {
        let cfg = NodeConfig::new(self.subtype(), config);
        let tag = cfg.require_str("tag")?;
        let tags_field = cfg.path_or("tagsField", "event.tags")?;

        let tags: Vec<&str> = tags_field
            .resolve(input)
            .and_then(Value::as_array)
            .map(|tags| tags.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        let present = tags.iter().any(|t| t.eq_ignore_ascii_case(tag));

        Ok(ConditionResult::new(present, json!({ "tag": tag, "tags": tags })))
    }
}

/// Adds a contact to, or removes it from, a segment
pub struct UpdateSegmentAction;

#[async_trait]
impl ActionHandler for UpdateSegmentAction {
    fn subtype(&self) -> &str {
        "update_segment"
    }

    fn description(&self) -> &str {
        "Add or remove the contact from a segment"
    }

    fn effect(&self) -> EffectClass {
        EffectClass::ContactWrite
    }

    fn validate_config(&self, config: &Config) -> Vec<String> {
        let mut errors = missing_fields(self.subtype(), config, &["segmentId", "action"]);
        let cfg = NodeConfig::new(self.subtype(), config);
        if let Ok(Some(action)) = cfg.opt_str("action") {
            if action != "add" && action != "remove" {
                errors.push("action must be \"add\" or \"remove\"".to_string());
            }
        }
        errors
    }

    async fn run(&self, config: &Config, input: &Value, ctx: &ExecutionContext) -> Result<Value, NodeError> {
        let cfg = NodeConfig::new(self.subtype(), config);
        let segment_id = cfg.require_str("segmentId")?;
        let action = cfg.require_str("action")?;
        if action != "add" && action != "remove" {
            return Err(NodeError::invalid_config(
                self.subtype(),
                "action",
                format!("invalid segment action '{}'", action),
            ));
        }
        let contact_field = cfg.path_or("contactIdField", "event.contactId")?;
        let contact_id = contact_field.resolve_id(input).ok_or_else(|| NodeError::MissingInput {
            subtype: self.subtype().to_string(),
            path: contact_field.to_string(),
        })?;

        let segments = &ctx.clients.segments;
        let result = if action == "add" {
            segments.add_contact_to_segment(&contact_id, segment_id).await
        } else {
            segments.remove_contact_from_segment(&contact_id, segment_id).await
        };
        result.map_err(|e| NodeError::action(self.subtype(), "Failed to update segment", e))?;

        tracing::info!(%contact_id, %segment_id, %action, "Updated segment membership");
        Ok(json!({ "contactId": contact_id, "segmentId": segment_id, "action": action }))
    }
}

/// Applies a tag to a contact
pub struct TagContactAction;

#[async_trait]
impl ActionHandler for TagContactAction {
    fn subtype(&self) -> &str {
        "tag_contact"
    }

    fn description(&self) -> &str {
        "Tag the contact"
    }

    fn effect(&self) -> EffectClass {
        EffectClass::ContactWrite
    }

    fn validate_config(&self, config: &Config) -> Vec<String> {
        missing_fields(self.subtype(), config, &["tag"])
    }

    async fn run(&self, config: &Config, input: &Value, ctx: &ExecutionContext) -> Result<Value, NodeError> {
        let cfg = NodeConfig::new(self.subtype(), config);
        let tag = cfg.require_str("tag")?;
        let contact_field = cfg.path_or("contactIdField", "event.contactId")?;
        let contact_id = contact_field.resolve_id(input).ok_or_else(|| NodeError::MissingInput {
            subtype: self.subtype().to_string(),
            path: contact_field.to_string(),
        })?;

        ctx.clients
            .segments
            .tag_contact(&contact_id, tag)
            .await
            .map_err(|e| NodeError::action(self.subtype(), "Failed to tag contact", e))?;

        tracing::info!(%contact_id, "Tagged contact with \"{}\"", tag);
        Ok(json!({ "contactId": contact_id, "tag": tag }))
    }
}
