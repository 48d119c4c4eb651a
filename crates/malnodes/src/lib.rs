//! Standard node library
//!
//! Built-in trigger, condition and action handlers for marketing flows

mod email;
mod field;
mod metrics;
mod notify;
mod outcome;
mod segment;
mod task;
mod time;
pub mod triggers;

pub use email::{ScheduleFollowupAction, SendEmailCampaignAction};
pub use field::{FieldMatchCondition, MatchOperator};
pub use metrics::{CampaignStatusCondition, MetricGreaterCondition};
pub use notify::{LogEventAction, NotifyUserAction};
pub use outcome::UpdateOutcomeLogAction;
pub use segment::{SegmentCondition, TagContactAction, TagPresentCondition, UpdateSegmentAction};
pub use task::CreateReleaseTaskAction;
pub use time::{DelayAction, TimeElapsedCondition};

use malcore::{Config, NodeConfig, NodeRegistry};
use std::sync::Arc;

/// Register all standard handlers with a registry
pub fn register_all(registry: &mut NodeRegistry) {
    registry.register_trigger(Arc::new(triggers::EMAIL_OPEN));
    registry.register_trigger(Arc::new(triggers::EMAIL_CLICK));
    registry.register_trigger(Arc::new(triggers::EMAIL_REPLY));
    registry.register_trigger(Arc::new(triggers::CONTACT_TAGGED));
    registry.register_trigger(Arc::new(triggers::CAMPAIGN_STATUS_CHANGED));
    registry.register_trigger(Arc::new(triggers::SEGMENT_JOINED));
    registry.register_trigger(Arc::new(triggers::RELEASE_CREATED));
    registry.register_trigger(Arc::new(triggers::ManualTrigger));

    registry.register_condition(Arc::new(FieldMatchCondition));
    registry.register_condition(Arc::new(SegmentCondition));
    registry.register_condition(Arc::new(MetricGreaterCondition));
    registry.register_condition(Arc::new(TagPresentCondition));
    registry.register_condition(Arc::new(TimeElapsedCondition));
    registry.register_condition(Arc::new(CampaignStatusCondition));

    registry.register_action(Arc::new(SendEmailCampaignAction));
    registry.register_action(Arc::new(ScheduleFollowupAction));
    registry.register_action(Arc::new(UpdateSegmentAction));
    registry.register_action(Arc::new(CreateReleaseTaskAction));
    registry.register_action(Arc::new(NotifyUserAction));
    registry.register_action(Arc::new(LogEventAction));
    registry.register_action(Arc::new(UpdateOutcomeLogAction));
    registry.register_action(Arc::new(TagContactAction));
    registry.register_action(Arc::new(DelayAction));
}

/// A registry holding every standard handler.
pub fn standard_registry() -> NodeRegistry {
    let mut registry = NodeRegistry::new();
    register_all(&mut registry);
    registry
}

/// "<field> is required" for each listed field the config lacks.
pub(crate) fn missing_fields(subtype: &str, config: &Config, fields: &[&str]) -> Vec<String> {
    let cfg = NodeConfig::new(subtype, config);
    fields
        .iter()
        .filter(|field| !cfg.has(field))
        .map(|field| format!("{} is required", field))
        .collect()
}
