use malcore::{AutomationNode, Flow, NodeRegistry, NodeType, TriggerContext};
use serde_json::{json, Value};

/// Whether `event` should start `flow`, whose entry node is `trigger_node`.
///
/// The flow must be active and event-triggered, the trigger subtype must
/// equal the event type, and the subtype's own filter must pass.
pub fn should_trigger_flow(
    registry: &NodeRegistry,
    flow: &Flow,
    event: &TriggerContext,
    trigger_node: &AutomationNode,
) -> bool {
    if !flow.accepts_events() {
        return false;
    }
    if trigger_node.node_type != NodeType::Trigger || trigger_node.subtype != event.event_type {
        return false;
    }

    let Some(handler) = registry.trigger(&trigger_node.subtype) else {
        tracing::warn!(
            flow_id = %flow.id,
            "No handler registered for trigger subtype {}",
            trigger_node.subtype
        );
        return false;
    };

    match handler.matches(&trigger_node.config, event) {
        Ok(matched) => matched,
        Err(e) => {
            tracing::warn!(flow_id = %flow.id, node_id = %trigger_node.id, "Trigger filter rejected event: {}", e);
            false
        }
    }
}

/// Seed input for the first node of an execution.
///
/// Shape: `{ "event": <payload>, "trigger": {type, source, timestamp},
/// <context key>: <enrichment> }`, the last entry present only when the
/// trigger subtype has a registered handler.
pub fn build_initial_node_context(
    registry: &NodeRegistry,
    trigger_node: &AutomationNode,
    event: &TriggerContext,
) -> Value {
    let mut seed = serde_json::Map::new();
    seed.insert("event".to_string(), event.payload.clone());
    seed.insert(
        "trigger".to_string(),
        json!({
            "type": event.event_type,
            "source": event.source,
            "timestamp": event.timestamp,
        }),
    );

    if let Some(handler) = registry.trigger(&trigger_node.subtype) {
        seed.insert(handler.context_key().to_string(), handler.enrich(event));
    }

    Value::Object(seed)
}
