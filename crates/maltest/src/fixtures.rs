use crate::MockBackend;
use malcore::{
    AutomationNode, Config, ExecutionContext, ExecutionLimits, Flow, FlowDefinition, InMemoryFlowStore, NodeId,
    Outcome, TriggerContext, TriggerType,
};
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

pub const TEST_USER: &str = "user-1";

/// Email-engagement flow: `email_open` on `c1`, then `if_metric_greater`
/// on `openRate > 50`, then on `true` only, `tag_contact` with "engaged".
pub struct EngagementFlow {
    pub definition: FlowDefinition,
    pub trigger: NodeId,
    pub condition: NodeId,
    pub action: NodeId,
}

pub fn engagement_flow(user_id: &str) -> EngagementFlow {
    let mut definition = FlowDefinition::new(Flow::new(user_id, "Tag engaged openers", TriggerType::Event).active());
    let flow_id = definition.flow_id();

    let trigger = definition.add_node(AutomationNode::trigger(flow_id, "email_open").with_config("campaignId", "c1"));
    let condition = definition.add_node(
        AutomationNode::condition(flow_id, "if_metric_greater")
            .with_config("metric", "openRate")
            .with_config("threshold", 50),
    );
    let action = definition.add_node(AutomationNode::action(flow_id, "tag_contact").with_config("tag", "engaged"));

    definition.connect(trigger, condition);
    definition.connect_on(condition, Outcome::True, action);

    EngagementFlow {
        definition,
        trigger,
        condition,
        action,
    }
}

/// Active event flow: one trigger node followed by `actions` in a chain.
pub fn linear_flow(user_id: &str, trigger_subtype: &str, actions: Vec<AutomationNode>) -> FlowDefinition {
    let mut definition = FlowDefinition::new(Flow::new(user_id, "Linear flow", TriggerType::Event).active());
    let flow_id = definition.flow_id();
    let mut previous = definition.add_node(AutomationNode::trigger(flow_id, trigger_subtype));
    for action in actions {
        let id = definition.add_node(action);
        definition.connect(previous, id);
        previous = id;
    }
    definition
}

pub fn email_open(user_id: &str, campaign_id: &str, contact_id: &str) -> TriggerContext {
    TriggerContext::new(
        "email_open",
        "email-service",
        json!({ "campaignId": campaign_id, "contactId": contact_id }),
    )
    .with_user(user_id)
}

pub async fn store_with(definitions: impl IntoIterator<Item = FlowDefinition>) -> Arc<InMemoryFlowStore> {
    let store = Arc::new(InMemoryFlowStore::new());
    for definition in definitions {
        store.insert_definition(definition).await;
    }
    store
}

/// Context for calling a handler directly, outside any execution.
pub fn node_context(backend: &Arc<MockBackend>) -> ExecutionContext {
    let flow = Flow::new(TEST_USER, "Handler test", TriggerType::Event);
    ExecutionContext::new(&flow, Uuid::new_v4(), backend.clients(), ExecutionLimits::default())
}

/// Node config from a JSON object literal.
pub fn config(value: Value) -> Config {
    match value {
        Value::Object(map) => map,
        other => panic!("node config must be a JSON object, got {}", other),
    }
}
