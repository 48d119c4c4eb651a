use malcore::{
    AutomationNode, ExecutionStatus, Flow, FlowDefinition, FlowStore, InMemoryFlowStore, StepStatus, StepUpdate,
    TriggerContext, TriggerType,
};
use serde_json::json;

fn definition(user_id: &str) -> FlowDefinition {
    let mut definition = FlowDefinition::new(Flow::new(user_id, "Welcome", TriggerType::Event));
    let flow_id = definition.flow_id();
    let trigger = definition.add_node(AutomationNode::trigger(flow_id, "segment_joined"));
    let action = definition.add_node(AutomationNode::action(flow_id, "log_event"));
    definition.connect(trigger, action);
    definition
}

#[tokio::test]
async fn test_new_flows_start_inactive() {
    let store = InMemoryFlowStore::new();
    let definition = definition("user-1");
    let flow_id = definition.flow_id();
    store.insert_definition(definition).await;

    let flow = store.get_flow(flow_id).await.unwrap().unwrap();
    assert!(!flow.is_active);
    assert!(!flow.accepts_events());

    store.set_active(flow_id, true).await.unwrap();
    assert!(store.get_flow(flow_id).await.unwrap().unwrap().accepts_events());
}

#[tokio::test]
async fn test_flows_are_listed_per_user() {
    let store = InMemoryFlowStore::new();
    store.insert_definition(definition("user-1")).await;
    store.insert_definition(definition("user-1")).await;
    store.insert_definition(definition("user-2")).await;

    assert_eq!(store.list_flows_for_user("user-1").await.unwrap().len(), 2);
    assert_eq!(store.list_flows_for_user("user-2").await.unwrap().len(), 1);
    assert!(store.list_flows_for_user("nobody").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_nodes_and_edges_are_scoped_to_their_flow() {
    let store = InMemoryFlowStore::new();
    let first = definition("user-1");
    let first_id = first.flow_id();
    store.insert_definition(first).await;
    store.insert_definition(definition("user-1")).await;

    let nodes = store.get_nodes_for_flow(first_id).await.unwrap();
    let edges = store.get_edges_for_flow(first_id).await.unwrap();
    assert_eq!(nodes.len(), 2);
    assert_eq!(edges.len(), 1);
    assert!(nodes.iter().all(|n| n.flow_id == first_id));
}

#[tokio::test]
async fn test_execution_lifecycle() {
    let store = InMemoryFlowStore::new();
    let definition = definition("user-1");
    let flow_id = definition.flow_id();
    let node_id = definition.nodes[0].id;
    store.insert_definition(definition).await;

    let trigger = TriggerContext::new("segment_joined", "lists", json!({ "segmentId": "s1" }));
    let execution = store.create_execution(flow_id, &trigger).await.unwrap();
    assert_eq!(execution.status, ExecutionStatus::Running);
    assert!(execution.finished_at.is_none());

    let step = store.create_execution_step(execution.id, node_id).await.unwrap();
    assert_eq!(step.status, StepStatus::Pending);

    store
        .update_execution_step(step.id, StepUpdate::running(json!({ "event": {} })))
        .await
        .unwrap();
    store
        .update_execution_step(step.id, StepUpdate::succeeded(json!({ "ok": true })))
        .await
        .unwrap();

    let steps = store.get_steps_for_execution(execution.id).await.unwrap();
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].status, StepStatus::Succeeded);
    assert_eq!(steps[0].input, Some(json!({ "event": {} })), "input survives later updates");
    assert!(steps[0].started_at.is_some() && steps[0].finished_at.is_some());

    store
        .update_execution_status(execution.id, ExecutionStatus::Partial, Some("Max external writes exceeded (25)"))
        .await
        .unwrap();
    let stored = store.get_execution(execution.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ExecutionStatus::Partial);
    assert!(stored.finished_at.is_some());
    assert_eq!(stored.error.as_deref(), Some("Max external writes exceeded (25)"));
}

#[tokio::test]
async fn test_list_executions_is_newest_first_and_limited() {
    let store = InMemoryFlowStore::new();
    let definition = definition("user-1");
    let flow_id = definition.flow_id();
    store.insert_definition(definition).await;

    let trigger = TriggerContext::manual(json!({}));
    for _ in 0..3 {
        store.create_execution(flow_id, &trigger).await.unwrap();
    }

    let executions = store.list_executions_for_flow(flow_id, 2).await.unwrap();
    assert_eq!(executions.len(), 2);
    assert!(executions[0].started_at >= executions[1].started_at);
    assert_eq!(store.execution_count().await, 3);
}

#[tokio::test]
async fn test_updating_unknown_execution_fails() {
    let store = InMemoryFlowStore::new();
    let result = store
        .update_execution_status(uuid::Uuid::new_v4(), ExecutionStatus::Failed, None)
        .await;

    assert!(result.is_err());
}
