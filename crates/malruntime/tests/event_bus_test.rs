use async_trait::async_trait;
use malcore::{
    AutomationError, AutomationNode, ExecutionStatus, Flow, FlowDefinition, FlowStore, InMemoryFlowStore,
    TriggerContext, TriggerType, MANUAL_TRIGGER,
};
use malruntime::{AutomationEventHandler, AutomationRuntime, EventBus, FlowDispatch, HandlerError, RuntimeConfig};
use maltest::fixtures::{linear_flow, store_with, TEST_USER};
use maltest::{stub_registry, MockBackend, StubRegistry};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn bus_with(store: &Arc<InMemoryFlowStore>, stubs: &StubRegistry, max_concurrent: usize) -> EventBus {
    let config = RuntimeConfig {
        max_concurrent_executions: max_concurrent,
        ..Default::default()
    };
    let runtime = AutomationRuntime::new(
        store.clone(),
        stubs.registry.clone(),
        Arc::new(MockBackend::new().clients()),
        config,
    );
    EventBus::new(Arc::new(runtime))
}

fn event_for(user_id: &str) -> TriggerContext {
    TriggerContext::new("test_event", "tests", json!({})).with_user(user_id)
}

fn write_flow(user_id: &str) -> FlowDefinition {
    linear_flow(user_id, "test_event", vec![AutomationNode::action(uuid::Uuid::nil(), "write")])
}

#[derive(Default)]
struct RecordingHandler {
    seen: Mutex<Vec<String>>,
    fail: bool,
}

impl RecordingHandler {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl AutomationEventHandler for RecordingHandler {
    async fn handle(&self, event: &TriggerContext) -> Result<(), HandlerError> {
        self.seen.lock().unwrap().push(event.event_type.clone());
        if self.fail {
            return Err("handler exploded".into());
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_event_starts_matching_flows_of_its_user() {
    maltest::init_tracing();
    let stubs = stub_registry();

    let mine = write_flow(TEST_USER);
    let mine_id = mine.flow_id();
    let mut inactive = write_flow(TEST_USER);
    inactive.flow.is_active = false;
    let mut manual = write_flow(TEST_USER);
    manual.flow.trigger_type = TriggerType::Manual;
    let other_user = write_flow("user-2");
    let other_type = linear_flow(TEST_USER, "email_open", vec![]);

    let store = store_with([mine, inactive, manual, other_user, other_type]).await;
    let bus = bus_with(&store, &stubs, 10);

    let report = bus.process(event_for(TEST_USER)).await;

    assert!(!report.dropped);
    assert_eq!(report.matched, 1);
    let started: Vec<_> = report.started().collect();
    assert_eq!(started.len(), 1);
    assert_eq!(started[0].flow_id, mine_id);
    assert_eq!(started[0].status, ExecutionStatus::Succeeded);
    assert_eq!(stubs.write.runs(), 1);
    assert_eq!(store.execution_count().await, 1);
}

#[tokio::test]
async fn test_trigger_filter_is_applied() {
    let stubs = stub_registry();
    let mut definition = FlowDefinition::new(Flow::new(TEST_USER, "Filtered", TriggerType::Event).active());
    let flow_id = definition.flow_id();
    let trigger = definition.add_node(AutomationNode::trigger(flow_id, "test_event").with_config("campaignId", "c1"));
    let action = definition.add_node(AutomationNode::action(flow_id, "noop"));
    definition.connect(trigger, action);
    let store = store_with([definition]).await;
    let bus = bus_with(&store, &stubs, 10);

    let miss = TriggerContext::new("test_event", "tests", json!({ "campaignId": "c2" })).with_user(TEST_USER);
    assert_eq!(bus.process(miss).await.matched, 0);

    let hit = TriggerContext::new("test_event", "tests", json!({ "campaignId": "c1" })).with_user(TEST_USER);
    assert_eq!(bus.process(hit).await.matched, 1);
}

#[tokio::test]
async fn test_event_without_user_matches_nothing() {
    let stubs = stub_registry();
    let store = store_with([write_flow(TEST_USER)]).await;
    let bus = bus_with(&store, &stubs, 10);

    let report = bus
        .process(TriggerContext::new("test_event", "tests", json!({})))
        .await;

    assert_eq!(report.matched, 0);
    assert_eq!(store.execution_count().await, 0);
}

#[tokio::test]
async fn test_failing_flow_does_not_block_others() {
    let stubs = stub_registry();
    let failing = linear_flow(
        TEST_USER,
        "test_event",
        vec![AutomationNode::action(uuid::Uuid::nil(), "noop").with_config("fail", true)],
    );
    let failing_id = failing.flow_id();
    let store = store_with([failing, write_flow(TEST_USER)]).await;
    let bus = bus_with(&store, &stubs, 10);

    let report = bus.process(event_for(TEST_USER)).await;

    assert_eq!(report.matched, 2);
    assert_eq!(report.started().count(), 1);
    assert!(report
        .results
        .iter()
        .any(|r| matches!(r, FlowDispatch::Failed { flow_id, .. } if *flow_id == failing_id)));
    assert_eq!(stubs.write.runs(), 1);
}

#[tokio::test]
async fn test_handlers_run_after_dispatch_and_failures_are_swallowed() {
    let stubs = stub_registry();
    let store = store_with([write_flow(TEST_USER)]).await;
    let bus = bus_with(&store, &stubs, 10);

    let exact = Arc::new(RecordingHandler::default());
    let broken = Arc::new(RecordingHandler::failing());
    let wildcard = Arc::new(RecordingHandler::default());
    let unrelated = Arc::new(RecordingHandler::default());
    bus.on("test_event", exact.clone()).await;
    bus.on("test_event", broken.clone()).await;
    bus.on_any(wildcard.clone()).await;
    bus.on("email_open", unrelated.clone()).await;

    let report = bus.process(event_for(TEST_USER)).await;

    assert_eq!(report.handlers_invoked, 3);
    assert_eq!(report.handler_failures, 1);
    assert_eq!(exact.seen(), vec!["test_event"]);
    assert_eq!(broken.seen(), vec!["test_event"]);
    assert_eq!(wildcard.seen(), vec!["test_event"]);
    assert!(unrelated.seen().is_empty());
    assert_eq!(report.started().count(), 1);
}

#[tokio::test]
async fn test_buses_do_not_share_handlers() {
    let stubs = stub_registry();
    let store = store_with(Vec::new()).await;
    let first = bus_with(&store, &stubs, 10);
    let second = bus_with(&store, &stubs, 10);

    let handler = Arc::new(RecordingHandler::default());
    first.on_any(handler.clone()).await;

    second.process(event_for(TEST_USER)).await;
    assert!(handler.seen().is_empty());

    first.process(event_for(TEST_USER)).await;
    assert_eq!(handler.seen().len(), 1);
}

#[tokio::test]
async fn test_emit_stamps_and_processes_in_background() {
    let stubs = stub_registry();
    let store = store_with([write_flow(TEST_USER)]).await;
    let bus = bus_with(&store, &stubs, 10);

    let report = bus.emit(event_for(TEST_USER)).await.unwrap();

    assert_eq!(report.started().count(), 1);
    let execution_id = report.started().next().unwrap().execution_id;
    let execution = store.get_execution(execution_id).await.unwrap().unwrap();
    assert!(execution.trigger_context.timestamp.is_some());
}

#[tokio::test]
async fn test_event_is_dropped_at_capacity() {
    let stubs = stub_registry();
    let slow = linear_flow(
        TEST_USER,
        "test_event",
        vec![AutomationNode::action(uuid::Uuid::nil(), "noop").with_config("sleepMs", 10_000)],
    );
    let slow_id = slow.flow_id();
    let store = store_with([slow]).await;
    let bus = bus_with(&store, &stubs, 1);

    let handle = bus.emit(event_for(TEST_USER));
    for _ in 0..200 {
        if bus.active_executions() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(bus.active_executions(), 1);

    let report = bus.process(event_for(TEST_USER)).await;
    assert!(report.dropped);
    assert_eq!(report.matched, 0);

    let manual = bus.manual_trigger_flow(slow_id, json!({})).await;
    assert!(matches!(manual, Err(AutomationError::ConcurrencyLimit(1))));

    for execution_id in bus.runtime().running_executions().await {
        bus.runtime().cancel_execution(execution_id).await;
    }
    let first = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("cancelled execution finishes")
        .unwrap();
    assert_eq!(first.started().next().map(|s| s.status), Some(ExecutionStatus::Cancelled));
    assert_eq!(bus.active_executions(), 0);
}

#[tokio::test]
async fn test_manual_trigger_skips_matching() {
    let stubs = stub_registry();
    let mut definition = FlowDefinition::new(Flow::new(TEST_USER, "By hand", TriggerType::Manual));
    let flow_id = definition.flow_id();
    let trigger = definition.add_node(AutomationNode::trigger(flow_id, MANUAL_TRIGGER));
    let action = definition.add_node(AutomationNode::action(flow_id, "write"));
    definition.connect(trigger, action);
    let store = store_with([definition]).await;
    let bus = bus_with(&store, &stubs, 10);

    assert_eq!(bus.process(event_for(TEST_USER)).await.matched, 0);

    let summary = bus
        .manual_trigger_flow(flow_id, json!({ "contactId": "k1" }))
        .await
        .unwrap();

    assert_eq!(summary.status, ExecutionStatus::Succeeded);
    assert_eq!(stubs.write.runs(), 1);
    let execution = store.get_execution(summary.execution_id).await.unwrap().unwrap();
    assert_eq!(execution.trigger_context.event_type, MANUAL_TRIGGER);
    assert_eq!(execution.trigger_context.payload, json!({ "contactId": "k1" }));
}
