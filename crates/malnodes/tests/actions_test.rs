use malcore::{
    ActionHandler, AutomationNode, EffectClass, ExecutionLimits, NodeError, SafetyMetrics,
};
use malnodes::{
    CreateReleaseTaskAction, DelayAction, LogEventAction, NotifyUserAction, ScheduleFollowupAction,
    SendEmailCampaignAction, TagContactAction, UpdateOutcomeLogAction, UpdateSegmentAction,
};
use malruntime::run_action_node;
use maltest::fixtures::{config, node_context};
use maltest::{ClientCall, MockBackend};
use serde_json::json;
use std::time::Duration;

fn contact_input(contact_id: &str) -> serde_json::Value {
    json!({ "event": { "contactId": contact_id, "campaignId": "c1", "releaseId": "r1" } })
}

#[tokio::test]
async fn test_tag_contact() {
    let backend = MockBackend::new();
    let ctx = node_context(&backend);

    let output = TagContactAction
        .run(&config(json!({ "tag": "engaged" })), &contact_input("k1"), &ctx)
        .await
        .unwrap();

    assert_eq!(output, json!({ "contactId": "k1", "tag": "engaged" }));
    assert_eq!(backend.tags_for("k1"), vec!["engaged"]);
    assert_eq!(TagContactAction.effect(), EffectClass::ContactWrite);
}

#[tokio::test]
async fn test_missing_contact_fails_before_any_call() {
    let backend = MockBackend::new();
    let ctx = node_context(&backend);

    let result = TagContactAction
        .run(&config(json!({ "tag": "engaged" })), &json!({ "event": {} }), &ctx)
        .await;

    assert!(matches!(result, Err(NodeError::MissingInput { ref path, .. }) if path == "event.contactId"));
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test]
async fn test_missing_config_makes_no_call() {
    let backend = MockBackend::new();
    let ctx = node_context(&backend);

    let result = TagContactAction
        .run(&config(json!({})), &contact_input("k1"), &ctx)
        .await;

    assert!(matches!(result, Err(NodeError::MissingConfig { ref field, .. }) if field == "tag"));
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test]
async fn test_client_failure_is_wrapped() {
    let backend = MockBackend::new();
    backend.fail_on("tag_contact");
    let ctx = node_context(&backend);

    let err = TagContactAction
        .run(&config(json!({ "tag": "engaged" })), &contact_input("k1"), &ctx)
        .await
        .unwrap_err();

    assert!(matches!(err, NodeError::Action { ref subtype, .. } if subtype == "tag_contact"));
    assert!(err.to_string().starts_with("Failed to execute action tag_contact"));
}

#[tokio::test]
async fn test_contact_id_from_custom_field() {
    let backend = MockBackend::new();
    let ctx = node_context(&backend);

    TagContactAction
        .run(
            &config(json!({ "tag": "vip", "contactIdField": "previousNode.output.contactId" })),
            &json!({ "previousNode": { "output": { "contactId": 7 } } }),
            &ctx,
        )
        .await
        .unwrap();

    assert_eq!(backend.tags_for("7"), vec!["vip"]);
}

#[tokio::test]
async fn test_send_email_campaign() {
    let backend = MockBackend::new();
    let ctx = node_context(&backend);
    let cfg = config(json!({
        "subject": "Tour dates",
        "body": "See you there",
        "fromEmail": "band@example.com",
        "toSegmentId": "s1",
    }));

    let output = SendEmailCampaignAction
        .run(&cfg, &contact_input("k1"), &ctx)
        .await
        .unwrap();

    assert_eq!(output, json!({ "campaignId": "campaign-1" }));
    let calls = backend.calls();
    assert_eq!(calls.len(), 2);
    match &calls[0] {
        ClientCall::CreateCampaign(draft) => {
            assert_eq!(draft.name, "Automation: Tour dates");
            assert_eq!(draft.to_segment_id.as_deref(), Some("s1"));
        }
        other => panic!("unexpected call {:?}", other),
    }
    assert_eq!(calls[1], ClientCall::SendCampaign("campaign-1".to_string()));
}

#[test]
fn test_send_email_requires_recipients() {
    let problems = SendEmailCampaignAction.validate_config(&config(json!({
        "subject": "Tour dates",
        "body": "See you there",
    })));

    assert_eq!(
        problems,
        vec![
            "fromEmail is required".to_string(),
            "Either toSegmentId or toContactIds is required".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_schedule_followup() {
    let backend = MockBackend::new();
    let ctx = node_context(&backend);
    let cfg = config(json!({
        "subject": "Did you see?",
        "body": "Reminder",
        "fromEmail": "band@example.com",
        "delayDays": 3,
    }));

    let output = ScheduleFollowupAction
        .run(&cfg, &contact_input("k1"), &ctx)
        .await
        .unwrap();

    assert_eq!(output["campaignId"], "campaign-1");
    assert_eq!(output["originalCampaignId"], "c1");
    let scheduled = backend.calls_to("schedule_campaign");
    assert_eq!(scheduled.len(), 1);
    match &scheduled[0] {
        ClientCall::ScheduleCampaign { campaign_id, send_at } => {
            assert_eq!(campaign_id, "campaign-1");
            let days = (*send_at - chrono::Utc::now()).num_hours();
            assert!((71..=72).contains(&days));
        }
        other => panic!("unexpected call {:?}", other),
    }
}

#[tokio::test]
async fn test_schedule_followup_rejects_non_positive_delay() {
    let backend = MockBackend::new();
    let ctx = node_context(&backend);
    let cfg = config(json!({
        "subject": "s",
        "body": "b",
        "fromEmail": "f@example.com",
        "delayDays": 0,
    }));

    let result = ScheduleFollowupAction.run(&cfg, &contact_input("k1"), &ctx).await;

    assert!(matches!(result, Err(NodeError::InvalidConfig { ref field, .. }) if field == "delayDays"));
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test]
async fn test_schedule_followup_rejects_unrepresentable_delay() {
    let backend = MockBackend::new();
    let ctx = node_context(&backend);
    let cfg = config(json!({
        "subject": "s",
        "body": "b",
        "fromEmail": "f@example.com",
        "delayDays": 1e12,
    }));

    let result = ScheduleFollowupAction.run(&cfg, &contact_input("k1"), &ctx).await;

    assert!(matches!(result, Err(NodeError::InvalidConfig { ref field, .. }) if field == "delayDays"));
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test]
async fn test_update_segment_add_and_remove() {
    let backend = MockBackend::new();
    let ctx = node_context(&backend);

    UpdateSegmentAction
        .run(&config(json!({ "segmentId": "s1", "action": "add" })), &contact_input("k1"), &ctx)
        .await
        .unwrap();
    assert_eq!(backend.segment_members("s1"), vec!["k1"]);

    UpdateSegmentAction
        .run(&config(json!({ "segmentId": "s1", "action": "remove" })), &contact_input("k1"), &ctx)
        .await
        .unwrap();
    assert!(backend.segment_members("s1").is_empty());

    let invalid = UpdateSegmentAction
        .run(&config(json!({ "segmentId": "s1", "action": "move" })), &contact_input("k1"), &ctx)
        .await;
    assert!(matches!(invalid, Err(NodeError::InvalidConfig { .. })));
    assert_eq!(
        UpdateSegmentAction.validate_config(&config(json!({ "segmentId": "s1", "action": "move" }))),
        vec!["action must be \"add\" or \"remove\"".to_string()]
    );
}

#[tokio::test]
async fn test_create_release_task() {
    let backend = MockBackend::new();
    let ctx = node_context(&backend);

    let output = CreateReleaseTaskAction
        .run(
            &config(json!({ "title": "Book studio", "dueDateDays": 7 })),
            &contact_input("k1"),
            &ctx,
        )
        .await
        .unwrap();

    assert_eq!(output["taskId"], "task-1");
    assert_eq!(output["releaseId"], "r1");
    assert!(output["dueDate"].is_string());
    match &backend.calls()[0] {
        ClientCall::CreateTask(task) => assert_eq!(task.title, "Book studio"),
        other => panic!("unexpected call {:?}", other),
    }
}

#[tokio::test]
async fn test_outcome_log_routes_by_type() {
    let backend = MockBackend::new();
    let ctx = node_context(&backend);

    UpdateOutcomeLogAction
        .run(&config(json!({ "outcome": "opened twice" })), &contact_input("k1"), &ctx)
        .await
        .unwrap();
    let output = UpdateOutcomeLogAction
        .run(
            &config(json!({ "outcome": "no reply", "logType": "attempt" })),
            &contact_input("k1"),
            &ctx,
        )
        .await
        .unwrap();

    assert_eq!(output["logType"], "attempt");
    assert_eq!(backend.calls_to("log_success_pattern").len(), 1);
    match &backend.calls_to("log_attempt")[0] {
        ClientCall::LogAttempt(record) => {
            assert_eq!(record.contact_id.as_deref(), Some("k1"));
            assert_eq!(record.campaign_id.as_deref(), Some("c1"));
            assert_eq!(record.metadata["source"], "automation");
            assert_eq!(record.metadata["executionId"], json!(ctx.execution_id));
        }
        other => panic!("unexpected call {:?}", other),
    }
}

#[tokio::test]
async fn test_internal_actions_touch_no_client() {
    let backend = MockBackend::new();
    let ctx = node_context(&backend);

    let logged = LogEventAction
        .run(
            &config(json!({ "message": "hello", "level": "warn", "data": { "n": 1 } })),
            &json!({}),
            &ctx,
        )
        .await
        .unwrap();
    assert_eq!(logged["level"], "warn");
    assert_eq!(logged["customData"], json!({ "n": 1 }));

    let defaults = LogEventAction.run(&config(json!({})), &json!({}), &ctx).await.unwrap();
    assert_eq!(defaults["message"], "Automation log event");
    assert_eq!(defaults["level"], "info");

    let notified = NotifyUserAction
        .run(&config(json!({ "message": "Flow ran" })), &json!({}), &ctx)
        .await
        .unwrap();
    assert_eq!(notified["notificationType"], "info");

    assert_eq!(backend.call_count(), 0);
    assert_eq!(NotifyUserAction.effect(), EffectClass::None);
}

#[tokio::test]
async fn test_delay_waits_and_honours_cancellation() {
    let backend = MockBackend::new();
    let ctx = node_context(&backend);

    let output = DelayAction
        .run(&config(json!({ "delaySeconds": 0.01 })), &json!({}), &ctx)
        .await
        .unwrap();
    assert_eq!(output["delaySeconds"], 0.01);

    let token = ctx.cancellation.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
    });
    let cancelled = DelayAction
        .run(&config(json!({ "delaySeconds": 60 })), &json!({}), &ctx)
        .await;
    assert!(matches!(cancelled, Err(NodeError::Cancelled)));

    let zero = DelayAction.run(&config(json!({ "delaySeconds": 0 })), &json!({}), &ctx).await;
    assert!(matches!(zero, Err(NodeError::InvalidConfig { .. })));
    assert_eq!(
        DelayAction.validate_config(&config(json!({}))),
        vec!["delaySeconds must be > 0".to_string()]
    );
}

#[tokio::test]
async fn test_exhausted_budget_reaches_no_client() {
    let backend = MockBackend::new();
    let mut ctx = node_context(&backend);
    ctx.limits = ExecutionLimits {
        max_contact_actions: 1,
        ..Default::default()
    };
    let registry = malnodes::standard_registry();
    let node = AutomationNode::action(uuid::Uuid::nil(), "tag_contact").with_config("tag", "engaged");
    let mut metrics = SafetyMetrics::new();

    run_action_node(&registry, &node, &ctx, &contact_input("k1"), &mut metrics)
        .await
        .unwrap();
    assert_eq!(metrics.contact_actions_performed, 1);
    assert_eq!(metrics.external_writes, 1);

    let err = run_action_node(&registry, &node, &ctx, &contact_input("k2"), &mut metrics)
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "Max contact actions exceeded (1)");
    assert_eq!(backend.call_count(), 1);
    assert_eq!(metrics.actions_executed, 1);
}
