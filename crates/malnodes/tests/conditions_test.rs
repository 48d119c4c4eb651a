use chrono::{Duration, Utc};
use malcore::ports::CampaignMetrics;
use malcore::{ConditionHandler, NodeError, Outcome};
use malnodes::{
    CampaignStatusCondition, FieldMatchCondition, MatchOperator, MetricGreaterCondition, SegmentCondition,
    TagPresentCondition, TimeElapsedCondition,
};
use maltest::fixtures::{config, node_context};
use maltest::{ClientCall, MockBackend};
use serde_json::json;

#[tokio::test]
async fn test_field_contains_ignores_case() {
    let backend = MockBackend::new();
    let ctx = node_context(&backend);
    let input = json!({ "event": { "title": "Rock Night" } });

    let result = FieldMatchCondition
        .evaluate(
            &config(json!({ "field": "event.title", "operator": "contains", "value": "rock" })),
            &input,
            &ctx,
        )
        .await
        .unwrap();

    assert_eq!(result.outcome, Outcome::True);
    assert_eq!(result.output["actual"], "Rock Night");
    assert_eq!(result.output["operator"], "contains");
}

#[tokio::test]
async fn test_field_equals_is_case_sensitive() {
    let backend = MockBackend::new();
    let ctx = node_context(&backend);
    let input = json!({ "event": { "genre": "ROCK" } });

    let result = FieldMatchCondition
        .evaluate(
            &config(json!({ "field": "event.genre", "operator": "equals", "value": "rock" })),
            &input,
            &ctx,
        )
        .await
        .unwrap();

    assert_eq!(result.outcome, Outcome::False);
}

#[tokio::test]
async fn test_field_greater_than_needs_numbers() {
    let backend = MockBackend::new();
    let ctx = node_context(&backend);
    let cfg = config(json!({ "field": "event.count", "operator": "greater_than", "value": 5 }));

    let as_string = FieldMatchCondition
        .evaluate(&cfg, &json!({ "event": { "count": "10" } }), &ctx)
        .await
        .unwrap();
    assert_eq!(as_string.outcome, Outcome::False);

    let as_number = FieldMatchCondition
        .evaluate(&cfg, &json!({ "event": { "count": 10 } }), &ctx)
        .await
        .unwrap();
    assert_eq!(as_number.outcome, Outcome::True);
}

#[test]
fn test_match_operators() {
    assert_eq!(MatchOperator::parse("not_equals"), Some(MatchOperator::NotEquals));
    assert_eq!(MatchOperator::parse("matches"), None);

    assert!(MatchOperator::Equals.apply(Some(&json!("vip")), &json!("vip")));
    assert!(!MatchOperator::Equals.apply(Some(&json!("VIP")), &json!("vip")));
    assert!(MatchOperator::NotEquals.apply(Some(&json!("ROCK")), &json!("rock")));
    assert!(MatchOperator::Contains.apply(Some(&json!(["Rock", "Jazz"])), &json!("rock")));
    assert!(MatchOperator::Equals.apply(Some(&json!(3)), &json!(3.0)));
    assert!(!MatchOperator::Equals.apply(None, &json!("vip")));
    assert!(MatchOperator::NotEquals.apply(None, &json!("vip")));
    assert!(MatchOperator::Contains.apply(Some(&json!(["a", "b"])), &json!("b")));
    assert!(MatchOperator::LessThan.apply(Some(&json!(1)), &json!(2)));
    assert!(!MatchOperator::LessThan.apply(Some(&json!(true)), &json!(2)));
}

#[tokio::test]
async fn test_field_match_config_errors() {
    let backend = MockBackend::new();
    let ctx = node_context(&backend);
    let input = json!({ "event": {} });

    let unknown = FieldMatchCondition
        .evaluate(
            &config(json!({ "field": "event.x", "operator": "like", "value": 1 })),
            &input,
            &ctx,
        )
        .await;
    assert!(matches!(unknown, Err(NodeError::InvalidConfig { ref field, .. }) if field == "operator"));

    let missing = FieldMatchCondition
        .evaluate(&config(json!({ "operator": "equals" })), &input, &ctx)
        .await;
    assert!(matches!(missing, Err(NodeError::MissingConfig { ref field, .. }) if field == "field"));
}

#[tokio::test]
async fn test_segment_membership() {
    let backend = MockBackend::new();
    backend.set_segment("s1", ["k1"]);
    let ctx = node_context(&backend);
    let cfg = config(json!({ "segmentId": "s1" }));

    let member = SegmentCondition
        .evaluate(&cfg, &json!({ "event": { "contactId": "k1" } }), &ctx)
        .await
        .unwrap();
    assert_eq!(member.outcome, Outcome::True);

    let other = SegmentCondition
        .evaluate(&cfg, &json!({ "event": { "contactId": "k2" } }), &ctx)
        .await
        .unwrap();
    assert_eq!(other.outcome, Outcome::False);
    assert_eq!(backend.calls_to("list_segment_contacts").len(), 2);
}

#[tokio::test]
async fn test_missing_contact_is_false_without_lookup() {
    let backend = MockBackend::new();
    let ctx = node_context(&backend);

    let result = SegmentCondition
        .evaluate(&config(json!({ "segmentId": "s1" })), &json!({ "event": {} }), &ctx)
        .await
        .unwrap();

    assert_eq!(result.outcome, Outcome::False);
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test]
async fn test_metric_greater_than_threshold() {
    let backend = MockBackend::new();
    backend.set_metrics(CampaignMetrics::new("c1").with_metric("openRate", 60.0));
    let ctx = node_context(&backend);
    let input = json!({ "event": { "campaignId": "c1" } });

    let above = MetricGreaterCondition
        .evaluate(&config(json!({ "metric": "openRate", "threshold": 50 })), &input, &ctx)
        .await
        .unwrap();
    assert_eq!(above.outcome, Outcome::True);
    assert_eq!(above.output["value"], 60.0);

    let equal = MetricGreaterCondition
        .evaluate(&config(json!({ "metric": "openRate", "threshold": 60 })), &input, &ctx)
        .await
        .unwrap();
    assert_eq!(equal.outcome, Outcome::False);

    let unreported = MetricGreaterCondition
        .evaluate(&config(json!({ "metric": "clickRate", "threshold": 1 })), &input, &ctx)
        .await
        .unwrap();
    assert_eq!(unreported.outcome, Outcome::False);
    assert_eq!(backend.calls_to("get_campaign_metrics"), vec![ClientCall::GetMetrics("c1".to_string()); 3]);
}

#[tokio::test]
async fn test_metric_lookup_failure_is_condition_error() {
    let backend = MockBackend::new();
    let ctx = node_context(&backend);

    let result = MetricGreaterCondition
        .evaluate(
            &config(json!({ "metric": "openRate", "threshold": 50 })),
            &json!({ "event": { "campaignId": "unknown" } }),
            &ctx,
        )
        .await;

    assert!(matches!(result, Err(NodeError::Condition { ref subtype, .. }) if subtype == "if_metric_greater"));
}

#[tokio::test]
async fn test_campaign_status() {
    let backend = MockBackend::new();
    backend.set_metrics(CampaignMetrics::new("c1").with_status("Sent"));
    let ctx = node_context(&backend);
    let input = json!({ "event": { "campaignId": "c1" } });

    let sent = CampaignStatusCondition
        .evaluate(&config(json!({ "status": "sent" })), &input, &ctx)
        .await
        .unwrap();
    assert_eq!(sent.outcome, Outcome::True);

    let draft = CampaignStatusCondition
        .evaluate(&config(json!({ "status": "draft" })), &input, &ctx)
        .await
        .unwrap();
    assert_eq!(draft.outcome, Outcome::False);
}

#[tokio::test]
async fn test_tag_present_ignores_case() {
    let backend = MockBackend::new();
    let ctx = node_context(&backend);
    let input = json!({ "event": { "tags": ["VIP", "fan"] } });

    let present = TagPresentCondition
        .evaluate(&config(json!({ "tag": "vip" })), &input, &ctx)
        .await
        .unwrap();
    assert_eq!(present.outcome, Outcome::True);

    let absent = TagPresentCondition
        .evaluate(&config(json!({ "tag": "press" })), &input, &ctx)
        .await
        .unwrap();
    assert_eq!(absent.outcome, Outcome::False);
}

#[tokio::test]
async fn test_time_elapsed() {
    let backend = MockBackend::new();
    let ctx = node_context(&backend);
    let cfg = config(json!({ "sinceField": "event.sentAt", "minMinutes": 60 }));

    let two_hours_ago = Utc::now() - Duration::hours(2);
    let old = TimeElapsedCondition
        .evaluate(&cfg, &json!({ "event": { "sentAt": two_hours_ago.to_rfc3339() } }), &ctx)
        .await
        .unwrap();
    assert_eq!(old.outcome, Outcome::True);

    let recent_millis = (Utc::now() - Duration::minutes(5)).timestamp_millis();
    let recent = TimeElapsedCondition
        .evaluate(&cfg, &json!({ "event": { "sentAt": recent_millis } }), &ctx)
        .await
        .unwrap();
    assert_eq!(recent.outcome, Outcome::False);

    let missing = TimeElapsedCondition
        .evaluate(&cfg, &json!({ "event": {} }), &ctx)
        .await
        .unwrap();
    assert_eq!(missing.outcome, Outcome::False);
}
