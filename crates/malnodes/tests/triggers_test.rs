use malcore::{NodeError, TriggerContext, TriggerHandler, MANUAL_TRIGGER};
use malnodes::triggers::{
    ManualTrigger, CAMPAIGN_STATUS_CHANGED, CONTACT_TAGGED, EMAIL_CLICK, EMAIL_OPEN, EMAIL_REPLY, RELEASE_CREATED,
    SEGMENT_JOINED,
};
use maltest::fixtures::{config, email_open, TEST_USER};
use serde_json::{json, Value};

fn event(event_type: &str, payload: Value) -> TriggerContext {
    TriggerContext::new(event_type, "tests", payload).with_user(TEST_USER)
}

#[test]
fn test_email_open_filters_on_campaign() {
    let open = email_open(TEST_USER, "c1", "k1");

    assert!(EMAIL_OPEN.matches(&config(json!({ "campaignId": "c1" })), &open).unwrap());
    assert!(!EMAIL_OPEN.matches(&config(json!({ "campaignId": "c2" })), &open).unwrap());
    // No filter configured: every open matches.
    assert!(EMAIL_OPEN.matches(&config(json!({})), &open).unwrap());
}

#[test]
fn test_numeric_ids_compare_as_text() {
    let open = event("email_open", json!({ "campaignId": 42 }));
    assert!(EMAIL_OPEN.matches(&config(json!({ "campaignId": "42" })), &open).unwrap());
    assert!(EMAIL_OPEN.matches(&config(json!({ "campaignId": 42 })), &open).unwrap());
}

#[test]
fn test_filter_with_wrong_type_is_config_error() {
    let open = email_open(TEST_USER, "c1", "k1");
    let result = EMAIL_OPEN.matches(&config(json!({ "campaignId": true })), &open);
    assert!(matches!(result, Err(NodeError::InvalidConfig { ref field, .. }) if field == "campaignId"));
}

#[test]
fn test_email_click_link_filter_is_case_sensitive() {
    let click = event(
        "email_click",
        json!({ "campaignId": "c1", "linkUrl": "https://example.com/Tickets" }),
    );

    assert!(EMAIL_CLICK
        .matches(&config(json!({ "campaignId": "c1", "linkUrlContains": "Tickets" })), &click)
        .unwrap());
    assert!(!EMAIL_CLICK
        .matches(&config(json!({ "linkUrlContains": "tickets" })), &click)
        .unwrap());
}

#[test]
fn test_email_reply_keyword_ignores_case() {
    let reply = event("email_reply", json!({ "campaignId": "c1", "replyText": "Count me IN please" }));
    assert!(EMAIL_REPLY.matches(&config(json!({ "requiredKeyword": "in" })), &reply).unwrap());

    let no_text = event("email_reply", json!({ "campaignId": "c1" }));
    assert!(!EMAIL_REPLY.matches(&config(json!({ "requiredKeyword": "in" })), &no_text).unwrap());
}

#[test]
fn test_contact_tagged_requires_every_tag() {
    let tagged = event("contact_tagged", json!({ "contactId": "k1", "tags": ["vip", "fan"] }));

    assert!(CONTACT_TAGGED
        .matches(&config(json!({ "requiredTags": ["vip"] })), &tagged)
        .unwrap());
    assert!(CONTACT_TAGGED
        .matches(&config(json!({ "requiredTags": ["vip", "fan"] })), &tagged)
        .unwrap());
    assert!(!CONTACT_TAGGED
        .matches(&config(json!({ "requiredTags": ["vip", "press"] })), &tagged)
        .unwrap());
}

#[test]
fn test_status_change_and_segment_and_release_filters() {
    let changed = event(
        "campaign_status_changed",
        json!({ "campaignId": "c1", "fromStatus": "draft", "toStatus": "sent" }),
    );
    assert!(CAMPAIGN_STATUS_CHANGED
        .matches(&config(json!({ "toStatus": "sent" })), &changed)
        .unwrap());
    assert!(!CAMPAIGN_STATUS_CHANGED
        .matches(&config(json!({ "fromStatus": "scheduled" })), &changed)
        .unwrap());

    let joined = event("segment_joined", json!({ "contactId": "k1", "segmentId": "s1" }));
    assert!(SEGMENT_JOINED.matches(&config(json!({ "segmentId": "s1" })), &joined).unwrap());
    assert!(!SEGMENT_JOINED.matches(&config(json!({ "segmentId": "s2" })), &joined).unwrap());

    let release = event("release_created", json!({ "releaseId": "r1", "releaseType": "single" }));
    assert!(RELEASE_CREATED.matches(&config(json!({ "releaseType": "single" })), &release).unwrap());
    assert!(!RELEASE_CREATED.matches(&config(json!({ "releaseType": "album" })), &release).unwrap());
}

#[test]
fn test_enrichment_copies_known_fields() {
    let open = event(
        "email_open",
        json!({ "campaignId": "c1", "contactId": "k1", "emailId": null, "extra": 1 }),
    )
    .stamped();

    let context = EMAIL_OPEN.enrich(&open);

    assert_eq!(EMAIL_OPEN.context_key(), "emailContext");
    assert_eq!(context["campaignId"], "c1");
    assert_eq!(context["contactId"], "k1");
    assert!(context.get("emailId").is_none());
    assert!(context.get("extra").is_none());
    assert!(context["receivedAt"].is_string());
}

#[test]
fn test_manual_trigger_never_matches_events() {
    let manual = TriggerContext::manual(json!({ "note": "hi" }))
        .with_user(TEST_USER)
        .stamped();

    assert_eq!(ManualTrigger.subtype(), MANUAL_TRIGGER);
    assert!(!ManualTrigger.matches(&config(json!({})), &manual).unwrap());

    let context = ManualTrigger.enrich(&manual);
    assert_eq!(ManualTrigger.context_key(), "manualContext");
    assert_eq!(context["triggeredBy"], TEST_USER);
    assert_eq!(context["payload"], json!({ "note": "hi" }));
}
