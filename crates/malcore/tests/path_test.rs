use malcore::{FieldPath, PathError};
use serde_json::json;

#[test]
fn test_parse_and_resolve_nested_field() {
    let path = FieldPath::parse("event.contact.id").unwrap();
    let input = json!({ "event": { "contact": { "id": "k1" } } });

    assert_eq!(path.segments(), ["event", "contact", "id"]);
    assert_eq!(path.resolve_str(&input), Some("k1"));
}

#[test]
fn test_numeric_segment_indexes_arrays() {
    let path = FieldPath::parse("event.tags.1").unwrap();
    let input = json!({ "event": { "tags": ["vip", "engaged"] } });

    assert_eq!(path.resolve_str(&input), Some("engaged"));
}

#[test]
fn test_null_and_missing_values_are_absent() {
    let input = json!({ "event": { "contactId": null } });

    assert!(FieldPath::event("contactId").resolve(&input).is_none());
    assert!(FieldPath::event("campaignId").resolve(&input).is_none());
    assert!(FieldPath::parse("event.contactId.deeper").unwrap().resolve(&input).is_none());
}

#[test]
fn test_resolve_id_accepts_strings_and_numbers() {
    let input = json!({ "event": { "contactId": 42, "campaignId": "", "releaseId": "r1" } });

    assert_eq!(FieldPath::event("contactId").resolve_id(&input), Some("42".to_string()));
    assert_eq!(FieldPath::event("campaignId").resolve_id(&input), None, "empty strings are not ids");
    assert_eq!(FieldPath::event("releaseId").resolve_id(&input), Some("r1".to_string()));
}

#[test]
fn test_malformed_paths_are_rejected() {
    assert_eq!(FieldPath::parse("  "), Err(PathError::Empty));
    assert!(matches!(FieldPath::parse("event..contactId"), Err(PathError::EmptySegment(_))));
    assert!(matches!(FieldPath::parse(".event"), Err(PathError::EmptySegment(_))));
}

#[test]
fn test_path_keeps_its_string_form_in_json() {
    let path: FieldPath = serde_json::from_value(json!("event.campaignId")).unwrap();

    assert_eq!(path, FieldPath::event("campaignId"));
    assert_eq!(serde_json::to_value(&path).unwrap(), json!("event.campaignId"));
    assert_eq!(path.to_string(), "event.campaignId");
}
