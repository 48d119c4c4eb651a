use malcore::{Config, NodeConfig, NodeError, TriggerContext, TriggerHandler, MANUAL_TRIGGER};
use serde_json::{json, Value};

/// One constraint a trigger node's config places on the event payload.
/// Every filter is skipped when its config field is absent.
enum Filter {
    /// Config value equals the payload value under the same key.
    Exact(&'static str),
    /// Payload string contains the config value.
    Contains {
        config: &'static str,
        payload: &'static str,
        ignore_case: bool,
    },
    /// Every configured tag appears in the payload list.
    AllOf { config: &'static str, payload: &'static str },
}

impl Filter {
    fn passes(&self, config: &NodeConfig<'_>, payload: &Value) -> Result<bool, NodeError> {
        match self {
            Filter::Exact(key) => {
                let Some(expected) = config.opt_id(key)? else {
                    return Ok(true);
                };
                Ok(payload_id(payload, key).as_deref() == Some(expected.as_str()))
            }
            Filter::Contains {
                config: key,
                payload: field,
                ignore_case,
            } => {
                let Some(needle) = config.opt_str(key)? else {
                    return Ok(true);
                };
                let Some(haystack) = payload.get(*field).and_then(Value::as_str) else {
                    return Ok(false);
                };
                Ok(if *ignore_case {
                    haystack.to_lowercase().contains(&needle.to_lowercase())
                } else {
                    haystack.contains(needle)
                })
            }
            Filter::AllOf { config: key, payload: field } => {
                let Some(required) = config.opt_str_list(key)? else {
                    return Ok(true);
                };
                let present: Vec<&str> = payload
                    .get(*field)
                    .and_then(Value::as_array)
                    .map(|tags| tags.iter().filter_map(Value::as_str).collect())
                    .unwrap_or_default();
                Ok(required.iter().all(|tag| present.contains(&tag.as_str())))
            }
        }
    }
}

fn payload_id(payload: &Value, key: &str) -> Option<String> {
    match payload.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Event-driven trigger described by its filters and the payload fields
/// copied into its context object.
pub struct EventTrigger {
    subtype: &'static str,
    description: &'static str,
    context_key: &'static str,
    filters: &'static [Filter],
    context_fields: &'static [&'static str],
}

impl TriggerHandler for EventTrigger {
    fn subtype(&self) -> &str {
        self.subtype
    }

    fn description(&self) -> &str {
        self.description
    }

    fn matches(&self, config: &Config, event: &TriggerContext) -> Result<bool, NodeError> {
        let config = NodeConfig::new(self.subtype, config);
        for filter in self.filters {
            if !filter.passes(&config, &event.payload)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn context_key(&self) -> &str {
        self.context_key
    }

    fn enrich(&self, event: &TriggerContext) -> Value {
        let mut context = serde_json::Map::new();
        for field in self.context_fields {
            if let Some(value) = event.payload.get(*field).filter(|v| !v.is_null()) {
                context.insert(field.to_string(), value.clone());
            }
        }
        context.insert("receivedAt".to_string(), json!(event.timestamp));
        Value::Object(context)
    }
}

pub const EMAIL_OPEN: EventTrigger = EventTrigger {
    subtype: "email_open",
    description: "Contact opened a campaign email",
    context_key: "emailContext",
    filters: &[Filter::Exact("campaignId")],
    context_fields: &["campaignId", "contactId", "emailId"],
};

pub const EMAIL_CLICK: EventTrigger = EventTrigger {
    subtype: "email_click",
    description: "Contact clicked a link in a campaign email",
    context_key: "emailContext",
    filters: &[
        Filter::Exact("campaignId"),
        Filter::Contains {
            config: "linkUrlContains",
            payload: "linkUrl",
            ignore_case: false,
        },
    ],
    context_fields: &["campaignId", "contactId", "emailId", "linkUrl"],
};

pub const EMAIL_REPLY: EventTrigger = EventTrigger {
    subtype: "email_reply",
    description: "Contact replied to a campaign email",
    context_key: "emailContext",
    filters: &[
        Filter::Exact("campaignId"),
        Filter::Contains {
            config: "requiredKeyword",
            payload: "replyText",
            ignore_case: true,
        },
    ],
    context_fields: &["campaignId", "contactId", "emailId", "replyText"],
};

pub const CONTACT_TAGGED: EventTrigger = EventTrigger {
    subtype: "contact_tagged",
    description: "Contact received one or more tags",
    context_key: "contactContext",
    filters: &[Filter::AllOf {
        config: "requiredTags",
        payload: "tags",
    }],
    context_fields: &["contactId", "tags"],
};

pub const CAMPAIGN_STATUS_CHANGED: EventTrigger = EventTrigger {
    subtype: "campaign_status_changed",
    description: "Campaign moved between lifecycle states",
    context_key: "campaignContext",
    filters: &[
        Filter::Exact("campaignId"),
        Filter::Exact("fromStatus"),
        Filter::Exact("toStatus"),
    ],
    context_fields: &["campaignId", "fromStatus", "toStatus"],
};

pub const SEGMENT_JOINED: EventTrigger = EventTrigger {
    subtype: "segment_joined",
    description: "Contact joined a segment",
    context_key: "contactContext",
    filters: &[Filter::Exact("segmentId")],
    context_fields: &["contactId", "segmentId"],
};

pub const RELEASE_CREATED: EventTrigger = EventTrigger {
    subtype: "release_created",
    description: "A release was created",
    context_key: "releaseContext",
    filters: &[Filter::Exact("releaseType")],
    context_fields: &["releaseId", "releaseType", "title", "releaseDate"],
};

/// Entry node of flows started by hand. Never matches routed events.
pub struct ManualTrigger;

impl TriggerHandler for ManualTrigger {
    fn subtype(&self) -> &str {
        MANUAL_TRIGGER
    }

    fn description(&self) -> &str {
        "Started explicitly by a user"
    }

    fn matches(&self, _config: &Config, _event: &TriggerContext) -> Result<bool, NodeError> {
        Ok(false)
    }

    fn context_key(&self) -> &str {
        "manualContext"
    }

    fn enrich(&self, event: &TriggerContext) -> Value {
        json!({
            "triggeredBy": event.user_id(),
            "triggeredAt": event.timestamp,
            "payload": event.payload,
        })
    }
}
