use crate::context::ExecutionContext;
use crate::error::NodeError;
use crate::events::TriggerContext;
use crate::model::{Config, Outcome};
use crate::path::FieldPath;
use crate::safety::EffectClass;
use async_trait::async_trait;
use serde_json::Value;

/// Decides whether an event fires a trigger node, and seeds the first input.
pub trait TriggerHandler: Send + Sync {
    /// Trigger subtype, which is also the event type it listens for.
    fn subtype(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Subtype-specific filter over node config and event payload.
    /// A filter field absent from the config places no constraint.
    fn matches(&self, config: &Config, event: &TriggerContext) -> Result<bool, NodeError>;

    /// Key the enrichment object is stored under in the seed input.
    fn context_key(&self) -> &str;

    /// Subtype-specific view of the event, e.g. `emailContext`.
    fn enrich(&self, event: &TriggerContext) -> Value;
}

/// Pure branching decision over step input and read-only client state.
#[async_trait]
pub trait ConditionHandler: Send + Sync {
    fn subtype(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Missing config is an error; missing input data is an `Outcome::False`.
    async fn evaluate(
        &self,
        config: &Config,
        input: &Value,
        ctx: &ExecutionContext,
    ) -> Result<ConditionResult, NodeError>;
}

/// One side effect against an external system.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    fn subtype(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Counters bumped after a successful run.
    fn effect(&self) -> EffectClass;

    /// Human-readable problems with the config; empty when valid.
    fn validate_config(&self, _config: &Config) -> Vec<String> {
        Vec::new()
    }

    async fn run(&self, config: &Config, input: &Value, ctx: &ExecutionContext) -> Result<Value, NodeError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConditionResult {
    pub outcome: Outcome,
    /// Diagnostics recorded on the execution step.
    pub output: Value,
}

impl ConditionResult {
    pub fn new(outcome: impl Into<Outcome>, output: Value) -> Self {
        Self {
            outcome: outcome.into(),
            output,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionResult {
    pub success: bool,
    pub output: Value,
}

/// Typed accessors over a node's free-form config.
///
/// JSON `null` and empty strings count as absent.
pub struct NodeConfig<'a> {
    subtype: &'a str,
    config: &'a Config,
}

impl<'a> NodeConfig<'a> {
    pub fn new(subtype: &'a str, config: &'a Config) -> Self {
        Self { subtype, config }
    }

    pub fn value(&self, field: &str) -> Option<&'a Value> {
        match self.config.get(field)? {
            Value::Null => None,
            Value::String(s) if s.trim().is_empty() => None,
            v => Some(v),
        }
    }

    pub fn has(&self, field: &str) -> bool {
        self.value(field).is_some()
    }

    fn missing(&self, field: &str) -> NodeError {
        NodeError::MissingConfig {
            subtype: self.subtype.to_string(),
            field: field.to_string(),
        }
    }

    fn invalid(&self, field: &str, reason: &str) -> NodeError {
        NodeError::invalid_config(self.subtype, field, reason)
    }

    pub fn require_str(&self, field: &str) -> Result<&'a str, NodeError> {
        self.opt_str(field)?.ok_or_else(|| self.missing(field))
    }

    pub fn opt_str(&self, field: &str) -> Result<Option<&'a str>, NodeError> {
        match self.value(field) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(_) => Err(self.invalid(field, "expected a string")),
        }
    }

    /// Identifier filter: strings, or numbers rendered as text.
    pub fn opt_id(&self, field: &str) -> Result<Option<String>, NodeError> {
        match self.value(field) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(_) => Err(self.invalid(field, "expected a string or number")),
        }
    }

    pub fn require_f64(&self, field: &str) -> Result<f64, NodeError> {
        self.opt_f64(field)?.ok_or_else(|| self.missing(field))
    }

    /// Numbers, or strings that parse as numbers.
    pub fn opt_f64(&self, field: &str) -> Result<Option<f64>, NodeError> {
        match self.value(field) {
            None => Ok(None),
            Some(Value::Number(n)) => Ok(n.as_f64()),
            Some(Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .map(Some)
                .map_err(|_| self.invalid(field, "expected a number")),
            Some(_) => Err(self.invalid(field, "expected a number")),
        }
    }

    /// A list of strings; a lone string is a one-element list.
    pub fn opt_str_list(&self, field: &str) -> Result<Option<Vec<String>>, NodeError> {
        match self.value(field) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(vec![s.clone()])),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| self.invalid(field, "expected a list of strings"))
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Some),
            Some(_) => Err(self.invalid(field, "expected a list of strings")),
        }
    }

    pub fn require_path(&self, field: &str) -> Result<FieldPath, NodeError> {
        let raw = self.require_str(field)?;
        FieldPath::parse(raw).map_err(|e| self.invalid(field, &e.to_string()))
    }

    /// Configured path, or `default` when the field is absent.
    pub fn path_or(&self, field: &str, default: &str) -> Result<FieldPath, NodeError> {
        let raw = self.opt_str(field)?.unwrap_or(default);
        FieldPath::parse(raw).map_err(|e| self.invalid(field, &e.to_string()))
    }
}
