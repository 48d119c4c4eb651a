use async_trait::async_trait;
use malcore::{Config, ConditionHandler, ConditionResult, ExecutionContext, NodeConfig, NodeError};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOperator {
    Equals,
    NotEquals,
    /// Case-insensitive substring for strings, membership for arrays.
    Contains,
    GreaterThan,
    LessThan,
}

impl MatchOperator {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "equals" => Some(MatchOperator::Equals),
            "not_equals" => Some(MatchOperator::NotEquals),
            "contains" => Some(MatchOperator::Contains),
            "greater_than" => Some(MatchOperator::GreaterThan),
            "less_than" => Some(MatchOperator::LessThan),
            _ => None,
        }
    }

    /// Compare the resolved field (`None` when absent) with the expected
    /// value. Never fails: mismatched types are simply `false`.
    pub fn apply(self, actual: Option<&Value>, expected: &Value) -> bool {
        match self {
            MatchOperator::Equals => actual.map_or(false, |a| loosely_equal(a, expected)),
            MatchOperator::NotEquals => actual.map_or(true, |a| !loosely_equal(a, expected)),
            MatchOperator::Contains => match actual {
                Some(Value::String(s)) => expected
                    .as_str()
                    .map_or(false, |needle| s.to_lowercase().contains(&needle.to_lowercase())),
                Some(Value::Array(items)) => items.iter().any(|item| match (item, expected) {
                    (Value::String(item), Value::String(needle)) => item.eq_ignore_ascii_case(needle),
                    _ => loosely_equal(item, expected),
                }),
                _ => false,
            },
            MatchOperator::GreaterThan => numbers(actual, expected).map_or(false, |(a, b)| a > b),
            MatchOperator::LessThan => numbers(actual, expected).map_or(false, |(a, b)| a < b),
        }
    }
}

/// Exact JSON equality, except that numbers compare by value.
fn loosely_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => a == b,
    }
}

fn numbers(actual: Option<&Value>, expected: &Value) -> Option<(f64, f64)> {
    match (actual?, expected) {
        (Value::Number(a), Value::Number(b)) => Some((a.as_f64()?, b.as_f64()?)),
        _ => None,
    }
}

/// Compares a step-input field against a configured value
pub struct FieldMatchCondition;

#[async_trait]
impl ConditionHandler for FieldMatchCondition {
    fn subtype(&self) -> &str {
        "if_field_match"
    }

    fn description(&self) -> &str {
        "Compare a field of the step input with a value"
    }

    async fn evaluate(
        &self,
        config: &Config,
        input: &Value,
        _ctx: &ExecutionContext,
    ) -> Result<ConditionResult, NodeError> {
        let cfg = NodeConfig::new(self.subtype(), config);
        let field = cfg.require_path("field")?;
        let raw_operator = cfg.require_str("operator")?;
        let operator = MatchOperator::parse(raw_operator)
            .ok_or_else(|| NodeError::invalid_config(self.subtype(), "operator", format!("unknown operator '{}'", raw_operator)))?;
        let expected = config.get("value").cloned().unwrap_or(Value::Null);

        let actual = field.resolve(input);
        let matched = operator.apply(actual, &expected);

        Ok(ConditionResult::new(
            matched,
            json!({
                "field": field,
                "operator": raw_operator,
                "expected": expected,
                "actual": actual,
            }),
        ))
    }
}
