// crates/malnodes/src/time.rs

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use malcore::{
    ActionHandler, Config, ConditionHandler, ConditionResult, EffectClass, ExecutionContext, NodeConfig, NodeError,
};
use serde_json::{json, Value};
use tokio::time::{sleep, Duration};

/// Sleep for `seconds`, giving up early if the execution is cancelled.
pub(crate) async fn wait(ctx: &ExecutionContext, subtype: &str, seconds: f64) -> Result<(), NodeError> {
    let duration = Duration::try_from_secs_f64(seconds)
        .map_err(|e| NodeError::invalid_config(subtype, "delaySeconds", e.to_string()))?;
    tokio::select! {
        _ = sleep(duration) => Ok(()),
        _ = ctx.cancellation.cancelled() => Err(NodeError::Cancelled),
    }
}

/// The instant `days` from now, if representable.
pub(crate) fn days_from_now(days: f64) -> Option<DateTime<Utc>> {
    let delta = chrono::Duration::try_seconds((days * 86_400.0) as i64)?;
    Utc::now().checked_add_signed(delta)
}

/// Pause the branch for a number of seconds
pub struct DelayAction;

#[async_trait]
impl ActionHandler for DelayAction {
    fn subtype(&self) -> &str {
        "delay"
    }

    fn description(&self) -> &str {
        "Wait before continuing the branch"
    }

    fn effect(&self) -> EffectClass {
        EffectClass::None
    }

    fn validate_config(&self, config: &Config) -> Vec<String> {
        let cfg = NodeConfig::new(self.subtype(), config);
        match cfg.opt_f64("delaySeconds") {
            Ok(Some(seconds)) if seconds > 0.0 => Vec::new(),
            _ => vec!["delaySeconds must be > 0".to_string()],
        }
    }

    async fn run(&self, config: &Config, _input: &Value, ctx: &ExecutionContext) -> Result<Value, NodeError> {
        let cfg = NodeConfig::new(self.subtype(), config);
        let seconds = cfg.require_f64("delaySeconds")?;
        if seconds <= 0.0 {
            return Err(NodeError::invalid_config(self.subtype(), "delaySeconds", "must be > 0"));
        }

        tracing::info!("Delaying execution for {} seconds", seconds);
        wait(ctx, self.subtype(), seconds).await?;

        Ok(json!({ "delaySeconds": seconds, "completedAt": Utc::now() }))
    }
}

/// RFC 3339 strings, or epoch milliseconds.
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s).ok().map(|t| t.with_timezone(&Utc)),
        Value::Number(n) => Utc.timestamp_millis_opt(n.as_i64()?).single(),
        _ => None,
    }
}

/// At least `minMinutes` have passed since a timestamp in the step input
pub struct TimeElapsedCondition;

#[async_trait]
impl ConditionHandler for TimeElapsedCondition {
    fn subtype(&self) -> &str {
        "if_time_elapsed"
    }

    fn description(&self) -> &str {
        "Check that enough time has passed since a timestamp"
    }

    async fn evaluate(
        &self,
        config: &Config,
        input: &Value,
        _ctx: &ExecutionContext,
    ) -> Result<ConditionResult, NodeError> {
        let cfg = NodeConfig::new(self.subtype(), config);
        let since_field = cfg.require_path("sinceField")?;
        let min_minutes = cfg.require_f64("minMinutes")?;

        let Some(since) = since_field.resolve(input).and_then(parse_timestamp) else {
            return Ok(ConditionResult::new(
                false,
                json!({ "reason": format!("no timestamp at {}", since_field) }),
            ));
        };

        let elapsed_minutes = (Utc::now() - since).num_seconds() as f64 / 60.0;
        Ok(ConditionResult::new(
            elapsed_minutes >= min_minutes,
            json!({
                "since": since,
                "elapsedMinutes": elapsed_minutes,
                "minMinutes": min_minutes,
            }),
        ))
    }
}
