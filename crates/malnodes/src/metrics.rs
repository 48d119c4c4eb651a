use async_trait::async_trait;
use malcore::ports::CampaignMetrics;
use malcore::{Config, ConditionHandler, ConditionResult, ExecutionContext, FieldPath, NodeConfig, NodeError};
use serde_json::{json, Value};

/// Fetch the metrics of the campaign named at `field`, or explain why not.
async fn campaign_metrics(
    subtype: &str,
    field: &FieldPath,
    input: &Value,
    ctx: &ExecutionContext,
) -> Result<Result<CampaignMetrics, Value>, NodeError> {
    let Some(campaign_id) = field.resolve_id(input) else {
        return Ok(Err(json!({ "reason": format!("no campaign id at {}", field) })));
    };
    ctx.clients
        .metrics
        .get_campaign_metrics(&campaign_id)
        .await
        .map(Ok)
        .map_err(|e| NodeError::condition(subtype, format!("Failed to fetch metrics for campaign {}", campaign_id), e))
}

/// A campaign metric is strictly above a threshold
pub struct MetricGreaterCondition;

#[async_trait]
impl ConditionHandler for MetricGreaterCondition {
    fn subtype(&self) -> &str {
        "if_metric_greater"
    }

    fn description(&self) -> &str {
        "Compare a campaign metric with a threshold"
    }

    async fn evaluate(
        &self,
        config: &Config,
        input: &Value,
        ctx: &ExecutionContext,
    ) -> Result<ConditionResult, NodeError> {
        let cfg = NodeConfig::new(self.subtype(), config);
        let metric = cfg.require_str("metric")?;
        let threshold = cfg.require_f64("threshold")?;
        let campaign_field = cfg.path_or("campaignIdField", "event.campaignId")?;

        let metrics = match campaign_metrics(self.subtype(), &campaign_field, input, ctx).await? {
            Ok(metrics) => metrics,
            Err(diagnostic) => return Ok(ConditionResult::new(false, diagnostic)),
        };

        let Some(value) = metrics.get(metric) else {
            return Ok(ConditionResult::new(
                false,
                json!({
                    "campaignId": metrics.campaign_id,
                    "metric": metric,
                    "reason": "metric not reported",
                }),
            ));
        };

        Ok(ConditionResult::new(
            value > threshold,
            json!({
                "campaignId": metrics.campaign_id,
                "metric": metric,
                "value": value,
                "threshold": threshold,
            }),
        ))
    }
}

/// A campaign is in a given lifecycle status
pub struct CampaignStatusCondition;

#[async_trait]
impl ConditionHandler for CampaignStatusCondition {
    fn subtype(&self) -> &str {
        "if_campaign_status"
    }

    fn description(&self) -> &str {
        "Check a campaign's lifecycle status"
    }

    async fn evaluate(
        &self,
        config: &Config,
        input: &Value,
        ctx: &ExecutionContext,
    ) -> Result<ConditionResult, NodeError> {
        let cfg = NodeConfig::new(self.subtype(), config);
        let expected = cfg.require_str("status")?;
        let campaign_field = cfg.path_or("campaignIdField", "event.campaignId")?;

        let metrics = match campaign_metrics(self.subtype(), &campaign_field, input, ctx).await? {
            Ok(metrics) => metrics,
            Err(diagnostic) => return Ok(ConditionResult::new(false, diagnostic)),
        };

        let matched = metrics
            .status
            .as_deref()
            .map_or(false, |status| status.eq_ignore_ascii_case(expected));

        Ok(ConditionResult::new(
            matched,
            json!({
                "campaignId": metrics.campaign_id,
                "status": metrics.status,
                "expected": expected,
            }),
        ))
    }
}
