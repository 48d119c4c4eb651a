use malcore::{
    ActionResult, AutomationNode, ConditionResult, ExecutionContext, NodeError, NodeRegistry,
    NodeType, SafetyMetrics,
};
use serde_json::Value;

/// Evaluate a condition node against its step input.
pub async fn evaluate_condition_node(
    registry: &NodeRegistry,
    node: &AutomationNode,
    ctx: &ExecutionContext,
    input: &Value,
) -> Result<ConditionResult, NodeError> {
    let handler = registry
        .condition(&node.subtype)
        .ok_or_else(|| NodeError::UnknownSubtype {
            node_type: NodeType::Condition,
            subtype: node.subtype.clone(),
        })?;

    let result = handler.evaluate(&node.config, input, ctx).await?;
    tracing::debug!(outcome = %result.outcome, "Condition evaluated");
    Ok(result)
}

/// Run an action node under the execution's safety budget.
///
/// The budget is checked before anything else, so an exhausted budget
/// never reaches a client. Counters move only after the handler succeeds.
pub async fn run_action_node(
    registry: &NodeRegistry,
    node: &AutomationNode,
    ctx: &ExecutionContext,
    input: &Value,
    metrics: &mut SafetyMetrics,
) -> Result<ActionResult, NodeError> {
    metrics.check(&ctx.limits)?;

    let handler = registry
        .action(&node.subtype)
        .ok_or_else(|| NodeError::UnknownSubtype {
            node_type: NodeType::Action,
            subtype: node.subtype.clone(),
        })?;

    let output = handler.run(&node.config, input, ctx).await?;
    metrics.record(handler.effect());

    tracing::debug!(
        actions_executed = metrics.actions_executed,
        external_writes = metrics.external_writes,
        contact_actions = metrics.contact_actions_performed,
        "Action completed"
    );

    Ok(ActionResult {
        success: true,
        output,
    })
}
