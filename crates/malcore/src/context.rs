use crate::error::ClientError;
use crate::model::{AutomationNode, ExecutionId, Flow, FlowId};
use crate::ports::{EmailCampaignClient, MetricsClient, OutcomeLogClient, SegmentClient, TaskClient};
use crate::safety::ExecutionLimits;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// The set of client ports one execution may use
#[derive(Clone)]
pub struct ExecutionClients {
    pub email: Arc<dyn EmailCampaignClient>,
    pub segments: Arc<dyn SegmentClient>,
    pub metrics: Arc<dyn MetricsClient>,
    pub tasks: Arc<dyn TaskClient>,
    pub outcomes: Arc<dyn OutcomeLogClient>,
}

/// Supplies clients per execution, e.g. scoped to the flow's owner.
#[async_trait]
pub trait ClientProvider: Send + Sync {
    async fn clients_for(&self, flow: &Flow) -> Result<ExecutionClients, ClientError>;
}

/// A fixed client set serves every flow.
#[async_trait]
impl ClientProvider for ExecutionClients {
    async fn clients_for(&self, _flow: &Flow) -> Result<ExecutionClients, ClientError> {
        Ok(self.clone())
    }
}

/// Everything a node handler may reach during one execution
#[derive(Clone)]
pub struct ExecutionContext {
    pub execution_id: ExecutionId,
    pub flow_id: FlowId,
    pub user_id: String,
    pub workspace_id: Option<String>,
    pub clients: ExecutionClients,
    pub limits: ExecutionLimits,
    /// Logging scope carrying execution, flow and user ids.
    pub span: tracing::Span,
    pub cancellation: CancellationToken,
}

impl ExecutionContext {
    pub fn new(
        flow: &Flow,
        execution_id: ExecutionId,
        clients: ExecutionClients,
        limits: ExecutionLimits,
    ) -> Self {
        let span = tracing::info_span!(
            "execution",
            %execution_id,
            flow_id = %flow.id,
            user_id = %flow.user_id,
        );
        Self {
            execution_id,
            flow_id: flow.id,
            user_id: flow.user_id.clone(),
            workspace_id: flow.workspace_id.clone(),
            clients,
            limits,
            span,
            cancellation: CancellationToken::new(),
        }
    }

    /// Child logging scope for one node.
    pub fn node_span(&self, node: &AutomationNode) -> tracing::Span {
        tracing::info_span!(
            parent: &self.span,
            "node",
            node_id = %node.id,
            node_type = %node.node_type,
            subtype = %node.subtype,
        )
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}
