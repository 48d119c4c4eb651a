use crate::error::StoreError;
use crate::events::TriggerContext;
use crate::model::{
    AutomationEdge, AutomationNode, Execution, ExecutionId, ExecutionStatus, ExecutionStep, Flow,
    FlowDefinition, FlowId, NodeId, StepId, StepStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Partial update applied to an execution step
#[derive(Debug, Clone, Default)]
pub struct StepUpdate {
    pub status: Option<StepStatus>,
    pub input: Option<serde_json::Value>,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl StepUpdate {
    pub fn running(input: serde_json::Value) -> Self {
        Self {
            status: Some(StepStatus::Running),
            input: Some(input),
            started_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    pub fn succeeded(output: serde_json::Value) -> Self {
        Self {
            status: Some(StepStatus::Succeeded),
            output: Some(output),
            finished_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: Some(StepStatus::Failed),
            error: Some(error.into()),
            finished_at: Some(Utc::now()),
            ..Default::default()
        }
    }
}

/// Persistence port for flows and their execution history
#[async_trait]
pub trait FlowStore: Send + Sync {
    async fn get_flow(&self, flow_id: FlowId) -> Result<Option<Flow>, StoreError>;

    /// Newest first.
    async fn list_flows_for_user(&self, user_id: &str) -> Result<Vec<Flow>, StoreError>;

    async fn get_nodes_for_flow(&self, flow_id: FlowId) -> Result<Vec<AutomationNode>, StoreError>;

    async fn get_edges_for_flow(&self, flow_id: FlowId) -> Result<Vec<AutomationEdge>, StoreError>;

    /// Persists a new execution in `running` state.
    async fn create_execution(
        &self,
        flow_id: FlowId,
        trigger_context: &TriggerContext,
    ) -> Result<Execution, StoreError>;

    async fn update_execution_status(
        &self,
        execution_id: ExecutionId,
        status: ExecutionStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError>;

    async fn get_execution(&self, execution_id: ExecutionId) -> Result<Option<Execution>, StoreError>;

    /// Newest first, at most `limit`.
    async fn list_executions_for_flow(&self, flow_id: FlowId, limit: usize) -> Result<Vec<Execution>, StoreError>;

    /// Creates a `pending` step.
    async fn create_execution_step(
        &self,
        execution_id: ExecutionId,
        node_id: NodeId,
    ) -> Result<ExecutionStep, StoreError>;

    async fn update_execution_step(&self, step_id: StepId, update: StepUpdate) -> Result<(), StoreError>;

    /// In the order the steps were created.
    async fn get_steps_for_execution(&self, execution_id: ExecutionId) -> Result<Vec<ExecutionStep>, StoreError>;
}

#[derive(Default)]
struct Tables {
    flows: HashMap<FlowId, Flow>,
    nodes: Vec<AutomationNode>,
    edges: Vec<AutomationEdge>,
    executions: HashMap<ExecutionId, Execution>,
    steps: Vec<ExecutionStep>,
}

/// Process-local store, used by the CLI and by tests
#[derive(Default)]
pub struct InMemoryFlowStore {
    tables: RwLock<Tables>,
}

impl InMemoryFlowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a flow with its nodes and edges, replacing any previous copy.
    pub async fn insert_definition(&self, definition: FlowDefinition) {
        let mut tables = self.tables.write().await;
        let flow_id = definition.flow.id;
        tables.nodes.retain(|n| n.flow_id != flow_id);
        tables.edges.retain(|e| e.flow_id != flow_id);
        tables.nodes.extend(definition.nodes);
        tables.edges.extend(definition.edges);
        tables.flows.insert(flow_id, definition.flow);
    }

    pub async fn set_active(&self, flow_id: FlowId, active: bool) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let flow = tables.flows.get_mut(&flow_id).ok_or_else(|| StoreError::NotFound {
            entity: "flow",
            id: flow_id.to_string(),
        })?;
        flow.is_active = active;
        flow.updated_at = Utc::now();
        Ok(())
    }

    pub async fn execution_count(&self) -> usize {
        self.tables.read().await.executions.len()
    }
}

#[async_trait]
impl FlowStore for InMemoryFlowStore {
    async fn get_flow(&self, flow_id: FlowId) -> Result<Option<Flow>, StoreError> {
        Ok(self.tables.read().await.flows.get(&flow_id).cloned())
    }

    async fn list_flows_for_user(&self, user_id: &str) -> Result<Vec<Flow>, StoreError> {
        let tables = self.tables.read().await;
        let mut flows: Vec<Flow> = tables
            .flows
            .values()
            .filter(|f| f.user_id == user_id)
            .cloned()
            .collect();
        flows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(flows)
    }

    async fn get_nodes_for_flow(&self, flow_id: FlowId) -> Result<Vec<AutomationNode>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.nodes.iter().filter(|n| n.flow_id == flow_id).cloned().collect())
    }

    async fn get_edges_for_flow(&self, flow_id: FlowId) -> Result<Vec<AutomationEdge>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.edges.iter().filter(|e| e.flow_id == flow_id).cloned().collect())
    }

    async fn create_execution(
        &self,
        flow_id: FlowId,
        trigger_context: &TriggerContext,
    ) -> Result<Execution, StoreError> {
        let execution = Execution {
            id: Uuid::new_v4(),
            flow_id,
            trigger_context: trigger_context.clone(),
            status: ExecutionStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            error: None,
        };
        let mut tables = self.tables.write().await;
        tables.executions.insert(execution.id, execution.clone());
        Ok(execution)
    }

    async fn update_execution_status(
        &self,
        execution_id: ExecutionId,
        status: ExecutionStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let execution = tables
            .executions
            .get_mut(&execution_id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "execution",
                id: execution_id.to_string(),
            })?;
        execution.status = status;
        if status.is_terminal() {
            execution.finished_at = Some(Utc::now());
        }
        if let Some(message) = error {
            execution.error = Some(message.to_string());
        }
        Ok(())
    }

    async fn get_execution(&self, execution_id: ExecutionId) -> Result<Option<Execution>, StoreError> {
        Ok(self.tables.read().await.executions.get(&execution_id).cloned())
    }

    async fn list_executions_for_flow(&self, flow_id: FlowId, limit: usize) -> Result<Vec<Execution>, StoreError> {
        let tables = self.tables.read().await;
        let mut executions: Vec<Execution> = tables
            .executions
            .values()
            .filter(|e| e.flow_id == flow_id)
            .cloned()
            .collect();
        executions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        executions.truncate(limit);
        Ok(executions)
    }

    async fn create_execution_step(
        &self,
        execution_id: ExecutionId,
        node_id: NodeId,
    ) -> Result<ExecutionStep, StoreError> {
        let step = ExecutionStep {
            id: Uuid::new_v4(),
            execution_id,
            node_id,
            status: StepStatus::Pending,
            input: None,
            output: None,
            error: None,
            started_at: None,
            finished_at: None,
        };
        self.tables.write().await.steps.push(step.clone());
        Ok(step)
    }

    async fn update_execution_step(&self, step_id: StepId, update: StepUpdate) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let step = tables
            .steps
            .iter_mut()
            .find(|s| s.id == step_id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "execution step",
                id: step_id.to_string(),
            })?;

        if let Some(status) = update.status {
            step.status = status;
        }
        if update.input.is_some() {
            step.input = update.input;
        }
        if update.output.is_some() {
            step.output = update.output;
        }
        if update.error.is_some() {
            step.error = update.error;
        }
        if update.started_at.is_some() {
            step.started_at = update.started_at;
        }
        if update.finished_at.is_some() {
            step.finished_at = update.finished_at;
        }
        Ok(())
    }

    async fn get_steps_for_execution(&self, execution_id: ExecutionId) -> Result<Vec<ExecutionStep>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .steps
            .iter()
            .filter(|s| s.execution_id == execution_id)
            .cloned()
            .collect())
    }
}
