// crates/malruntime/src/runtime.rs

use crate::context::ContextBuilder;
use crate::executor::{evaluate_condition_node, run_action_node};
use crate::graph::{build_and_validate, AutomationGraph};
use crate::matcher::build_initial_node_context;
use chrono::Utc;
use malcore::{
    AutomationError, AutomationNode, ClientProvider, ExecutionContext, ExecutionEvent, ExecutionEvents,
    ExecutionId, ExecutionLimits, ExecutionStatus, Flow, FlowId, FlowStore, GraphError, NodeError,
    NodeId, NodeRegistry, NodeType, Outcome, SafetyMetrics, StepUpdate, TriggerContext,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Configuration for the runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeConfig {
    pub limits: ExecutionLimits,
    /// Global cap on in-flight executions across all flows.
    pub max_concurrent_executions: usize,
    pub event_buffer_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            limits: ExecutionLimits::default(),
            max_concurrent_executions: 10,
            event_buffer_size: 1000,
        }
    }
}

/// Final state of one execution
#[derive(Debug, Clone)]
pub struct ExecutionSummary {
    pub execution_id: ExecutionId,
    pub flow_id: FlowId,
    pub status: ExecutionStatus,
    pub error: Option<String>,
    /// Execution steps recorded, one per node visited.
    pub steps: usize,
    pub metrics: SafetyMetrics,
    pub duration_ms: u64,
}

/// What running a single node produced.
struct NodeRun {
    outcome: Option<Outcome>,
    output: Value,
}

/// Pending node visit on the work stack. `path` holds the nodes already
/// visited on the branch leading here.
struct Visit {
    node_id: NodeId,
    input: Value,
    path: HashSet<NodeId>,
}

/// Mutable state of one execution walk.
struct Walk<'a> {
    graph: &'a AutomationGraph,
    ctx: &'a ExecutionContext,
    metrics: SafetyMetrics,
    steps: usize,
}

/// Runs flows node by node and records every step
pub struct AutomationRuntime {
    store: Arc<dyn FlowStore>,
    registry: Arc<NodeRegistry>,
    contexts: ContextBuilder,
    events: ExecutionEvents,
    running: RwLock<HashMap<ExecutionId, CancellationToken>>,
    config: RuntimeConfig,
}

impl AutomationRuntime {
    pub fn new(
        store: Arc<dyn FlowStore>,
        registry: Arc<NodeRegistry>,
        clients: Arc<dyn ClientProvider>,
        config: RuntimeConfig,
    ) -> Self {
        Self {
            store,
            registry,
            contexts: ContextBuilder::new(clients, config.limits.clone()),
            events: ExecutionEvents::new(config.event_buffer_size),
            running: RwLock::new(HashMap::new()),
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn FlowStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Subscribe to execution progress events
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<ExecutionEvent> {
        self.events.subscribe()
    }

    pub async fn running_executions(&self) -> Vec<ExecutionId> {
        self.running.read().await.keys().copied().collect()
    }

    /// Stop scheduling further nodes for an execution. Steps already
    /// recorded stay as they are. Returns false if it is not running.
    pub async fn cancel_execution(&self, execution_id: ExecutionId) -> bool {
        match self.running.read().await.get(&execution_id) {
            Some(token) => {
                tracing::info!(%execution_id, "Cancelling execution");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Run a flow from its trigger node.
    ///
    /// A structurally invalid flow fails before any execution record is
    /// created. Budget exhaustion ends as `partial` and cancellation as
    /// `cancelled`, both returned as `Ok`; any other error marks the
    /// execution `failed` and is returned.
    pub async fn start_execution(
        &self,
        flow_id: FlowId,
        trigger: TriggerContext,
    ) -> Result<ExecutionSummary, AutomationError> {
        let flow = self
            .store
            .get_flow(flow_id)
            .await?
            .ok_or(GraphError::FlowNotFound(flow_id))?;
        let graph = build_and_validate(self.store.as_ref(), flow_id).await?;
        self.start_with_graph(&flow, &graph, trigger).await
    }

    /// Like `start_execution`, for callers that already hold a validated graph.
    pub(crate) async fn start_with_graph(
        &self,
        flow: &Flow,
        graph: &AutomationGraph,
        trigger: TriggerContext,
    ) -> Result<ExecutionSummary, AutomationError> {
        let trigger_node = graph
            .trigger_node()
            .ok_or(GraphError::NoTriggerNode { flow_id: flow.id })?;

        let clients = self.contexts.prepare(flow).await?;
        let trigger = trigger.stamped();
        let execution = self.store.create_execution(flow.id, &trigger).await?;
        let ctx = self.contexts.build(flow, execution.id, clients);

        self.running
            .write()
            .await
            .insert(ctx.execution_id, ctx.cancellation.clone());

        let started = Instant::now();
        self.events.emit(ExecutionEvent::ExecutionStarted {
            execution_id: ctx.execution_id,
            flow_id: flow.id,
            timestamp: Utc::now(),
        });
        tracing::info!(
            execution_id = %ctx.execution_id,
            flow_id = %flow.id,
            event_type = %trigger.event_type,
            "Starting execution"
        );

        let seed = build_initial_node_context(&self.registry, trigger_node, &trigger);
        let mut walk = Walk {
            graph,
            ctx: &ctx,
            metrics: SafetyMetrics::new(),
            steps: 0,
        };
        let result = self
            .walk(&mut walk, trigger_node.id, seed)
            .instrument(ctx.span.clone())
            .await;

        self.running.write().await.remove(&ctx.execution_id);

        let (status, error) = match &result {
            Ok(()) => (ExecutionStatus::Succeeded, None),
            Err(e) => (e.terminal_status(), Some(e.to_string())),
        };
        self.store
            .update_execution_status(ctx.execution_id, status, error.as_deref())
            .await?;

        let duration_ms = started.elapsed().as_millis() as u64;
        self.events.emit(ExecutionEvent::ExecutionFinished {
            execution_id: ctx.execution_id,
            status,
            error: error.clone(),
            duration_ms,
            timestamp: Utc::now(),
        });

        match result {
            Err(e) if status == ExecutionStatus::Failed => {
                tracing::error!(execution_id = %ctx.execution_id, "Execution failed: {}", e);
                Err(e)
            }
            _ => {
                match status {
                    ExecutionStatus::Partial => tracing::warn!(
                        execution_id = %ctx.execution_id,
                        "Execution stopped by safety limit: {}",
                        error.as_deref().unwrap_or_default()
                    ),
                    _ => tracing::info!(
                        execution_id = %ctx.execution_id,
                        %status,
                        steps = walk.steps,
                        duration_ms,
                        "Execution finished"
                    ),
                }
                Ok(ExecutionSummary {
                    execution_id: ctx.execution_id,
                    flow_id: flow.id,
                    status,
                    error,
                    steps: walk.steps,
                    metrics: walk.metrics,
                    duration_ms,
                })
            }
        }
    }

    /// Depth-first walk with an explicit stack.
    ///
    /// Children are pushed in reverse so siblings run in edge order, one
    /// after another. Every visit carries its own copy of the path, so a
    /// node may be reached again through a different branch but never
    /// twice on the same one.
    async fn walk(&self, walk: &mut Walk<'_>, start: NodeId, seed: Value) -> Result<(), AutomationError> {
        let mut stack = vec![Visit {
            node_id: start,
            input: seed,
            path: HashSet::new(),
        }];

        while let Some(Visit { node_id, input, mut path }) = stack.pop() {
            if walk.ctx.is_cancelled() {
                return Err(AutomationError::Cancelled(walk.ctx.execution_id));
            }
            if path.contains(&node_id) {
                tracing::warn!(%node_id, "Node already visited on this branch, stopping branch");
                continue;
            }

            let node = walk.graph.node(node_id).ok_or_else(|| GraphError::Invalid {
                flow_id: walk.graph.flow_id(),
                errors: vec![format!("node {} not found", node_id)],
            })?;

            let run = self.run_node(walk, node, &input).await?;

            let next = walk.graph.next_nodes(node_id, run.outcome);
            if next.is_empty() {
                tracing::debug!(%node_id, "No next nodes, branch complete");
                continue;
            }

            path.insert(node_id);
            let input = derive_input(&input, node, &run);
            for next_id in next.into_iter().rev() {
                stack.push(Visit {
                    node_id: next_id,
                    input: input.clone(),
                    path: path.clone(),
                });
            }
        }

        Ok(())
    }

    /// Run one node and record its step.
    async fn run_node(
        &self,
        walk: &mut Walk<'_>,
        node: &AutomationNode,
        input: &Value,
    ) -> Result<NodeRun, AutomationError> {
        let ctx = walk.ctx;
        let step = self.store.create_execution_step(ctx.execution_id, node.id).await?;
        walk.steps += 1;
        self.store
            .update_execution_step(step.id, StepUpdate::running(input.clone()))
            .await?;

        self.events.emit(ExecutionEvent::NodeStarted {
            execution_id: ctx.execution_id,
            node_id: node.id,
            node_type: node.node_type,
            subtype: node.subtype.clone(),
            timestamp: Utc::now(),
        });

        let started = Instant::now();
        let result = self
            .execute_node(node, input, ctx, &mut walk.metrics)
            .instrument(ctx.node_span(node))
            .await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(run) => {
                self.store
                    .update_execution_step(step.id, StepUpdate::succeeded(run.output.clone()))
                    .await?;
                self.events.emit(ExecutionEvent::NodeCompleted {
                    execution_id: ctx.execution_id,
                    node_id: node.id,
                    outcome: run.outcome,
                    output: run.output.clone(),
                    duration_ms,
                    timestamp: Utc::now(),
                });
                Ok(run)
            }
            Err(e) => {
                tracing::error!(node_id = %node.id, subtype = %node.subtype, "Node failed: {}", e);
                self.store
                    .update_execution_step(step.id, StepUpdate::failed(e.to_string()))
                    .await?;
                self.events.emit(ExecutionEvent::NodeFailed {
                    execution_id: ctx.execution_id,
                    node_id: node.id,
                    error: e.to_string(),
                    timestamp: Utc::now(),
                });
                Err(AutomationError::from_node_error(ctx.execution_id, node, e))
            }
        }
    }

    async fn execute_node(
        &self,
        node: &AutomationNode,
        input: &Value,
        ctx: &ExecutionContext,
        metrics: &mut SafetyMetrics,
    ) -> Result<NodeRun, NodeError> {
        let work = async {
            match node.node_type {
                NodeType::Trigger => Ok(NodeRun {
                    outcome: None,
                    output: input.clone(),
                }),
                NodeType::Condition => {
                    let result = evaluate_condition_node(&self.registry, node, ctx, input).await?;
                    Ok(NodeRun {
                        outcome: Some(result.outcome),
                        output: result.output,
                    })
                }
                NodeType::Action => {
                    let result = run_action_node(&self.registry, node, ctx, input, metrics).await?;
                    Ok(NodeRun {
                        outcome: None,
                        output: result.output,
                    })
                }
            }
        };

        match ctx.limits.node_timeout() {
            Some(limit) => match tokio::time::timeout(limit, work).await {
                Ok(result) => result,
                Err(_) => Err(NodeError::Timeout {
                    seconds: limit.as_secs(),
                }),
            },
            None => work.await,
        }
    }
}

/// Input for the nodes after `node`: the parent's input plus a
/// `previousNode` entry describing what `node` produced.
fn derive_input(input: &Value, node: &AutomationNode, run: &NodeRun) -> Value {
    let mut next = match input {
        Value::Object(map) => map.clone(),
        other => {
            let mut map = serde_json::Map::new();
            map.insert("input".to_string(), other.clone());
            map
        }
    };
    next.insert(
        "previousNode".to_string(),
        json!({
            "id": node.id,
            "type": node.node_type,
            "subtype": node.subtype,
            "outcome": run.outcome,
            "output": run.output,
        }),
    );
    Value::Object(next)
}
