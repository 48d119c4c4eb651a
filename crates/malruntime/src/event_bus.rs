// crates/malruntime/src/event_bus.rs

use crate::graph::{build_and_validate, AutomationGraph};
use crate::matcher::should_trigger_flow;
use crate::runtime::{AutomationRuntime, ExecutionSummary};
use async_trait::async_trait;
use futures::future::join_all;
use malcore::{AutomationError, Flow, FlowId, TriggerContext};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, Semaphore};
use tokio::task::JoinHandle;

/// Error type returned by event handlers. Logged, never propagated.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Event type that registers a handler for every event.
pub const WILDCARD: &str = "*";

/// Observer invoked after an event has been dispatched to flows
#[async_trait]
pub trait AutomationEventHandler: Send + Sync {
    async fn handle(&self, event: &TriggerContext) -> Result<(), HandlerError>;
}

/// What happened to one matching flow
#[derive(Debug)]
pub enum FlowDispatch {
    /// The execution ran; its own status tells how it ended.
    Started(ExecutionSummary),
    Failed { flow_id: FlowId, error: String },
    Skipped { flow_id: FlowId, reason: String },
}

impl FlowDispatch {
    pub fn flow_id(&self) -> FlowId {
        match self {
            FlowDispatch::Started(summary) => summary.flow_id,
            FlowDispatch::Failed { flow_id, .. } | FlowDispatch::Skipped { flow_id, .. } => *flow_id,
        }
    }
}

/// Outcome of processing one event
#[derive(Debug, Default)]
pub struct DispatchReport {
    pub event_type: String,
    /// Set when the event arrived with no execution capacity left.
    pub dropped: bool,
    pub matched: usize,
    pub results: Vec<FlowDispatch>,
    pub handlers_invoked: usize,
    pub handler_failures: usize,
}

impl DispatchReport {
    fn new(event_type: &str) -> Self {
        Self {
            event_type: event_type.to_string(),
            ..Default::default()
        }
    }

    pub fn started(&self) -> impl Iterator<Item = &ExecutionSummary> {
        self.results.iter().filter_map(|r| match r {
            FlowDispatch::Started(summary) => Some(summary),
            _ => None,
        })
    }
}

struct Inner {
    runtime: Arc<AutomationRuntime>,
    handlers: RwLock<HashMap<String, Vec<Arc<dyn AutomationEventHandler>>>>,
    permits: Arc<Semaphore>,
    max_concurrent: usize,
}

/// Routes external events into matching flows.
///
/// Each bus owns its handler registry and execution permits, so separate
/// instances never see each other's state. Cloning shares the instance.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl EventBus {
    pub fn new(runtime: Arc<AutomationRuntime>) -> Self {
        let max_concurrent = runtime.config().max_concurrent_executions.max(1);
        Self {
            inner: Arc::new(Inner {
                runtime,
                handlers: RwLock::new(HashMap::new()),
                permits: Arc::new(Semaphore::new(max_concurrent)),
                max_concurrent,
            }),
        }
    }

    pub fn runtime(&self) -> &Arc<AutomationRuntime> {
        &self.inner.runtime
    }

    /// Register a handler for one event type.
    pub async fn on(&self, event_type: impl Into<String>, handler: Arc<dyn AutomationEventHandler>) {
        let event_type = event_type.into();
        tracing::debug!("Registering event handler for {}", event_type);
        self.inner
            .handlers
            .write()
            .await
            .entry(event_type)
            .or_default()
            .push(handler);
    }

    /// Register a handler for every event type.
    pub async fn on_any(&self, handler: Arc<dyn AutomationEventHandler>) {
        self.on(WILDCARD, handler).await;
    }

    /// Number of executions currently holding a permit.
    pub fn active_executions(&self) -> usize {
        self.inner.max_concurrent - self.inner.permits.available_permits()
    }

    /// Stamp the event and process it in the background.
    ///
    /// Returns immediately. The handle may be awaited for the report or
    /// dropped; processing continues either way.
    pub fn emit(&self, event: TriggerContext) -> JoinHandle<DispatchReport> {
        let event = event.stamped();
        tracing::debug!(event_type = %event.event_type, source = %event.source, "Event emitted");
        let bus = self.clone();
        tokio::spawn(async move { bus.process(event).await })
    }

    /// Dispatch one event to every matching flow, then to the handlers.
    pub async fn process(&self, event: TriggerContext) -> DispatchReport {
        let event = event.stamped();
        let mut report = DispatchReport::new(&event.event_type);

        if self.inner.permits.available_permits() == 0 {
            tracing::warn!(
                event_type = %event.event_type,
                "Concurrent execution limit ({}) reached, dropping event",
                self.inner.max_concurrent
            );
            report.dropped = true;
            return report;
        }

        let matches = self.matching_flows(&event).await;
        report.matched = matches.len();
        tracing::info!(event_type = %event.event_type, "Event matched {} flow(s)", matches.len());

        let runs = matches
            .into_iter()
            .map(|(flow, graph)| self.run_flow(flow, graph, event.clone()));
        report.results = join_all(runs).await;

        let (invoked, failures) = self.notify_handlers(&event).await;
        report.handlers_invoked = invoked;
        report.handler_failures = failures;
        report
    }

    /// Active event-triggered flows owned by the event's user whose
    /// trigger accepts the event.
    pub async fn matching_flows(&self, event: &TriggerContext) -> Vec<(Flow, AutomationGraph)> {
        let Some(user_id) = event.user_id() else {
            tracing::debug!(event_type = %event.event_type, "Event carries no userId, no flows to consider");
            return Vec::new();
        };

        let runtime = &self.inner.runtime;
        let store = runtime.store().as_ref();
        let flows = match store.list_flows_for_user(user_id).await {
            Ok(flows) => flows,
            Err(e) => {
                tracing::warn!(%user_id, "Could not list flows: {}", e);
                return Vec::new();
            }
        };

        let mut matched = Vec::new();
        for flow in flows.into_iter().filter(Flow::accepts_events) {
            let graph = match build_and_validate(store, flow.id).await {
                Ok(graph) => graph,
                Err(e) => {
                    tracing::warn!(flow_id = %flow.id, "Skipping flow with invalid graph: {}", e);
                    continue;
                }
            };
            let Some(trigger_node) = graph.trigger_node() else {
                continue;
            };
            if should_trigger_flow(runtime.registry(), &flow, event, trigger_node) {
                matched.push((flow, graph));
            }
        }
        matched
    }

    /// Start one matched flow under a permit. Failures stay local to the flow.
    async fn run_flow(&self, flow: Flow, graph: AutomationGraph, event: TriggerContext) -> FlowDispatch {
        let Ok(_permit) = self.inner.permits.clone().try_acquire_owned() else {
            tracing::warn!(flow_id = %flow.id, "No execution permit left, skipping flow");
            return FlowDispatch::Skipped {
                flow_id: flow.id,
                reason: AutomationError::ConcurrencyLimit(self.inner.max_concurrent).to_string(),
            };
        };

        match self.inner.runtime.start_with_graph(&flow, &graph, event).await {
            Ok(summary) => FlowDispatch::Started(summary),
            Err(e) => {
                tracing::error!(flow_id = %flow.id, "Flow execution failed: {}", e);
                FlowDispatch::Failed {
                    flow_id: flow.id,
                    error: e.to_string(),
                }
            }
        }
    }

    /// Exact-type handlers first, then wildcard handlers. Returns the
    /// number invoked and the number that failed.
    async fn notify_handlers(&self, event: &TriggerContext) -> (usize, usize) {
        let handlers: Vec<Arc<dyn AutomationEventHandler>> = {
            let registry = self.inner.handlers.read().await;
            let exact = registry.get(&event.event_type).into_iter().flatten();
            let wildcard = registry
                .get(WILDCARD)
                .filter(|_| event.event_type != WILDCARD)
                .into_iter()
                .flatten();
            exact.chain(wildcard).cloned().collect()
        };

        let mut failures = 0;
        for handler in &handlers {
            if let Err(e) = handler.handle(event).await {
                tracing::error!(event_type = %event.event_type, "Event handler failed: {}", e);
                failures += 1;
            }
        }
        (handlers.len(), failures)
    }

    /// Start a flow directly, skipping trigger matching.
    pub async fn manual_trigger_flow(
        &self,
        flow_id: FlowId,
        payload: serde_json::Value,
    ) -> Result<ExecutionSummary, AutomationError> {
        let _permit = self
            .inner
            .permits
            .clone()
            .try_acquire_owned()
            .map_err(|_| AutomationError::ConcurrencyLimit(self.inner.max_concurrent))?;

        tracing::info!(%flow_id, "Manually triggering flow");
        self.inner
            .runtime
            .start_execution(flow_id, TriggerContext::manual(payload))
            .await
    }
}
