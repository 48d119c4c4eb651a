//! Flow execution runtime
//!
//! This crate provides the graph model, trigger matching, node dispatch,
//! the runtime that walks a flow node by node, and the event bus that
//! routes external events into matching flows.

mod context;
mod event_bus;
mod executor;
mod graph;
mod matcher;
mod runtime;

pub use context::ContextBuilder;
pub use event_bus::{AutomationEventHandler, DispatchReport, EventBus, FlowDispatch, HandlerError, WILDCARD};
pub use executor::{evaluate_condition_node, run_action_node};
pub use graph::{build_and_validate, AutomationGraph, EdgeEnd, GraphIssue, GraphValidation};
pub use matcher::{build_initial_node_context, should_trigger_flow};
pub use runtime::{AutomationRuntime, ExecutionSummary, RuntimeConfig};
