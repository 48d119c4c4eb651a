//! Core abstractions for the marketing automation engine
//!
//! This crate provides the data model, error kinds, ports and handler traits
//! that the runtime and the node library build on.

mod context;
mod error;
pub mod events;
mod model;
mod node;
mod path;
pub mod ports;
mod registry;
mod safety;
mod store;

pub use context::{ClientProvider, ExecutionClients, ExecutionContext};
pub use error::{AutomationError, ClientError, GraphError, NodeError, StoreError};
pub use events::*;
pub use model::{
    AutomationEdge, AutomationNode, Config, EdgeId, Execution, ExecutionId, ExecutionStatus,
    ExecutionStep, Flow, FlowDefinition, FlowId, NodeId, NodeType, Outcome, Position, StepId,
    StepStatus, TriggerType,
};
pub use node::{ActionHandler, ActionResult, ConditionHandler, ConditionResult, NodeConfig, TriggerHandler};
pub use path::{FieldPath, PathError};
pub use registry::{HandlerInfo, NodeRegistry};
pub use safety::{EffectClass, ExecutionLimits, LimitExceeded, LimitKind, SafetyMetrics};
pub use store::{FlowStore, InMemoryFlowStore, StepUpdate};

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, AutomationError>;
