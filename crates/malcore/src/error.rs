use crate::model::{AutomationNode, ExecutionId, ExecutionStatus, FlowId, NodeId, NodeType};
use crate::safety::LimitExceeded;
use thiserror::Error;

/// Top-level error for anything the engine does with a flow.
#[derive(Error, Debug)]
pub enum AutomationError {
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Node {node_id} ({node_type}/{subtype}) failed: {source}")]
    Node {
        node_id: NodeId,
        node_type: NodeType,
        subtype: String,
        #[source]
        source: NodeError,
    },

    #[error(transparent)]
    LimitExceeded(#[from] LimitExceeded),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    #[error("Execution {0} cancelled")]
    Cancelled(ExecutionId),

    #[error("Concurrent execution limit reached ({0})")]
    ConcurrencyLimit(usize),
}

impl AutomationError {
    /// Attach node identity to a handler error.
    ///
    /// Budget and cancellation signals keep their own variants so the
    /// runtime can tell "throttled" and "stopped" apart from "broken".
    pub fn from_node_error(execution_id: ExecutionId, node: &AutomationNode, error: NodeError) -> Self {
        match error {
            NodeError::LimitExceeded(limit) => AutomationError::LimitExceeded(limit),
            NodeError::Cancelled => AutomationError::Cancelled(execution_id),
            source => AutomationError::Node {
                node_id: node.id,
                node_type: node.node_type,
                subtype: node.subtype.clone(),
                source,
            },
        }
    }

    /// Terminal status an execution ends in when this error escapes it.
    pub fn terminal_status(&self) -> ExecutionStatus {
        match self {
            AutomationError::LimitExceeded(_) => ExecutionStatus::Partial,
            AutomationError::Cancelled(_) => ExecutionStatus::Cancelled,
            _ => ExecutionStatus::Failed,
        }
    }
}

/// Structural problems that prevent an execution from starting.
#[derive(Error, Debug, Clone)]
pub enum GraphError {
    #[error("Flow not found: {0}")]
    FlowNotFound(FlowId),

    #[error("Flow {flow_id} has no trigger node")]
    NoTriggerNode { flow_id: FlowId },

    #[error("Invalid graph for flow {flow_id}: {}", .errors.join("; "))]
    Invalid { flow_id: FlowId, errors: Vec<String> },
}

/// Errors raised inside a single trigger, condition or action handler.
#[derive(Error, Debug, Clone)]
pub enum NodeError {
    #[error("{subtype}: missing required config field '{field}'")]
    MissingConfig { subtype: String, field: String },

    #[error("{subtype}: invalid config field '{field}': {reason}")]
    InvalidConfig {
        subtype: String,
        field: String,
        reason: String,
    },

    #[error("{subtype}: no value at '{path}' in step input")]
    MissingInput { subtype: String, path: String },

    #[error("Unknown {node_type} subtype: {subtype}")]
    UnknownSubtype { node_type: NodeType, subtype: String },

    #[error("Failed to execute action {subtype}: {message}")]
    Action {
        subtype: String,
        message: String,
        #[source]
        source: ClientError,
    },

    #[error("Failed to evaluate condition {subtype}: {message}")]
    Condition {
        subtype: String,
        message: String,
        #[source]
        source: ClientError,
    },

    #[error(transparent)]
    LimitExceeded(#[from] LimitExceeded),

    #[error("Timeout after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Cancelled")]
    Cancelled,
}

impl NodeError {
    pub fn action(subtype: impl Into<String>, message: impl Into<String>, source: ClientError) -> Self {
        NodeError::Action {
            subtype: subtype.into(),
            message: message.into(),
            source,
        }
    }

    pub fn condition(subtype: impl Into<String>, message: impl Into<String>, source: ClientError) -> Self {
        NodeError::Condition {
            subtype: subtype.into(),
            message: message.into(),
            source,
        }
    }

    pub fn invalid_config(
        subtype: impl Into<String>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        NodeError::InvalidConfig {
            subtype: subtype.into(),
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// True for malformed node configuration.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            NodeError::MissingConfig { .. }
                | NodeError::InvalidConfig { .. }
                | NodeError::UnknownSubtype { .. }
        )
    }
}

/// Failure reported by one of the external client ports.
#[derive(Error, Debug, Clone)]
pub enum ClientError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rejected: {0}")]
    Rejected(String),
}

/// Failure reported by the flow store.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Backend error: {0}")]
    Backend(String),
}
