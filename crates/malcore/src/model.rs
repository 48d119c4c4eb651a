use crate::events::TriggerContext;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type FlowId = Uuid;
pub type NodeId = Uuid;
pub type EdgeId = Uuid;
pub type ExecutionId = Uuid;
pub type StepId = Uuid;

/// Free-form node configuration, stored as a JSON object.
pub type Config = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerType {
    Event,
    Manual,
}

/// Stored automation definition owned by a user
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flow {
    pub id: FlowId,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub trigger_type: TriggerType,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Flow {
    /// New flows start inactive.
    pub fn new(user_id: impl Into<String>, name: impl Into<String>, trigger_type: TriggerType) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            workspace_id: None,
            name: name.into(),
            description: None,
            trigger_type,
            is_active: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn active(mut self) -> Self {
        self.is_active = true;
        self
    }

    pub fn with_workspace(mut self, workspace_id: impl Into<String>) -> Self {
        self.workspace_id = Some(workspace_id.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Only active, event-triggered flows take part in event routing.
    pub fn accepts_events(&self) -> bool {
        self.is_active && self.trigger_type == TriggerType::Event
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Trigger,
    Condition,
    Action,
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeType::Trigger => "trigger",
            NodeType::Condition => "condition",
            NodeType::Action => "action",
        };
        f.write_str(name)
    }
}

/// One step of a flow
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationNode {
    pub id: NodeId,
    pub flow_id: FlowId,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub subtype: String,
    #[serde(default)]
    pub config: Config,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

impl AutomationNode {
    pub fn new(flow_id: FlowId, node_type: NodeType, subtype: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            flow_id,
            node_type,
            subtype: subtype.into(),
            config: Config::new(),
            position: None,
        }
    }

    pub fn trigger(flow_id: FlowId, subtype: impl Into<String>) -> Self {
        Self::new(flow_id, NodeType::Trigger, subtype)
    }

    pub fn condition(flow_id: FlowId, subtype: impl Into<String>) -> Self {
        Self::new(flow_id, NodeType::Condition, subtype)
    }

    pub fn action(flow_id: FlowId, subtype: impl Into<String>) -> Self {
        Self::new(flow_id, NodeType::Action, subtype)
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    pub fn with_position(mut self, x: f32, y: f32) -> Self {
        self.position = Some(Position { x, y });
        self
    }
}

/// Node position in the visual editor
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

/// Result of a condition node, also used as an edge label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    True,
    False,
}

impl Outcome {
    pub fn as_bool(self) -> bool {
        matches!(self, Outcome::True)
    }
}

impl From<bool> for Outcome {
    fn from(b: bool) -> Self {
        if b {
            Outcome::True
        } else {
            Outcome::False
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.as_bool() { "true" } else { "false" })
    }
}

/// Directed connection between two nodes of the same flow
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationEdge {
    pub id: EdgeId,
    pub flow_id: FlowId,
    pub source_node_id: NodeId,
    pub target_node_id: NodeId,
    #[serde(default)]
    pub condition_label: Option<Outcome>,
}

impl AutomationEdge {
    pub fn new(flow_id: FlowId, source_node_id: NodeId, target_node_id: NodeId) -> Self {
        Self {
            id: Uuid::new_v4(),
            flow_id,
            source_node_id,
            target_node_id,
            condition_label: None,
        }
    }

    pub fn labeled(mut self, label: Outcome) -> Self {
        self.condition_label = Some(label);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Running,
    Succeeded,
    Failed,
    Partial,
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ExecutionStatus::Running)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExecutionStatus::Running => "running",
            ExecutionStatus::Succeeded => "succeeded",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Partial => "partial",
            ExecutionStatus::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// One run of a flow
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    pub id: ExecutionId,
    pub flow_id: FlowId,
    pub trigger_context: TriggerContext,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

/// Record of one node visited by an execution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStep {
    pub id: StepId,
    pub execution_id: ExecutionId,
    pub node_id: NodeId,
    pub status: StepStatus,
    pub input: Option<serde_json::Value>,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// A flow together with its nodes and edges, as kept in flow files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowDefinition {
    pub flow: Flow,
    #[serde(default)]
    pub nodes: Vec<AutomationNode>,
    #[serde(default)]
    pub edges: Vec<AutomationEdge>,
}

impl FlowDefinition {
    pub fn new(flow: Flow) -> Self {
        Self {
            flow,
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn flow_id(&self) -> FlowId {
        self.flow.id
    }

    /// Adds a node, re-homing it onto this flow.
    pub fn add_node(&mut self, mut node: AutomationNode) -> NodeId {
        node.flow_id = self.flow.id;
        let id = node.id;
        self.nodes.push(node);
        id
    }

    pub fn connect(&mut self, from: NodeId, to: NodeId) -> EdgeId {
        let edge = AutomationEdge::new(self.flow.id, from, to);
        let id = edge.id;
        self.edges.push(edge);
        id
    }

    pub fn connect_on(&mut self, from: NodeId, label: Outcome, to: NodeId) -> EdgeId {
        let edge = AutomationEdge::new(self.flow.id, from, to).labeled(label);
        let id = edge.id;
        self.edges.push(edge);
        id
    }

    pub fn find_node(&self, id: NodeId) -> Option<&AutomationNode> {
        self.nodes.iter().find(|n| n.id == id)
    }
}
