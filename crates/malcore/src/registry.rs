use crate::model::NodeType;
use crate::node::{ActionHandler, ConditionHandler, TriggerHandler};
use std::collections::HashMap;
use std::sync::Arc;

/// Summary of one registered handler, for listings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerInfo {
    pub node_type: NodeType,
    pub subtype: String,
    pub description: String,
}

/// Registry of trigger, condition and action handlers keyed by subtype
#[derive(Default)]
pub struct NodeRegistry {
    triggers: HashMap<String, Arc<dyn TriggerHandler>>,
    conditions: HashMap<String, Arc<dyn ConditionHandler>>,
    actions: HashMap<String, Arc<dyn ActionHandler>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_trigger(&mut self, handler: Arc<dyn TriggerHandler>) {
        let subtype = handler.subtype().to_string();
        tracing::debug!("Registering trigger handler: {}", subtype);
        self.triggers.insert(subtype, handler);
    }

    pub fn register_condition(&mut self, handler: Arc<dyn ConditionHandler>) {
        let subtype = handler.subtype().to_string();
        tracing::debug!("Registering condition handler: {}", subtype);
        self.conditions.insert(subtype, handler);
    }

    pub fn register_action(&mut self, handler: Arc<dyn ActionHandler>) {
        let subtype = handler.subtype().to_string();
        tracing::debug!("Registering action handler: {}", subtype);
        self.actions.insert(subtype, handler);
    }

    pub fn trigger(&self, subtype: &str) -> Option<&Arc<dyn TriggerHandler>> {
        self.triggers.get(subtype)
    }

    pub fn condition(&self, subtype: &str) -> Option<&Arc<dyn ConditionHandler>> {
        self.conditions.get(subtype)
    }

    pub fn action(&self, subtype: &str) -> Option<&Arc<dyn ActionHandler>> {
        self.actions.get(subtype)
    }

    pub fn contains(&self, node_type: NodeType, subtype: &str) -> bool {
        match node_type {
            NodeType::Trigger => self.triggers.contains_key(subtype),
            NodeType::Condition => self.conditions.contains_key(subtype),
            NodeType::Action => self.actions.contains_key(subtype),
        }
    }

    /// All handlers, grouped by node type and sorted by subtype.
    pub fn list_handlers(&self) -> Vec<HandlerInfo> {
        let triggers = self.triggers.values().map(|h| HandlerInfo {
            node_type: NodeType::Trigger,
            subtype: h.subtype().to_string(),
            description: h.description().to_string(),
        });
        let conditions = self.conditions.values().map(|h| HandlerInfo {
            node_type: NodeType::Condition,
            subtype: h.subtype().to_string(),
            description: h.description().to_string(),
        });
        let actions = self.actions.values().map(|h| HandlerInfo {
            node_type: NodeType::Action,
            subtype: h.subtype().to_string(),
            description: h.description().to_string(),
        });

        let mut all: Vec<HandlerInfo> = triggers.chain(conditions).chain(actions).collect();
        all.sort_by(|a, b| {
            type_rank(a.node_type)
                .cmp(&type_rank(b.node_type))
                .then_with(|| a.subtype.cmp(&b.subtype))
        });
        all
    }
}

fn type_rank(node_type: NodeType) -> u8 {
    match node_type {
        NodeType::Trigger => 0,
        NodeType::Condition => 1,
        NodeType::Action => 2,
    }
}
