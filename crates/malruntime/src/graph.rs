use malcore::{
    AutomationEdge, AutomationError, AutomationNode, EdgeId, FlowId, FlowStore, GraphError, NodeId,
    NodeRegistry, NodeType, Outcome,
};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use petgraph::Direction;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

/// In-memory graph of one flow's nodes and edges.
///
/// Edges whose endpoints are missing are kept in the edge list so that
/// validation can report them, but they never enter the adjacency graph.
pub struct AutomationGraph {
    flow_id: FlowId,
    nodes: HashMap<NodeId, AutomationNode>,
    /// Node ids in stored order, for deterministic traversal.
    order: Vec<NodeId>,
    edges: Vec<AutomationEdge>,
    /// Indices into `edges`, per source node, in stored order.
    outgoing: HashMap<NodeId, Vec<usize>>,
    graph: DiGraph<NodeId, EdgeId>,
    index: HashMap<NodeId, NodeIndex>,
}

impl AutomationGraph {
    pub fn new(flow_id: FlowId, nodes: Vec<AutomationNode>, edges: Vec<AutomationEdge>) -> Self {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();
        let mut order = Vec::with_capacity(nodes.len());
        let mut node_map = HashMap::with_capacity(nodes.len());

        for node in nodes {
            if node_map.contains_key(&node.id) {
                tracing::warn!(node_id = %node.id, "Duplicate node id in flow {}, keeping first", flow_id);
                continue;
            }
            index.insert(node.id, graph.add_node(node.id));
            order.push(node.id);
            node_map.insert(node.id, node);
        }

        let mut outgoing: HashMap<NodeId, Vec<usize>> = HashMap::new();
        for (position, edge) in edges.iter().enumerate() {
            outgoing.entry(edge.source_node_id).or_default().push(position);
            if let (Some(from), Some(to)) = (
                index.get(&edge.source_node_id),
                index.get(&edge.target_node_id),
            ) {
                graph.add_edge(*from, *to, edge.id);
            }
        }

        Self {
            flow_id,
            nodes: node_map,
            order,
            edges,
            outgoing,
            graph,
            index,
        }
    }

    /// Load a flow's nodes and edges from the store.
    pub async fn load(store: &dyn FlowStore, flow_id: FlowId) -> Result<Self, AutomationError> {
        let nodes = store.get_nodes_for_flow(flow_id).await?;
        let edges = store.get_edges_for_flow(flow_id).await?;
        tracing::debug!(
            %flow_id,
            nodes = nodes.len(),
            edges = edges.len(),
            "Built automation graph"
        );
        Ok(Self::new(flow_id, nodes, edges))
    }

    pub fn flow_id(&self) -> FlowId {
        self.flow_id
    }

    pub fn node(&self, id: NodeId) -> Option<&AutomationNode> {
        self.nodes.get(&id)
    }

    /// Nodes in stored order.
    pub fn nodes(&self) -> impl Iterator<Item = &AutomationNode> {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    pub fn edges(&self) -> &[AutomationEdge] {
        &self.edges
    }

    pub fn node_count(&self) -> usize {
        self.order.len()
    }

    pub fn trigger_nodes(&self) -> Vec<&AutomationNode> {
        self.nodes()
            .filter(|n| n.node_type == NodeType::Trigger)
            .collect()
    }

    /// The flow's entry node, if it has one.
    pub fn trigger_node(&self) -> Option<&AutomationNode> {
        self.nodes().find(|n| n.node_type == NodeType::Trigger)
    }

    /// All stored edges leaving `node_id`, dangling ones included.
    pub fn outgoing(&self, node_id: NodeId) -> impl Iterator<Item = &AutomationEdge> {
        self.outgoing
            .get(&node_id)
            .into_iter()
            .flatten()
            .map(move |&i| &self.edges[i])
    }

    /// Outgoing edges whose target exists.
    fn live_targets(&self, node_id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.outgoing(node_id)
            .map(|e| e.target_node_id)
            .filter(move |target| self.nodes.contains_key(target))
    }

    /// Nodes to visit after `node_id` given its evaluation outcome.
    ///
    /// Condition nodes take the edges labeled with their outcome and fall
    /// back to unlabeled edges only when no labeled edge matches. Trigger
    /// and action nodes fan out over every outgoing edge.
    pub fn next_nodes(&self, node_id: NodeId, outcome: Option<Outcome>) -> Vec<NodeId> {
        let Some(node) = self.nodes.get(&node_id) else {
            return Vec::new();
        };

        let live = |e: &&AutomationEdge| self.nodes.contains_key(&e.target_node_id);

        let chosen: Vec<&AutomationEdge> = match node.node_type {
            NodeType::Condition => {
                let labeled: Vec<&AutomationEdge> = match outcome {
                    Some(outcome) => self
                        .outgoing(node_id)
                        .filter(live)
                        .filter(|e| e.condition_label == Some(outcome))
                        .collect(),
                    None => Vec::new(),
                };
                if labeled.is_empty() {
                    self.outgoing(node_id)
                        .filter(live)
                        .filter(|e| e.condition_label.is_none())
                        .collect()
                } else {
                    labeled
                }
            }
            NodeType::Trigger | NodeType::Action => self.outgoing(node_id).filter(live).collect(),
        };

        chosen.into_iter().map(|e| e.target_node_id).collect()
    }

    /// Every node reachable from `start`, itself included.
    pub fn reachable_nodes(&self, start: NodeId) -> HashSet<NodeId> {
        let mut reachable = HashSet::new();
        let Some(&start_idx) = self.index.get(&start) else {
            return reachable;
        };
        let mut dfs = Dfs::new(&self.graph, start_idx);
        while let Some(idx) = dfs.next(&self.graph) {
            reachable.insert(self.graph[idx]);
        }
        reachable
    }

    /// Simple paths from the trigger node to `target`, shortest first.
    pub fn find_paths_to_node(&self, target: NodeId) -> Vec<Vec<NodeId>> {
        let mut paths = Vec::new();
        let Some(start) = self.trigger_node().map(|n| n.id) else {
            return paths;
        };
        if !self.nodes.contains_key(&target) {
            return paths;
        }

        let mut queue = VecDeque::from([vec![start]]);
        while let Some(path) = queue.pop_front() {
            let last = path[path.len() - 1];
            if last == target {
                paths.push(path);
                continue;
            }
            for next in self.live_targets(last) {
                if !path.contains(&next) {
                    let mut extended = path.clone();
                    extended.push(next);
                    queue.push_back(extended);
                }
            }
        }
        paths
    }

    /// Cycles found by depth-first search, each as the path that closes it
    /// (first and last element are the same node).
    pub fn detect_cycles(&self) -> Vec<Vec<NodeId>> {
        let mut cycles = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = Vec::new();

        for &id in &self.order {
            if !visited.contains(&id) {
                self.cycle_dfs(id, &mut visited, &mut stack, &mut cycles);
            }
        }
        cycles
    }

    fn cycle_dfs(
        &self,
        node_id: NodeId,
        visited: &mut HashSet<NodeId>,
        stack: &mut Vec<NodeId>,
        cycles: &mut Vec<Vec<NodeId>>,
    ) {
        visited.insert(node_id);
        stack.push(node_id);

        for next in self.live_targets(node_id).collect::<Vec<_>>() {
            if let Some(pos) = stack.iter().position(|&id| id == next) {
                let mut cycle = stack[pos..].to_vec();
                cycle.push(next);
                cycles.push(cycle);
            } else if !visited.contains(&next) {
                self.cycle_dfs(next, visited, stack, cycles);
            }
        }

        stack.pop();
    }

    /// Kahn's algorithm. `None` iff the graph has a cycle.
    pub fn topological_sort(&self) -> Option<Vec<NodeId>> {
        let mut in_degree: HashMap<NodeId, usize> = self
            .order
            .iter()
            .map(|id| {
                let idx = self.index[id];
                (*id, self.graph.edges_directed(idx, Direction::Incoming).count())
            })
            .collect();

        let mut queue: VecDeque<NodeId> = self
            .order
            .iter()
            .copied()
            .filter(|id| in_degree[id] == 0)
            .collect();

        let mut sorted = Vec::with_capacity(self.order.len());
        while let Some(id) = queue.pop_front() {
            sorted.push(id);
            for next in self.live_targets(id) {
                if let Some(degree) = in_degree.get_mut(&next) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(next);
                    }
                }
            }
        }

        if sorted.len() < self.order.len() {
            None
        } else {
            Some(sorted)
        }
    }

    /// Nodes with no outgoing edges at all.
    pub fn dead_ends(&self) -> Vec<NodeId> {
        self.order
            .iter()
            .copied()
            .filter(|id| self.outgoing.get(id).map_or(true, Vec::is_empty))
            .collect()
    }

    /// Structural check. Errors make the graph unrunnable; warnings are
    /// worth a look but never block execution.
    pub fn validate(&self) -> GraphValidation {
        let mut report = GraphValidation::default();

        let triggers = self.trigger_nodes();
        if triggers.len() != 1 {
            report.errors.push(GraphIssue::TriggerCount(triggers.len()));
        }

        for edge in &self.edges {
            for (end, node_id) in [
                (EdgeEnd::Source, edge.source_node_id),
                (EdgeEnd::Target, edge.target_node_id),
            ] {
                if !self.nodes.contains_key(&node_id) {
                    report.errors.push(GraphIssue::DanglingEdge {
                        edge_id: edge.id,
                        end,
                        node_id,
                    });
                }
            }
        }

        if let Some(trigger) = triggers.first() {
            let reachable = self.reachable_nodes(trigger.id);
            for id in &self.order {
                if !reachable.contains(id) {
                    report.warnings.push(GraphIssue::Unreachable(*id));
                }
            }
        }

        for cycle in self.detect_cycles() {
            report.warnings.push(GraphIssue::Cycle(cycle));
        }

        let dead_ends = self.dead_ends();
        if dead_ends.len() > 1 {
            report.warnings.push(GraphIssue::MultipleDeadEnds(dead_ends));
        }

        report
    }

    /// Per-node configuration problems reported by the registered handlers.
    pub fn lint_configs(&self, registry: &NodeRegistry) -> Vec<String> {
        let mut problems = Vec::new();
        for node in self.nodes() {
            if !registry.contains(node.node_type, &node.subtype) {
                problems.push(format!(
                    "node {}: unknown {} subtype '{}'",
                    node.id, node.node_type, node.subtype
                ));
                continue;
            }
            if let Some(action) = registry.action(&node.subtype) {
                if node.node_type == NodeType::Action {
                    for problem in action.validate_config(&node.config) {
                        problems.push(format!("node {} ({}): {}", node.id, node.subtype, problem));
                    }
                }
            }
        }
        problems
    }
}

/// Load, validate and log a flow's graph; fails on structural errors.
pub async fn build_and_validate(store: &dyn FlowStore, flow_id: FlowId) -> Result<AutomationGraph, AutomationError> {
    let graph = AutomationGraph::load(store, flow_id).await?;
    let report = graph.validate();

    for warning in &report.warnings {
        tracing::warn!(%flow_id, "Graph warning: {}", warning);
    }

    if graph.trigger_node().is_none() {
        return Err(GraphError::NoTriggerNode { flow_id }.into());
    }
    if !report.is_valid() {
        return Err(GraphError::Invalid {
            flow_id,
            errors: report.errors.iter().map(ToString::to_string).collect(),
        }
        .into());
    }
    Ok(graph)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeEnd {
    Source,
    Target,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphIssue {
    TriggerCount(usize),
    DanglingEdge {
        edge_id: EdgeId,
        end: EdgeEnd,
        node_id: NodeId,
    },
    Unreachable(NodeId),
    Cycle(Vec<NodeId>),
    MultipleDeadEnds(Vec<NodeId>),
}

impl fmt::Display for GraphIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphIssue::TriggerCount(count) => {
                write!(f, "expected exactly one trigger node, found {}", count)
            }
            GraphIssue::DanglingEdge { edge_id, end, node_id } => {
                let end = match end {
                    EdgeEnd::Source => "source",
                    EdgeEnd::Target => "target",
                };
                write!(f, "edge {} has unknown {} node {}", edge_id, end, node_id)
            }
            GraphIssue::Unreachable(id) => write!(f, "node {} is unreachable from the trigger", id),
            GraphIssue::Cycle(path) => {
                let path: Vec<String> = path.iter().map(ToString::to_string).collect();
                write!(f, "cycle detected: {}", path.join(" -> "))
            }
            GraphIssue::MultipleDeadEnds(ids) => {
                write!(f, "{} nodes have no outgoing edges", ids.len())
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GraphValidation {
    pub errors: Vec<GraphIssue>,
    pub warnings: Vec<GraphIssue>,
}

impl GraphValidation {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}
