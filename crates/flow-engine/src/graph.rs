//! Graph store for a single workspace
//!
//! Owns the top-level nodes and edges in insertion order. Members of
//! composites live inside their composite node; [`FlowGraph::contains_node`]
//! and [`FlowGraph::leaf_nodes`] look through composites, everything else
//! works on the top level.
//!
//! The store never records undo points itself. Callers snapshot before a
//! mutation so multi-step operations (grouping, paste) stay one undo point.

use std::collections::HashSet;
use std::sync::Arc;

use crate::capability::{Component, SignalKind};
use crate::error::{FlowError, Result};
use crate::types::{EdgeId, FlowEdge, FlowNode, NodeBody, NodeId, Position, Rect};
use crate::validation::ValidationError;

/// Nodes and edges removed together with a node
#[derive(Debug)]
pub struct RemovedNode {
    pub node: FlowNode,
    /// Incident edges removed by the cascade
    pub edges: Vec<FlowEdge>,
}

/// The node and edge sets of one workspace
#[derive(Debug, Clone, Default)]
pub struct FlowGraph {
    nodes: Vec<FlowNode>,
    edges: Vec<FlowEdge>,
}

impl FlowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assemble a graph without validation (used by restores)
    pub(crate) fn from_parts(nodes: Vec<FlowNode>, edges: Vec<FlowEdge>) -> Self {
        Self { nodes, edges }
    }

    pub fn nodes(&self) -> &[FlowNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[FlowEdge] {
        &self.edges
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Top-level node by id
    pub fn node(&self, id: &str) -> Option<&FlowNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut FlowNode> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    pub fn edge(&self, id: &str) -> Option<&FlowEdge> {
        self.edges.iter().find(|e| e.id == id)
    }

    /// Top-level node or composite member by id
    pub fn find_any(&self, id: &str) -> Option<&FlowNode> {
        self.node(id).or_else(|| {
            self.nodes
                .iter()
                .filter_map(|n| n.composite())
                .find_map(|group| group.find_member(id))
        })
    }

    /// Whether `id` is a top-level node or a member of a composite
    pub fn contains_node(&self, id: &str) -> bool {
        self.find_any(id).is_some()
    }

    /// Component nodes in discovery order, composites expanded in place
    pub fn leaf_nodes(&self) -> Vec<&FlowNode> {
        let mut leaves = Vec::new();
        for node in &self.nodes {
            match &node.body {
                NodeBody::Component(_) => leaves.push(node),
                NodeBody::Composite(group) => leaves.extend(group.members.iter()),
            }
        }
        leaves
    }

    /// Wrapped components of every leaf node
    pub fn components(&self) -> Vec<(&NodeId, &Arc<dyn Component>)> {
        self.leaf_nodes()
            .into_iter()
            .filter_map(|n| n.component().map(|c| (&n.id, c)))
            .collect()
    }

    pub fn incoming_edges(&self, id: &str) -> impl Iterator<Item = &FlowEdge> {
        let id = id.to_string();
        self.edges.iter().filter(move |e| e.target == id)
    }

    pub fn outgoing_edges(&self, id: &str) -> impl Iterator<Item = &FlowEdge> {
        let id = id.to_string();
        self.edges.iter().filter(move |e| e.source == id)
    }

    /// Add a node to the top level
    pub fn add_node(&mut self, node: FlowNode) -> Result<NodeId> {
        if self.contains_node(&node.id) {
            return Err(ValidationError::DuplicateNode(node.id).into());
        }
        let id = node.id.clone();
        self.nodes.push(node);
        Ok(id)
    }

    /// Remove a top-level node and every edge incident to it
    ///
    /// Composites that had the node as a far endpoint drop the matching
    /// boundary edges and ports as well.
    pub fn remove_node(&mut self, id: &str) -> Result<RemovedNode> {
        let index = self
            .nodes
            .iter()
            .position(|n| n.id == id)
            .ok_or_else(|| FlowError::NodeNotFound(id.to_string()))?;
        let node = self.nodes.remove(index);

        let (removed, kept): (Vec<FlowEdge>, Vec<FlowEdge>) =
            std::mem::take(&mut self.edges).into_iter().partition(|e| e.touches(id));
        self.edges = kept;

        let mut gone = vec![node.id.clone()];
        if let Some(group) = node.composite() {
            gone.extend(group.members.iter().map(|m| m.id.clone()));
        }
        for other in &mut self.nodes {
            if let Some(group) = other.composite_mut() {
                let pruned: usize = gone.iter().map(|g| group.prune_far(g)).sum();
                if pruned > 0 {
                    log::debug!(
                        "Pruned {} boundary edge(s) of composite '{}' after removing '{}'",
                        pruned,
                        other.id,
                        id
                    );
                }
            }
        }

        Ok(RemovedNode {
            node,
            edges: removed,
        })
    }

    /// Whether a visible or hidden top-level edge already links
    /// `source` to `target` with `kind`
    pub fn has_connection(&self, source: &str, target: &str, kind: &SignalKind) -> bool {
        self.edges
            .iter()
            .any(|e| e.source == source && e.target == target && &e.kind == kind)
    }

    /// Add an edge between two top-level nodes
    ///
    /// Capability checks belong to the validator; this only guards against
    /// dangling endpoints.
    pub fn add_edge(&mut self, edge: FlowEdge) -> Result<EdgeId> {
        for endpoint in [&edge.source, &edge.target] {
            if self.node(endpoint).is_none() {
                return Err(ValidationError::DanglingEdge {
                    edge_id: edge.id.clone(),
                    node_id: endpoint.clone(),
                }
                .into());
            }
        }
        let id = edge.id.clone();
        self.edges.push(edge);
        Ok(id)
    }

    /// Remove a top-level edge; removing a composite port edge also drops
    /// the boundary edge behind it.
    pub fn remove_edge(&mut self, id: &str) -> Result<FlowEdge> {
        let index = self
            .edges
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| FlowError::EdgeNotFound(id.to_string()))?;
        let edge = self.edges.remove(index);
        for node in &mut self.nodes {
            if let Some(group) = node.composite_mut() {
                group.prune_port_edge(id);
            }
        }
        Ok(edge)
    }

    /// Top-level nodes whose footprint intersects `region`, in insertion order
    pub fn nodes_in_region(&self, region: &Rect, node_size: (f64, f64)) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| n.bounds(node_size).intersects(region))
            .map(|n| n.id.clone())
            .collect()
    }

    /// Top-most node whose footprint contains `point`
    pub fn find_node_at(&self, point: Position, node_size: (f64, f64)) -> Option<NodeId> {
        self.nodes
            .iter()
            .rev()
            .find(|n| n.bounds(node_size).contains(point))
            .map(|n| n.id.clone())
    }

    /// Translate several top-level nodes
    ///
    /// All ids are checked before any node moves.
    pub fn move_nodes(&mut self, ids: &[NodeId], dx: f64, dy: f64) -> Result<()> {
        if let Some(missing) = ids.iter().find(|id| self.node(id).is_none()) {
            return Err(FlowError::NodeNotFound(missing.clone()));
        }
        let wanted: HashSet<&str> = ids.iter().map(|s| s.as_str()).collect();
        for node in &mut self.nodes {
            if wanted.contains(node.id.as_str()) {
                node.position.0 += dx;
                node.position.1 += dy;
                if let Some(group) = node.composite_mut() {
                    group.translate(dx, dy);
                }
            }
        }
        Ok(())
    }

    /// Set a node's custom name
    ///
    /// Composites take the name as their group name; `Named` components are
    /// not touched here (the workspace forwards the name after commit).
    pub fn rename_node(&mut self, id: &str, name: &str) -> Result<()> {
        let node = self
            .node_mut(id)
            .ok_or_else(|| FlowError::NodeNotFound(id.to_string()))?;
        node.name = Some(name.to_string());
        if let Some(group) = node.composite_mut() {
            group.name = name.to_string();
        }
        Ok(())
    }

    /// Bounding rectangle of the given top-level nodes
    pub fn bounds_of(&self, ids: &[NodeId], node_size: (f64, f64)) -> Option<Rect> {
        let mut nodes = self.nodes.iter().filter(|n| ids.contains(&n.id));
        let first = nodes.next()?.bounds(node_size);
        let (mut x0, mut y0) = (first.x, first.y);
        let (mut x1, mut y1) = (first.x + first.width, first.y + first.height);
        for node in nodes {
            let b = node.bounds(node_size);
            x0 = x0.min(b.x);
            y0 = y0.min(b.y);
            x1 = x1.max(b.x + b.width);
            y1 = y1.max(b.y + b.height);
        }
        Some(Rect::from_corners((x0, y0), (x1, y1)))
    }

    /// Take top-level nodes out without touching edges or composites
    pub(crate) fn detach_nodes(&mut self, ids: &HashSet<&str>) -> Vec<FlowNode> {
        let (taken, kept): (Vec<FlowNode>, Vec<FlowNode>) = std::mem::take(&mut self.nodes)
            .into_iter()
            .partition(|n| ids.contains(n.id.as_str()));
        self.nodes = kept;
        taken
    }

    pub(crate) fn retain_edges(&mut self, keep: impl FnMut(&FlowEdge) -> bool) {
        self.edges.retain(keep);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::SignalKind;
    use crate::testing::{data_set, Sink, Source};

    const SIZE: (f64, f64) = (60.0, 60.0);

    fn node(id: &str, x: f64, y: f64) -> FlowNode {
        FlowNode::new(Arc::new(Source::new(id)), (x, y)).with_id(id)
    }

    fn sample() -> FlowGraph {
        let mut graph = FlowGraph::new();
        graph.add_node(node("a", 0.0, 0.0)).unwrap();
        graph.add_node(node("b", 100.0, 0.0)).unwrap();
        graph
            .add_node(FlowNode::new(Arc::new(Sink::new()), (200.0, 0.0)).with_id("c"))
            .unwrap();
        graph.add_edge(FlowEdge::new("a", "b", data_set())).unwrap();
        graph.add_edge(FlowEdge::new("b", "c", data_set())).unwrap();
        graph.add_edge(FlowEdge::new("a", "c", data_set())).unwrap();
        graph
    }

    #[test]
    fn test_remove_node_cascades_edges() {
        let mut graph = sample();
        let removed = graph.remove_node("b").unwrap();
        assert_eq!(removed.node.id, "b");
        assert_eq!(removed.edges.len(), 2);
        assert_eq!(graph.edges().len(), 1);
        for edge in graph.edges() {
            assert!(graph.node(&edge.source).is_some());
            assert!(graph.node(&edge.target).is_some());
        }
    }

    #[test]
    fn test_edge_direction_queries() {
        let graph = sample();
        assert_eq!(graph.outgoing_edges("a").count(), 2);
        assert_eq!(graph.incoming_edges("c").count(), 2);
        assert_eq!(graph.incoming_edges("a").count(), 0);
    }

    #[test]
    fn test_remove_missing_node() {
        let mut graph = sample();
        assert!(matches!(graph.remove_node("zz"), Err(FlowError::NodeNotFound(_))));
    }

    #[test]
    fn test_add_edge_rejects_dangling() {
        let mut graph = sample();
        let err = graph
            .add_edge(FlowEdge::new("a", "ghost", SignalKind::new("x", "Y")))
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(graph.edges().len(), 3);
    }

    #[test]
    fn test_duplicate_node_id() {
        let mut graph = sample();
        assert!(graph.add_node(node("a", 5.0, 5.0)).is_err());
    }

    #[test]
    fn test_spatial_queries() {
        let mut graph = sample();
        // Overlapping node added last wins the hit test
        graph.add_node(node("top", 30.0, 30.0)).unwrap();
        assert_eq!(graph.find_node_at((40.0, 40.0), SIZE), Some("top".to_string()));
        assert_eq!(graph.find_node_at((10.0, 10.0), SIZE), Some("a".to_string()));
        assert_eq!(graph.find_node_at((500.0, 500.0), SIZE), None);

        let region = Rect::from_corners((90.0, -10.0), (250.0, 10.0));
        assert_eq!(
            graph.nodes_in_region(&region, SIZE),
            vec!["b".to_string(), "c".to_string()]
        );
    }

    #[test]
    fn test_move_nodes_all_or_nothing() {
        let mut graph = sample();
        graph
            .move_nodes(&["a".to_string(), "b".to_string()], 10.0, 5.0)
            .unwrap();
        assert_eq!(graph.node("a").unwrap().position, (10.0, 5.0));
        assert_eq!(graph.node("b").unwrap().position, (110.0, 5.0));

        assert!(graph
            .move_nodes(&["a".to_string(), "ghost".to_string()], 1.0, 1.0)
            .is_err());
        assert_eq!(graph.node("a").unwrap().position, (10.0, 5.0));
    }

    #[test]
    fn test_bounds_of() {
        let graph = sample();
        let bounds = graph
            .bounds_of(&["a".to_string(), "c".to_string()], SIZE)
            .unwrap();
        assert_eq!(bounds, Rect::new(0.0, 0.0, 260.0, 60.0));
        assert!(graph.bounds_of(&[], SIZE).is_none());
    }

    #[test]
    fn test_rename_sets_custom_name() {
        let mut graph = sample();
        graph.rename_node("c", "Results").unwrap();
        assert_eq!(graph.node("c").unwrap().label(), "Results");
    }
}
