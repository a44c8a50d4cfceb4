//! Connection and structure validation for flow graphs
//!
//! [`validate_connection`] decides whether a proposed edge is legal before
//! anything is mutated; [`validate_flow`] is the integrity check run after
//! loads and undo restores.

use std::collections::HashSet;

use thiserror::Error;

use crate::capability::{implements, Capability, ListenerKind, SignalKind};
use crate::graph::FlowGraph;
use crate::types::{EdgeId, FlowNode, NodeBody, NodeId};

/// Rejection of a proposed connection, grouping or document
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// An endpoint is not a top-level node of the graph
    #[error("Node '{0}' is not on the canvas")]
    UnknownNode(NodeId),

    /// Source and target are the same node
    #[error("Node '{0}' cannot connect to itself")]
    SelfConnection(NodeId),

    /// The source does not emit the requested signal
    #[error("Node '{node_id}' does not emit '{signal}'")]
    UnknownSignal { node_id: NodeId, signal: String },

    /// The target lacks the listener the signal expects
    #[error("Node '{node_id}' does not implement {listener}")]
    MissingCapability {
        node_id: NodeId,
        listener: ListenerKind,
    },

    /// The target's connection gate refused the signal
    #[error("Node '{node_id}' refused a '{signal}' connection")]
    Vetoed { node_id: NodeId, signal: String },

    /// An identical edge already exists
    #[error("'{signal}' is already connected from '{source_id}' to '{target_id}'")]
    DuplicateConnection {
        source_id: NodeId,
        target_id: NodeId,
        signal: String,
    },

    /// Grouping requested with no nodes
    #[error("Nothing selected")]
    EmptySelection,

    /// Grouping selection contains a composite
    #[error("Composite '{0}' cannot be grouped again")]
    NestedComposite(NodeId),

    /// Grouping selection has no incoming or no outgoing boundary edge
    #[error("Selection needs incoming and outgoing connections (found {incoming} in, {outgoing} out)")]
    EmptyBoundary { incoming: usize, outgoing: usize },

    /// Grouping requested with a blank name
    #[error("Group name must not be empty")]
    EmptyGroupName,

    /// Ungroup requested on a plain node
    #[error("Node '{0}' is not a composite")]
    NotComposite(NodeId),

    /// A node id is already taken
    #[error("Node '{0}' already exists")]
    DuplicateNode(NodeId),

    /// An edge references a node that does not exist
    #[error("Edge '{edge_id}' references missing node '{node_id}'")]
    DanglingEdge { edge_id: EdgeId, node_id: NodeId },
}

/// Check a candidate edge from `source_id`'s `signal` output to `target_id`
///
/// Returns the resolved signal kind on acceptance.
pub fn validate_connection(
    graph: &FlowGraph,
    source_id: &str,
    signal: &str,
    target_id: &str,
) -> Result<SignalKind, ValidationError> {
    let source = graph
        .node(source_id)
        .ok_or_else(|| ValidationError::UnknownNode(source_id.to_string()))?;
    let target = graph
        .node(target_id)
        .ok_or_else(|| ValidationError::UnknownNode(target_id.to_string()))?;

    if source_id == target_id {
        return Err(ValidationError::SelfConnection(source_id.to_string()));
    }

    let kind = source
        .signal_kinds()
        .into_iter()
        .find(|k| k.name == signal)
        .ok_or_else(|| ValidationError::UnknownSignal {
            node_id: source_id.to_string(),
            signal: signal.to_string(),
        })?;

    if graph.has_connection(source_id, target_id, &kind) {
        return Err(ValidationError::DuplicateConnection {
            source_id: source_id.to_string(),
            target_id: target_id.to_string(),
            signal: signal.to_string(),
        });
    }

    check_receiver(target, &kind)?;
    Ok(kind)
}

/// Whether `target` (or, for a composite, its receiving member) accepts `kind`
fn check_receiver(target: &FlowNode, kind: &SignalKind) -> Result<(), ValidationError> {
    let missing = || ValidationError::MissingCapability {
        node_id: target.id.clone(),
        listener: kind.listener.clone(),
    };

    let component = match &target.body {
        NodeBody::Component(component) => component,
        NodeBody::Composite(group) => group
            .receiving_member(kind)
            .and_then(|member| member.component())
            .ok_or_else(missing)?,
    };

    if !implements(component.as_ref(), &Capability::EventListener(kind.listener.clone())) {
        return Err(missing());
    }
    if let Some(gate) = component.as_connection_gate() {
        if !gate.connection_allowed(kind) {
            return Err(ValidationError::Vetoed {
                node_id: target.id.clone(),
                signal: kind.name.clone(),
            });
        }
    }
    Ok(())
}

/// Every node that would accept a `signal` connection from `source_id`
pub fn connectable_targets(graph: &FlowGraph, source_id: &str, signal: &str) -> Vec<NodeId> {
    graph
        .nodes()
        .iter()
        .filter(|n| validate_connection(graph, source_id, signal, &n.id).is_ok())
        .map(|n| n.id.clone())
        .collect()
}

/// Integrity check over the whole graph
///
/// Returns every problem found (not just the first).
pub fn validate_flow(graph: &FlowGraph) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let mut seen = HashSet::new();
    for node in graph.nodes() {
        if !seen.insert(node.id.as_str()) {
            errors.push(ValidationError::DuplicateNode(node.id.clone()));
        }
    }

    for edge in graph.edges() {
        for endpoint in [&edge.source, &edge.target] {
            if graph.node(endpoint).is_none() {
                errors.push(ValidationError::DanglingEdge {
                    edge_id: edge.id.clone(),
                    node_id: endpoint.clone(),
                });
            }
        }
    }

    for node in graph.nodes() {
        let Some(group) = node.composite() else {
            continue;
        };
        for edge in &group.edges {
            for endpoint in [&edge.source, &edge.target] {
                if !group.contains_member(endpoint) {
                    errors.push(ValidationError::DanglingEdge {
                        edge_id: edge.id.clone(),
                        node_id: endpoint.clone(),
                    });
                }
            }
        }
        for edge in &group.boundary {
            for endpoint in [&edge.source, &edge.target] {
                if !graph.contains_node(endpoint) {
                    errors.push(ValidationError::DanglingEdge {
                        edge_id: edge.id.clone(),
                        node_id: endpoint.clone(),
                    });
                }
            }
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::testing::{GatedSink, Relay, Sink, Source};
    use crate::types::{FlowEdge, FlowNode};

    fn graph_with(nodes: Vec<FlowNode>) -> FlowGraph {
        let mut graph = FlowGraph::new();
        for node in nodes {
            graph.add_node(node).unwrap();
        }
        graph
    }

    #[test]
    fn test_accepts_matching_listener() {
        let graph = graph_with(vec![
            FlowNode::new(Arc::new(Source::new("src")), (0.0, 0.0)).with_id("src"),
            FlowNode::new(Arc::new(Sink::new()), (100.0, 0.0)).with_id("sink"),
        ]);
        let kind = validate_connection(&graph, "src", "dataSet", "sink").unwrap();
        assert_eq!(kind.listener.as_str(), "DataSetListener");
    }

    #[test]
    fn test_rejects_self_and_unknown_signal() {
        let graph = graph_with(vec![
            FlowNode::new(Arc::new(Relay::new()), (0.0, 0.0)).with_id("relay"),
            FlowNode::new(Arc::new(Sink::new()), (100.0, 0.0)).with_id("sink"),
        ]);
        assert_eq!(
            validate_connection(&graph, "relay", "dataSet", "relay"),
            Err(ValidationError::SelfConnection("relay".to_string()))
        );
        assert!(matches!(
            validate_connection(&graph, "relay", "chart", "sink"),
            Err(ValidationError::UnknownSignal { .. })
        ));
    }

    #[test]
    fn test_rejects_missing_capability() {
        // Relay listens only for data sets, not instances
        let graph = graph_with(vec![
            FlowNode::new(Arc::new(Source::new("src")), (0.0, 0.0)).with_id("src"),
            FlowNode::new(Arc::new(Relay::new()), (100.0, 0.0)).with_id("relay"),
        ]);
        assert!(matches!(
            validate_connection(&graph, "src", "instance", "relay"),
            Err(ValidationError::MissingCapability { .. })
        ));
    }

    #[test]
    fn test_gate_veto_and_duplicates() {
        let mut graph = graph_with(vec![
            FlowNode::new(Arc::new(Source::new("src")), (0.0, 0.0)).with_id("src"),
            FlowNode::new(Arc::new(GatedSink::closed()), (100.0, 0.0)).with_id("closed"),
            FlowNode::new(Arc::new(Sink::new()), (200.0, 0.0)).with_id("sink"),
        ]);
        assert!(matches!(
            validate_connection(&graph, "src", "dataSet", "closed"),
            Err(ValidationError::Vetoed { .. })
        ));

        let kind = validate_connection(&graph, "src", "dataSet", "sink").unwrap();
        graph.add_edge(FlowEdge::new("src", "sink", kind)).unwrap();
        assert!(matches!(
            validate_connection(&graph, "src", "dataSet", "sink"),
            Err(ValidationError::DuplicateConnection { .. })
        ));
    }

    #[test]
    fn test_connectable_targets() {
        let graph = graph_with(vec![
            FlowNode::new(Arc::new(Source::new("src")), (0.0, 0.0)).with_id("src"),
            FlowNode::new(Arc::new(Sink::new()), (100.0, 0.0)).with_id("sink"),
            FlowNode::new(Arc::new(Relay::new()), (200.0, 0.0)).with_id("relay"),
            FlowNode::new(Arc::new(GatedSink::closed()), (300.0, 0.0)).with_id("closed"),
        ]);
        assert_eq!(
            connectable_targets(&graph, "src", "dataSet"),
            vec!["sink".to_string(), "relay".to_string()]
        );
        assert_eq!(connectable_targets(&graph, "src", "instance"), vec!["sink".to_string()]);
    }

    #[test]
    fn test_validate_flow_clean_graph() {
        let mut graph = graph_with(vec![
            FlowNode::new(Arc::new(Source::new("src")), (0.0, 0.0)).with_id("src"),
            FlowNode::new(Arc::new(Sink::new()), (100.0, 0.0)).with_id("sink"),
        ]);
        let kind = validate_connection(&graph, "src", "dataSet", "sink").unwrap();
        graph.add_edge(FlowEdge::new("src", "sink", kind)).unwrap();
        assert!(validate_flow(&graph).is_empty());
    }
}
