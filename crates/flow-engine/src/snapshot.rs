//! Versioned value representation of a flow graph
//!
//! [`FlowDocument`] is the one serialized form shared by undo snapshots,
//! the clipboard and flow files. Components are stored as their registry
//! type plus configuration, so rebuilding a graph never depends on any
//! other persisted state.

use serde::{Deserialize, Serialize};

use crate::constants::formats::DOCUMENT_VERSION;
use crate::error::{FlowError, Result};
use crate::graph::FlowGraph;
use crate::groups::{CompositeNode, CompositePort};
use crate::registry::ComponentRegistry;
use crate::types::{FlowEdge, FlowNode, NodeBody, NodeId, Position};
use crate::validation::{validate_flow, ValidationError};

/// A serialized graph: nodes first, edges second
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowDocument {
    pub version: u32,
    pub nodes: Vec<NodeRecord>,
    pub edges: Vec<FlowEdge>,
}

/// One serialized node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: NodeId,
    pub position: Position,
    pub name: Option<String>,
    pub body: NodeRecordBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRecordBody {
    Component(ComponentRecord),
    Composite(CompositeRecord),
}

/// Registry key and configuration of a wrapped component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentRecord {
    pub component_type: String,
    #[serde(default, with = "config_value")]
    pub config: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeRecord {
    pub name: String,
    pub members: Vec<NodeRecord>,
    pub edges: Vec<FlowEdge>,
    pub boundary: Vec<FlowEdge>,
    pub ports: Vec<CompositePort>,
    pub anchor: Position,
    pub preview: Option<Vec<u8>>,
}

/// Component configuration as a JSON value in text formats and as JSON text
/// in the binary form, which cannot carry self-describing values.
mod config_value {
    use serde::de::Error as _;
    use serde::ser::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &serde_json::Value, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            value.serialize(serializer)
        } else {
            let text = serde_json::to_string(value).map_err(S::Error::custom)?;
            serializer.serialize_str(&text)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<serde_json::Value, D::Error> {
        if deserializer.is_human_readable() {
            serde_json::Value::deserialize(deserializer)
        } else {
            let text = String::deserialize(deserializer)?;
            serde_json::from_str(&text).map_err(D::Error::custom)
        }
    }
}

impl FlowDocument {
    /// An empty document at the current version
    pub fn empty() -> Self {
        Self {
            version: DOCUMENT_VERSION,
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    /// Capture the complete graph, hidden edges included
    pub fn capture(graph: &FlowGraph) -> Self {
        Self {
            version: DOCUMENT_VERSION,
            nodes: graph.nodes().iter().map(NodeRecord::capture).collect(),
            edges: graph.edges().to_vec(),
        }
    }

    /// Capture only the given top-level nodes and the edges between them
    pub fn capture_selection(graph: &FlowGraph, selection: &[NodeId]) -> Self {
        let nodes: Vec<NodeRecord> = graph
            .nodes()
            .iter()
            .filter(|n| selection.contains(&n.id))
            .map(NodeRecord::capture)
            .collect();
        let edges = graph
            .edges()
            .iter()
            .filter(|e| selection.contains(&e.source) && selection.contains(&e.target))
            .cloned()
            .collect();
        Self {
            version: DOCUMENT_VERSION,
            nodes,
            edges,
        }
    }

    /// Rebuild fresh node instances through `registry`
    ///
    /// Edges come back untouched; callers decide how to merge them.
    pub fn instantiate(&self, registry: &ComponentRegistry) -> Result<(Vec<FlowNode>, Vec<FlowEdge>)> {
        if self.version > DOCUMENT_VERSION {
            return Err(FlowError::serialization(format!(
                "Unsupported document version {} (newest known is {})",
                self.version, DOCUMENT_VERSION
            )));
        }
        let nodes = self
            .nodes
            .iter()
            .map(|record| record.instantiate(registry))
            .collect::<Result<Vec<_>>>()?;
        Ok((nodes, self.edges.clone()))
    }

    /// Rebuild a whole graph, dropping edges that point at missing nodes
    pub fn restore(&self, registry: &ComponentRegistry) -> Result<FlowGraph> {
        let (nodes, edges) = self.instantiate(registry)?;
        let mut graph = FlowGraph::from_parts(nodes, edges);

        let problems = validate_flow(&graph);
        if !problems.is_empty() {
            for problem in &problems {
                log::warn!("Restored flow is inconsistent: {}", problem);
            }
            let dangling: Vec<String> = problems
                .iter()
                .filter_map(|p| match p {
                    ValidationError::DanglingEdge { edge_id, .. } => Some(edge_id.clone()),
                    _ => None,
                })
                .collect();
            graph.retain_edges(|e| !dangling.contains(&e.id));
        }
        Ok(graph)
    }

    /// Number of nodes including composite members
    pub fn node_count(&self) -> usize {
        fn count(records: &[NodeRecord]) -> usize {
            records
                .iter()
                .map(|r| match &r.body {
                    NodeRecordBody::Component(_) => 1,
                    NodeRecordBody::Composite(c) => 1 + count(&c.members),
                })
                .sum()
        }
        count(&self.nodes)
    }
}

impl NodeRecord {
    pub fn capture(node: &FlowNode) -> Self {
        let body = match &node.body {
            NodeBody::Component(component) => NodeRecordBody::Component(ComponentRecord {
                component_type: component.component_type().to_string(),
                config: component.config(),
            }),
            NodeBody::Composite(group) => NodeRecordBody::Composite(CompositeRecord {
                name: group.name.clone(),
                members: group.members.iter().map(NodeRecord::capture).collect(),
                edges: group.edges.clone(),
                boundary: group.boundary.clone(),
                ports: group.ports.clone(),
                anchor: group.anchor,
                preview: group.preview.clone(),
            }),
        };
        Self {
            id: node.id.clone(),
            position: node.position,
            name: node.name.clone(),
            body,
        }
    }

    pub fn instantiate(&self, registry: &ComponentRegistry) -> Result<FlowNode> {
        let body = match &self.body {
            NodeRecordBody::Component(record) => {
                NodeBody::Component(registry.create(&record.component_type, &record.config)?)
            }
            NodeRecordBody::Composite(record) => {
                let members = record
                    .members
                    .iter()
                    .map(|m| m.instantiate(registry))
                    .collect::<Result<Vec<_>>>()?;
                NodeBody::Composite(Box::new(CompositeNode {
                    name: record.name.clone(),
                    members,
                    edges: record.edges.clone(),
                    boundary: record.boundary.clone(),
                    ports: record.ports.clone(),
                    anchor: record.anchor,
                    preview: record.preview.clone(),
                }))
            }
        };
        Ok(FlowNode {
            id: self.id.clone(),
            position: self.position,
            name: self.name.clone(),
            body,
        })
    }
}
