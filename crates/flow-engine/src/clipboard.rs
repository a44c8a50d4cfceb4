//! Process-wide clipboard for subgraphs
//!
//! Copy serializes the selection to JSON text; paste rebuilds fresh
//! instances from that text. The buffer is shared by every workspace of a
//! [`FlowContext`](crate::context::FlowContext), so paste may target a
//! different workspace than copy.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{FlowError, Result};
use crate::graph::FlowGraph;
use crate::groups::PortDirection;
use crate::snapshot::{FlowDocument, NodeRecord, NodeRecordBody};
use crate::types::{new_edge_id, new_node_id, FlowEdge, NodeId, Position};

/// Shared clipboard buffer holding serialized subgraphs
#[derive(Clone, Default)]
pub struct Clipboard {
    buffer: Arc<Mutex<Option<String>>>,
}

impl Clipboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize the selected nodes and the edges among them
    ///
    /// The buffer is only replaced when serialization succeeds. Returns the
    /// number of nodes copied.
    pub fn copy(&self, graph: &FlowGraph, selection: &[NodeId]) -> Result<usize> {
        let document = FlowDocument::capture_selection(graph, selection);
        if document.nodes.is_empty() {
            return Err(FlowError::serialization("Nothing selected to copy"));
        }
        let text = serde_json::to_string(&document)?;
        *self.buffer.lock() = Some(text);
        log::debug!(
            "Copied {} node(s) and {} edge(s) to the clipboard",
            document.nodes.len(),
            document.edges.len()
        );
        Ok(document.nodes.len())
    }

    /// Decode the buffer contents
    pub fn contents(&self) -> Result<FlowDocument> {
        let text = self.buffer.lock().clone().ok_or(FlowError::ClipboardEmpty)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Raw JSON text, for hand-off to a system clipboard
    pub fn text(&self) -> Option<String> {
        self.buffer.lock().clone()
    }

    /// Replace the buffer with externally supplied JSON text
    pub fn set_text(&self, text: impl Into<String>) {
        *self.buffer.lock() = Some(text.into());
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.lock().is_none()
    }

    pub fn clear(&self) {
        *self.buffer.lock() = None;
    }
}

impl std::fmt::Debug for Clipboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Clipboard")
            .field("empty", &self.is_empty())
            .finish()
    }
}

/// Give every node, edge and port in `document` a fresh id and move the
/// nodes so their minimum corner lands on `target`.
///
/// Composite boundary edges whose far node is not part of the pasted set
/// are dropped together with their ports.
pub fn prepare_paste(document: &FlowDocument, target: Position) -> FlowDocument {
    let mut node_ids: HashMap<NodeId, NodeId> = HashMap::new();
    for record in &document.nodes {
        node_ids.insert(record.id.clone(), new_node_id());
    }
    let mut edge_ids = HashMap::new();
    let edges: Vec<FlowEdge> = document
        .edges
        .iter()
        .filter_map(|edge| {
            let source = node_ids.get(&edge.source)?.clone();
            let target = node_ids.get(&edge.target)?.clone();
            let id = new_edge_id();
            edge_ids.insert(edge.id.clone(), id.clone());
            Some(FlowEdge {
                id,
                source,
                target,
                kind: edge.kind.clone(),
                hidden: edge.hidden,
            })
        })
        .collect();

    let min_x = document.nodes.iter().map(|n| n.position.0).fold(f64::INFINITY, f64::min);
    let min_y = document.nodes.iter().map(|n| n.position.1).fold(f64::INFINITY, f64::min);
    let (dx, dy) = if document.nodes.is_empty() {
        (0.0, 0.0)
    } else {
        (target.0 - min_x, target.1 - min_y)
    };

    let nodes = document
        .nodes
        .iter()
        .map(|record| {
            let mut record = remap_record(record, &node_ids, &edge_ids);
            record.id = node_ids.get(&record.id).cloned().unwrap_or_else(new_node_id);
            record.position = (record.position.0 + dx, record.position.1 + dy);
            if let NodeRecordBody::Composite(group) = &mut record.body {
                for member in &mut group.members {
                    member.position = (member.position.0 + dx, member.position.1 + dy);
                }
                group.anchor = (group.anchor.0 + dx, group.anchor.1 + dy);
            }
            record
        })
        .collect();

    FlowDocument {
        version: document.version,
        nodes,
        edges,
    }
}

/// Remap the internals of a composite record; component records pass through
fn remap_record(
    record: &NodeRecord,
    outer_nodes: &HashMap<NodeId, NodeId>,
    outer_edges: &HashMap<String, String>,
) -> NodeRecord {
    let NodeRecordBody::Composite(group) = &record.body else {
        return record.clone();
    };
    let mut group = group.clone();

    let members: HashMap<NodeId, NodeId> = group
        .members
        .iter()
        .map(|m| (m.id.clone(), new_node_id()))
        .collect();
    for member in &mut group.members {
        if let Some(id) = members.get(&member.id) {
            member.id = id.clone();
        }
    }
    for edge in &mut group.edges {
        edge.id = new_edge_id();
        if let Some(id) = members.get(&edge.source) {
            edge.source = id.clone();
        }
        if let Some(id) = members.get(&edge.target) {
            edge.target = id.clone();
        }
    }

    // A port survives only when both its far node and its port edge came along
    let mut boundary_ids = HashMap::new();
    group.ports.retain_mut(|port| {
        let (Some(member), Some(far), Some(port_edge)) = (
            members.get(&port.member),
            outer_nodes.get(&port.far),
            outer_edges.get(&port.port_edge),
        ) else {
            return false;
        };
        let boundary_edge = new_edge_id();
        boundary_ids.insert(
            port.boundary_edge.clone(),
            (boundary_edge.clone(), port.direction, member.clone(), far.clone()),
        );
        port.id = format!("port-{}", uuid::Uuid::new_v4());
        port.member = member.clone();
        port.far = far.clone();
        port.port_edge = port_edge.clone();
        port.boundary_edge = boundary_edge;
        true
    });
    group.boundary.retain_mut(|edge| {
        let Some((id, direction, member, far)) = boundary_ids.get(&edge.id) else {
            return false;
        };
        edge.id = id.clone();
        let (source, target) = match direction {
            PortDirection::Input => (far, member),
            PortDirection::Output => (member, far),
        };
        edge.source = source.clone();
        edge.target = target.clone();
        true
    });

    NodeRecord {
        body: NodeRecordBody::Composite(group),
        ..record.clone()
    }
}
