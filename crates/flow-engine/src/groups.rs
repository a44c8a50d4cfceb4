//! Composite nodes - collapsed subgraphs on the canvas
//!
//! Grouping a selection replaces the selected nodes with one composite node
//! that owns them. Edges crossing the selection boundary are kept inside the
//! composite as hidden edges, and each one gets a port plus a visible port
//! edge between the far node and the composite. Ungrouping puts the members
//! back and unhides the stored boundary edges.
//!
//! # Example
//!
//! ```ignore
//! let composite_id = GroupOperations::group(
//!     &mut graph,
//!     &["filter".into(), "learner".into()],
//!     "Cross validation",
//!     config.node_size,
//!     None,
//! )?;
//! let members = GroupOperations::ungroup(&mut graph, &composite_id)?;
//! ```

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::capability::{implements, Capability, SignalKind};
use crate::error::{FlowError, Result};
use crate::graph::FlowGraph;
use crate::types::{new_node_id, EdgeId, FlowEdge, FlowNode, NodeBody, NodeId, Position, Rect};
use crate::validation::ValidationError;

/// Produces the thumbnail shown on a collapsed group
///
/// Painting is up to the embedding UI; the engine only stores the bytes.
pub trait PreviewRenderer: Send + Sync {
    fn render(&self, region: &Rect) -> Option<Vec<u8>>;
}

/// Which side of the composite a port sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortDirection {
    /// Far node outside feeds a member
    Input,
    /// A member feeds the far node outside
    Output,
}

/// A synthetic port created for one boundary edge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositePort {
    pub id: String,
    pub direction: PortDirection,
    /// Member on the inside end of the boundary edge
    pub member: NodeId,
    /// Node on the outside end of the boundary edge
    pub far: NodeId,
    pub kind: SignalKind,
    /// Hidden edge stored in the composite
    pub boundary_edge: EdgeId,
    /// Visible edge between `far` and the composite
    pub port_edge: EdgeId,
}

/// A collapsed subgraph
#[derive(Debug, Clone)]
pub struct CompositeNode {
    /// Display name (never empty)
    pub name: String,
    /// Member nodes with their absolute canvas positions
    pub members: Vec<FlowNode>,
    /// Edges between members
    pub edges: Vec<FlowEdge>,
    /// Severed boundary edges, hidden while grouped
    pub boundary: Vec<FlowEdge>,
    pub ports: Vec<CompositePort>,
    /// Composite position at grouping time
    pub anchor: Position,
    /// Thumbnail from the preview renderer, if any
    pub preview: Option<Vec<u8>>,
}

impl CompositeNode {
    pub fn find_member(&self, id: &str) -> Option<&FlowNode> {
        self.members.iter().find(|m| m.id == id)
    }

    pub fn contains_member(&self, id: &str) -> bool {
        self.find_member(id).is_some()
    }

    pub fn member_ids(&self) -> Vec<&str> {
        self.members.iter().map(|m| m.id.as_str()).collect()
    }

    /// Ports on one side, in creation order
    pub fn ports(&self, direction: PortDirection) -> impl Iterator<Item = &CompositePort> {
        self.ports.iter().filter(move |p| p.direction == direction)
    }

    /// Distinct members sitting on the given boundary
    pub fn boundary_members(&self, direction: PortDirection) -> Vec<&FlowNode> {
        let mut seen = HashSet::new();
        self.ports(direction)
            .filter(|p| seen.insert(p.member.as_str()))
            .filter_map(|p| self.find_member(&p.member))
            .collect()
    }

    /// The input-boundary member that receives `kind`
    pub fn receiving_member(&self, kind: &SignalKind) -> Option<&FlowNode> {
        let wanted = Capability::EventListener(kind.listener.clone());
        self.boundary_members(PortDirection::Input)
            .into_iter()
            .find(|m| m.component().is_some_and(|c| implements(c.as_ref(), &wanted)))
    }

    /// The output-boundary member that emits `kind`
    pub fn emitting_member(&self, kind: &SignalKind) -> Option<&FlowNode> {
        self.boundary_members(PortDirection::Output)
            .into_iter()
            .find(|m| m.signal_kinds().contains(kind))
    }

    /// Signal kinds offered by the output-boundary members
    pub fn signal_kinds(&self) -> Vec<SignalKind> {
        let mut kinds: Vec<SignalKind> = Vec::new();
        for member in self.boundary_members(PortDirection::Output) {
            for kind in member.signal_kinds() {
                if !kinds.contains(&kind) {
                    kinds.push(kind);
                }
            }
        }
        kinds
    }

    /// Drop boundary edges and ports whose far end is `far`
    ///
    /// Returns how many ports were removed.
    pub fn prune_far(&mut self, far: &str) -> usize {
        let doomed: Vec<EdgeId> = self
            .ports
            .iter()
            .filter(|p| p.far == far)
            .map(|p| p.boundary_edge.clone())
            .collect();
        self.ports.retain(|p| p.far != far);
        self.boundary.retain(|e| !doomed.contains(&e.id));
        doomed.len()
    }

    /// Drop the port (and its boundary edge) behind a removed port edge
    pub fn prune_port_edge(&mut self, port_edge: &str) -> bool {
        let Some(index) = self.ports.iter().position(|p| p.port_edge == port_edge) else {
            return false;
        };
        let port = self.ports.remove(index);
        self.boundary.retain(|e| e.id != port.boundary_edge);
        true
    }

    /// Move members and anchor together, keeping the ungroup offset intact
    pub(crate) fn translate(&mut self, dx: f64, dy: f64) {
        for member in &mut self.members {
            member.position.0 += dx;
            member.position.1 += dy;
        }
        self.anchor.0 += dx;
        self.anchor.1 += dy;
    }
}

/// Edges of a graph split against a node selection
#[derive(Debug, Clone, Default)]
pub struct BoundaryAnalysis {
    /// Both endpoints selected
    pub internal: Vec<FlowEdge>,
    /// Target selected, source outside
    pub incoming: Vec<FlowEdge>,
    /// Source selected, target outside
    pub outgoing: Vec<FlowEdge>,
}

impl BoundaryAnalysis {
    pub fn of(graph: &FlowGraph, selection: &HashSet<&str>) -> Self {
        let mut analysis = Self::default();
        for edge in graph.edges() {
            let source_inside = selection.contains(edge.source.as_str());
            let target_inside = selection.contains(edge.target.as_str());
            match (source_inside, target_inside) {
                (true, true) => analysis.internal.push(edge.clone()),
                (false, true) => analysis.incoming.push(edge.clone()),
                (true, false) => analysis.outgoing.push(edge.clone()),
                (false, false) => {}
            }
        }
        analysis
    }
}

/// Grouping and ungrouping on a graph
pub struct GroupOperations;

impl GroupOperations {
    /// Collapse `selection` into a new composite named `name`
    ///
    /// Rejects an empty selection, a selection containing a composite, a
    /// selection without both incoming and outgoing boundary edges, and a
    /// blank name. Returns the composite's id.
    pub fn group(
        graph: &mut FlowGraph,
        selection: &[NodeId],
        name: &str,
        node_size: (f64, f64),
        renderer: Option<&dyn PreviewRenderer>,
    ) -> Result<NodeId> {
        let mut selected: HashSet<&str> = HashSet::new();
        let ordered: Vec<NodeId> = selection
            .iter()
            .filter(|id| selected.insert(id.as_str()))
            .cloned()
            .collect();
        if ordered.is_empty() {
            return Err(ValidationError::EmptySelection.into());
        }
        for id in &ordered {
            let node = graph
                .node(id)
                .ok_or_else(|| FlowError::NodeNotFound(id.clone()))?;
            if node.is_composite() {
                return Err(ValidationError::NestedComposite(id.clone()).into());
            }
        }

        let analysis = BoundaryAnalysis::of(graph, &selected);
        if analysis.incoming.is_empty() || analysis.outgoing.is_empty() {
            return Err(ValidationError::EmptyBoundary {
                incoming: analysis.incoming.len(),
                outgoing: analysis.outgoing.len(),
            }
            .into());
        }

        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyGroupName.into());
        }

        let region = graph
            .bounds_of(&ordered, node_size)
            .ok_or(ValidationError::EmptySelection)?;
        let preview = renderer.and_then(|r| r.render(&region));

        let count = ordered.len() as f64;
        let (sum_x, sum_y) = ordered
            .iter()
            .filter_map(|id| graph.node(id))
            .fold((0.0, 0.0), |(x, y), n| (x + n.position.0, y + n.position.1));
        let anchor = (sum_x / count, sum_y / count);

        let composite_id = new_node_id();
        let mut ports = Vec::new();
        let mut port_edges = Vec::new();
        let mut boundary = Vec::new();
        let mut handoffs = Vec::new();
        for (direction, edges) in [
            (PortDirection::Input, &analysis.incoming),
            (PortDirection::Output, &analysis.outgoing),
        ] {
            for edge in edges {
                let (member, far, port_edge) = match direction {
                    PortDirection::Input => (
                        edge.target.clone(),
                        edge.source.clone(),
                        FlowEdge::new(edge.source.clone(), composite_id.clone(), edge.kind.clone()),
                    ),
                    PortDirection::Output => (
                        edge.source.clone(),
                        edge.target.clone(),
                        FlowEdge::new(composite_id.clone(), edge.target.clone(), edge.kind.clone()),
                    ),
                };
                if graph.node(&far).is_some_and(|n| n.is_composite()) {
                    handoffs.push((far.clone(), edge.id.clone(), port_edge.id.clone()));
                }
                ports.push(CompositePort {
                    id: format!("port-{}", uuid::Uuid::new_v4()),
                    direction,
                    member,
                    far,
                    kind: edge.kind.clone(),
                    boundary_edge: edge.id.clone(),
                    port_edge: port_edge.id.clone(),
                });
                port_edges.push(port_edge);
                boundary.push(FlowEdge {
                    hidden: true,
                    ..edge.clone()
                });
            }
        }

        let members = graph.detach_nodes(&selected);
        graph.retain_edges(|e| {
            !selected.contains(e.source.as_str()) && !selected.contains(e.target.as_str())
        });

        let composite = CompositeNode {
            name: name.to_string(),
            members,
            edges: analysis.internal,
            boundary,
            ports,
            anchor,
            preview,
        };
        log::debug!(
            "Grouped {} node(s) into composite '{}' ({} port(s))",
            composite.members.len(),
            composite_id,
            composite.ports.len()
        );
        graph.add_node(FlowNode {
            id: composite_id.clone(),
            position: anchor,
            name: None,
            body: NodeBody::Composite(Box::new(composite)),
        })?;
        for edge in port_edges {
            graph.add_edge(edge)?;
        }
        // A neighbouring composite's port edge now ends inside the new
        // composite; its port must follow the replacement edge.
        for (neighbour, old_edge, new_edge) in handoffs {
            if let Some(port) = graph
                .node_mut(&neighbour)
                .and_then(|n| n.composite_mut())
                .and_then(|g| g.ports.iter_mut().find(|p| p.port_edge == old_edge))
            {
                port.port_edge = new_edge;
                port.far = composite_id.clone();
            }
        }
        Ok(composite_id)
    }

    /// Expand a composite back into its members
    ///
    /// Members move by however far the composite moved since grouping.
    /// Stored boundary edges come back unhidden; one whose far node has
    /// since been grouped elsewhere ends on that composite instead. Edges
    /// attached to the composite after grouping are re-pointed to the member
    /// that receives or emits their signal. A connection that already exists
    /// is never added twice. Returns the member ids.
    pub fn ungroup(graph: &mut FlowGraph, composite_id: &str) -> Result<Vec<NodeId>> {
        let node = graph
            .node(composite_id)
            .ok_or_else(|| FlowError::NodeNotFound(composite_id.to_string()))?;
        let group = node
            .composite()
            .ok_or_else(|| ValidationError::NotComposite(composite_id.to_string()))?;
        let delta = (
            node.position.0 - group.anchor.0,
            node.position.1 - group.anchor.1,
        );

        let own_port_edges: HashSet<EdgeId> = group.ports.iter().map(|p| p.port_edge.clone()).collect();
        let mut attached = Vec::new();
        for edge in graph.edges().iter().filter(|e| e.touches(composite_id)) {
            if own_port_edges.contains(&edge.id) {
                continue;
            }
            let mut edge = edge.clone();
            if edge.target == composite_id {
                match group.receiving_member(&edge.kind) {
                    Some(member) => edge.target = member.id.clone(),
                    None => {
                        log::warn!("Dropping edge '{}': no member receives '{}'", edge.id, edge.kind.name);
                        continue;
                    }
                }
            }
            if edge.source == composite_id {
                match group.emitting_member(&edge.kind) {
                    Some(member) => edge.source = member.id.clone(),
                    None => {
                        log::warn!("Dropping edge '{}': no member emits '{}'", edge.id, edge.kind.name);
                        continue;
                    }
                }
            }
            attached.push(edge);
        }

        let detached = graph.detach_nodes(&HashSet::from([composite_id]));
        graph.retain_edges(|e| !e.touches(composite_id));
        let Some(NodeBody::Composite(group)) = detached.into_iter().next().map(|n| n.body) else {
            return Err(ValidationError::NotComposite(composite_id.to_string()).into());
        };
        let group = *group;

        let mut member_ids = Vec::with_capacity(group.members.len());
        for mut member in group.members {
            member.position.0 += delta.0;
            member.position.1 += delta.1;
            member_ids.push(graph.add_node(member)?);
        }
        for edge in group.edges {
            Self::add_unique(graph, edge)?;
        }
        for mut original in group.boundary {
            original.hidden = false;
            let mut edge = original.clone();
            if !Self::resolve_far_end(graph, &mut edge) {
                log::warn!("Dropping boundary edge '{}': endpoint no longer exists", edge.id);
                continue;
            }
            if edge.source == original.source && edge.target == original.target {
                Self::add_unique(graph, edge)?;
                continue;
            }
            let visible = FlowEdge::new(edge.source, edge.target, edge.kind);
            if Self::add_unique(graph, visible.clone())? {
                Self::rehome_port(graph, &own_port_edges, &original, &visible);
            }
        }
        for edge in attached {
            Self::add_unique(graph, edge)?;
        }

        log::debug!("Ungrouped composite '{}' into {} node(s)", composite_id, member_ids.len());
        Ok(member_ids)
    }

    /// Add `edge` unless the same connection is already on the top level
    fn add_unique(graph: &mut FlowGraph, edge: FlowEdge) -> Result<bool> {
        if graph.has_connection(&edge.source, &edge.target, &edge.kind) {
            log::debug!(
                "Skipping edge '{}': {} -> {} ('{}') already connected",
                edge.id,
                edge.source,
                edge.target,
                edge.kind.name
            );
            return Ok(false);
        }
        graph.add_edge(edge)?;
        Ok(true)
    }

    /// Re-anchor the port a holding composite kept for one of the dissolved
    /// composite's port edges
    ///
    /// `original` is the restored boundary edge between leaves; `visible`
    /// is the same connection with one end replaced by the composite that
    /// now holds that leaf. The holder's port takes `visible` as its port
    /// edge and `original` as its hidden boundary edge.
    fn rehome_port(graph: &mut FlowGraph, stale: &HashSet<EdgeId>, original: &FlowEdge, visible: &FlowEdge) {
        let (holder, member, far) = if visible.target != original.target {
            (&visible.target, &original.target, &original.source)
        } else {
            (&visible.source, &original.source, &original.target)
        };
        let Some(group) = graph.node_mut(holder).and_then(|n| n.composite_mut()) else {
            return;
        };
        let Some(port) = group
            .ports
            .iter_mut()
            .find(|p| &p.member == member && stale.contains(&p.port_edge))
        else {
            return;
        };
        let replaced = std::mem::replace(&mut port.boundary_edge, original.id.clone());
        port.port_edge = visible.id.clone();
        port.far = far.clone();
        group.boundary.retain(|e| e.id != replaced);
        group.boundary.push(FlowEdge {
            hidden: true,
            ..original.clone()
        });
    }

    /// Point a restored boundary edge at whatever now holds its far node
    ///
    /// The far node is either still on the top level or has since been
    /// grouped into another composite.
    fn resolve_far_end(graph: &FlowGraph, edge: &mut FlowEdge) -> bool {
        for endpoint in [&mut edge.source, &mut edge.target] {
            if graph.node(endpoint).is_some() {
                continue;
            }
            let holder = graph
                .nodes()
                .iter()
                .find(|n| n.composite().is_some_and(|g| g.contains_member(endpoint)));
            match holder {
                Some(holder) => *endpoint = holder.id.clone(),
                None => return false,
            }
        }
        true
    }
}
