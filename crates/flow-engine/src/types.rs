//! Core types for flow graphs
//!
//! These types define the structure of a flow: nodes wrapping components,
//! typed edges between them, and canvas geometry.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::capability::{Component, SignalKind};
use crate::groups::CompositeNode;

/// Unique identifier for a node
pub type NodeId = String;

/// Unique identifier for an edge
pub type EdgeId = String;

/// Canvas position (x, y) of a node's top-left corner
pub type Position = (f64, f64);

/// Generate a fresh node id
pub fn new_node_id() -> NodeId {
    format!("node-{}", uuid::Uuid::new_v4())
}

/// Generate a fresh edge id
pub fn new_edge_id() -> EdgeId {
    format!("edge-{}", uuid::Uuid::new_v4())
}

/// Axis-aligned rectangle on the canvas
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle spanned by two corner points, in any order
    pub fn from_corners(a: Position, b: Position) -> Self {
        let (x0, x1) = if a.0 <= b.0 { (a.0, b.0) } else { (b.0, a.0) };
        let (y0, y1) = if a.1 <= b.1 { (a.1, b.1) } else { (b.1, a.1) };
        Self::new(x0, y0, x1 - x0, y1 - y0)
    }

    pub fn contains(&self, point: Position) -> bool {
        point.0 >= self.x
            && point.0 <= self.x + self.width
            && point.1 >= self.y
            && point.1 <= self.y + self.height
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.x <= other.x + other.width
            && other.x <= self.x + self.width
            && self.y <= other.y + other.height
            && other.y <= self.y + self.height
    }

    pub fn center(&self) -> Position {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// A directed, typed connection between two nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowEdge {
    /// Unique identifier for this edge
    pub id: EdgeId,
    /// Source node ID
    pub source: NodeId,
    /// Target node ID
    pub target: NodeId,
    /// Which signal of the source feeds which listener of the target
    pub kind: SignalKind,
    /// True while an endpoint is collapsed inside a composite
    pub hidden: bool,
}

impl FlowEdge {
    /// Create a visible edge with a fresh id
    pub fn new(source: impl Into<NodeId>, target: impl Into<NodeId>, kind: SignalKind) -> Self {
        Self {
            id: new_edge_id(),
            source: source.into(),
            target: target.into(),
            kind,
            hidden: false,
        }
    }

    /// Whether `node_id` is either endpoint
    pub fn touches(&self, node_id: &str) -> bool {
        self.source == node_id || self.target == node_id
    }
}

/// What a node holds: a wrapped component or a collapsed subgraph
#[derive(Clone)]
pub enum NodeBody {
    Component(Arc<dyn Component>),
    Composite(Box<CompositeNode>),
}

/// A placed node on the canvas
#[derive(Clone)]
pub struct FlowNode {
    /// Unique identifier for this node instance
    pub id: NodeId,
    /// Position in the canvas (x, y)
    pub position: Position,
    /// Optional custom display name
    pub name: Option<String>,
    /// Wrapped object
    pub body: NodeBody,
}

impl FlowNode {
    /// Create a node wrapping `component` with a fresh id
    pub fn new(component: Arc<dyn Component>, position: Position) -> Self {
        Self {
            id: new_node_id(),
            position,
            name: None,
            body: NodeBody::Component(component),
        }
    }

    pub fn with_id(mut self, id: impl Into<NodeId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The wrapped component, if this is not a composite
    pub fn component(&self) -> Option<&Arc<dyn Component>> {
        match &self.body {
            NodeBody::Component(c) => Some(c),
            NodeBody::Composite(_) => None,
        }
    }

    pub fn composite(&self) -> Option<&CompositeNode> {
        match &self.body {
            NodeBody::Composite(c) => Some(c),
            NodeBody::Component(_) => None,
        }
    }

    pub fn composite_mut(&mut self) -> Option<&mut CompositeNode> {
        match &mut self.body {
            NodeBody::Composite(c) => Some(c),
            NodeBody::Component(_) => None,
        }
    }

    pub fn is_composite(&self) -> bool {
        matches!(self.body, NodeBody::Composite(_))
    }

    /// Registry key of the wrapped component (`"composite"` for groups)
    pub fn component_type(&self) -> &str {
        match &self.body {
            NodeBody::Component(c) => c.component_type(),
            NodeBody::Composite(_) => "composite",
        }
    }

    /// Display label: custom name, then `Named`, then composite name, then type
    pub fn label(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        match &self.body {
            NodeBody::Component(c) => c
                .as_named()
                .and_then(|n| n.custom_name())
                .unwrap_or_else(|| c.component_type().to_string()),
            NodeBody::Composite(group) => group.name.clone(),
        }
    }

    /// Derived busy flag; a composite is busy when any member is
    pub fn is_busy(&self) -> bool {
        match &self.body {
            NodeBody::Component(c) => c.as_busy().is_some_and(|b| b.is_busy()),
            NodeBody::Composite(group) => group.members.iter().any(|m| m.is_busy()),
        }
    }

    /// Signal kinds this node can emit
    pub fn signal_kinds(&self) -> Vec<SignalKind> {
        match &self.body {
            NodeBody::Component(c) => c
                .as_event_source()
                .map(|s| s.signal_kinds())
                .unwrap_or_default(),
            NodeBody::Composite(group) => group.signal_kinds(),
        }
    }

    /// Footprint rectangle for hit testing
    pub fn bounds(&self, size: (f64, f64)) -> Rect {
        Rect::new(self.position.0, self.position.1, size.0, size.1)
    }
}

impl std::fmt::Debug for FlowNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowNode")
            .field("id", &self.id)
            .field("type", &self.component_type())
            .field("position", &self.position)
            .field("name", &self.name)
            .finish()
    }
}
