//! Start point discovery and launch ordering.
//!
//! A start point's label may carry an ordering prefix before its first
//! colon: `"2: Load"` asks for position 2, `"! : Load"` excludes the start
//! point from runs. Anything else leaves it unordered.

use std::sync::Arc;

use crate::capability::Component;
use crate::graph::FlowGraph;
use crate::types::NodeId;

/// Where a start point goes in the firing order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchOrder {
    /// Explicit position `N`
    Ordered(u64),
    /// After every numbered start point, in discovery order
    Unordered,
    /// Never launched
    Excluded,
}

/// Parse the ordering prefix of a start point label
pub fn parse_start_label(label: &str) -> LaunchOrder {
    let Some((prefix, _)) = label.split_once(':') else {
        return LaunchOrder::Unordered;
    };
    let prefix = prefix.trim();
    if prefix == "!" {
        return LaunchOrder::Excluded;
    }
    match prefix.parse::<u64>() {
        Ok(n) => LaunchOrder::Ordered(n),
        Err(_) => LaunchOrder::Unordered,
    }
}

/// A node that can be launched by a run
#[derive(Clone)]
pub struct StartPoint {
    pub node_id: NodeId,
    pub label: String,
    pub order: LaunchOrder,
    pub component: Arc<dyn Component>,
}

impl std::fmt::Debug for StartPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StartPoint")
            .field("node_id", &self.node_id)
            .field("label", &self.label)
            .field("order", &self.order)
            .finish()
    }
}

/// Every `Startable` leaf node (composite members included), in discovery order
pub fn discover_start_points(graph: &FlowGraph) -> Vec<StartPoint> {
    graph
        .leaf_nodes()
        .into_iter()
        .filter_map(|node| {
            let component = node.component()?;
            component.as_startable()?;
            let label = node.label();
            Some(StartPoint {
                node_id: node.id.clone(),
                order: parse_start_label(&label),
                label,
                component: component.clone(),
            })
        })
        .collect()
}

/// Split start points into the launch sequence and the excluded set
///
/// Numbered points come first by number (ties keep discovery order), then
/// unordered points in discovery order.
pub fn order_start_points(points: Vec<StartPoint>) -> (Vec<StartPoint>, Vec<StartPoint>) {
    let (excluded, included): (Vec<StartPoint>, Vec<StartPoint>) = points
        .into_iter()
        .partition(|p| p.order == LaunchOrder::Excluded);
    let (mut ordered, unordered): (Vec<StartPoint>, Vec<StartPoint>) = included
        .into_iter()
        .partition(|p| matches!(p.order, LaunchOrder::Ordered(_)));
    ordered.sort_by_key(|p| match p.order {
        LaunchOrder::Ordered(n) => n,
        _ => u64::MAX,
    });
    ordered.extend(unordered);
    (ordered, excluded)
}
