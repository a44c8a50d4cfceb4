//! Run-time signal delivery.
//!
//! At the start of a run the visible graph is flattened into a [`Router`]:
//! composite endpoints are resolved to the member that actually receives or
//! emits each signal, and composite internal edges are added as direct
//! routes. Components then emit through their [`RunContext`] without ever
//! touching the graph store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::capability::{Component, Signal, SignalKind};
use crate::constants::defaults;
use crate::environment::Environment;
use crate::graph::FlowGraph;
use crate::types::{FlowEdge, FlowNode, NodeBody, NodeId};

/// The leaf node receiving signals sent along `edge`
pub fn resolve_target<'a>(graph: &'a FlowGraph, edge: &FlowEdge) -> Option<&'a FlowNode> {
    let node = graph.node(&edge.target)?;
    match &node.body {
        NodeBody::Component(_) => Some(node),
        NodeBody::Composite(group) => group
            .ports
            .iter()
            .find(|p| p.port_edge == edge.id)
            .and_then(|p| group.find_member(&p.member))
            .or_else(|| group.receiving_member(&edge.kind)),
    }
}

/// The leaf node emitting the signals sent along `edge`
pub fn resolve_source<'a>(graph: &'a FlowGraph, edge: &FlowEdge) -> Option<&'a FlowNode> {
    let node = graph.node(&edge.source)?;
    match &node.body {
        NodeBody::Component(_) => Some(node),
        NodeBody::Composite(group) => group
            .ports
            .iter()
            .find(|p| p.port_edge == edge.id)
            .and_then(|p| group.find_member(&p.member))
            .or_else(|| group.emitting_member(&edge.kind)),
    }
}

#[derive(Debug, Clone)]
struct Route {
    signal: String,
    target: NodeId,
}

/// Flattened leaf-to-leaf routing table for one run
#[derive(Default)]
pub struct Router {
    routes: HashMap<NodeId, Vec<Route>>,
    components: HashMap<NodeId, Arc<dyn Component>>,
}

impl Router {
    pub fn build(graph: &FlowGraph) -> Self {
        let mut router = Self::default();
        for (id, component) in graph.components() {
            router.components.insert(id.clone(), component.clone());
        }

        for edge in graph.edges().iter().filter(|e| !e.hidden) {
            match (resolve_source(graph, edge), resolve_target(graph, edge)) {
                (Some(source), Some(target)) => router.add(&source.id, &edge.kind, &target.id),
                _ => log::warn!("Edge '{}' has no resolvable endpoint; it will not carry signals", edge.id),
            }
        }
        for node in graph.nodes() {
            if let Some(group) = node.composite() {
                for edge in group.edges.iter().filter(|e| !e.hidden) {
                    router.add(&edge.source, &edge.kind, &edge.target);
                }
            }
        }
        router
    }

    fn add(&mut self, source: &str, kind: &SignalKind, target: &str) {
        self.routes.entry(source.to_string()).or_default().push(Route {
            signal: kind.name.clone(),
            target: target.to_string(),
        });
    }

    pub fn component(&self, id: &str) -> Option<&Arc<dyn Component>> {
        self.components.get(id)
    }

    /// Leaf targets of `signal` emitted by `source`, in edge order
    pub fn targets(&self, source: &str, signal: &str) -> Vec<&NodeId> {
        self.routes
            .get(source)
            .map(|routes| {
                routes
                    .iter()
                    .filter(|r| r.signal == signal)
                    .map(|r| &r.target)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn route_count(&self) -> usize {
        self.routes.values().map(Vec::len).sum()
    }
}

/// Handle a component uses while it runs
///
/// Scoped to one node: [`emit`](Self::emit) sends that node's signals.
#[derive(Clone)]
pub struct RunContext {
    node_id: NodeId,
    execution_id: String,
    router: Arc<Router>,
    cancel: Arc<AtomicBool>,
    environment: Arc<Environment>,
    depth: usize,
    max_depth: usize,
}

impl RunContext {
    pub(crate) fn new(
        node_id: impl Into<NodeId>,
        execution_id: impl Into<String>,
        router: Arc<Router>,
        cancel: Arc<AtomicBool>,
        environment: Arc<Environment>,
        max_depth: usize,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            execution_id: execution_id.into(),
            router,
            cancel,
            environment,
            depth: 0,
            max_depth,
        }
    }

    /// A context with no connections, for driving a component on its own
    pub fn detached(node_id: impl Into<NodeId>) -> Self {
        Self::new(
            node_id,
            "detached",
            Arc::new(Router::default()),
            Arc::new(AtomicBool::new(false)),
            Arc::new(Environment::new()),
            defaults::MAX_DISPATCH_DEPTH,
        )
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Whether stop() was requested for this run
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Deliver `signal` from this node to every connected listener
    ///
    /// Returns how many listeners accepted it. A vetoing emitter, a
    /// listener error or exceeding the dispatch depth never fails the
    /// sender; they are logged instead.
    pub fn emit(&self, signal: Signal) -> usize {
        if self.depth >= self.max_depth {
            log::warn!(
                "Dropping '{}' from '{}': dispatch depth {} exceeded (cycle?)",
                signal.kind,
                self.node_id,
                self.max_depth
            );
            return 0;
        }
        if let Some(vetoer) = self
            .router
            .component(&self.node_id)
            .and_then(|c| c.as_event_vetoer())
        {
            if !vetoer.can_emit(&signal.kind) {
                log::debug!("Node '{}' vetoed emitting '{}'", self.node_id, signal.kind);
                return 0;
            }
        }

        let mut delivered = 0;
        for target in self.router.targets(&self.node_id, &signal.kind) {
            let Some(listener) = self
                .router
                .component(target)
                .and_then(|c| c.as_event_listener())
            else {
                log::warn!("Node '{}' cannot receive '{}'", target, signal.kind);
                continue;
            };
            let ctx = Self {
                node_id: target.clone(),
                depth: self.depth + 1,
                ..self.clone()
            };
            match listener.receive(&signal, &ctx) {
                Ok(()) => delivered += 1,
                Err(e) => log::error!(
                    "Node '{}' failed to handle '{}' from '{}': {}",
                    target,
                    signal.kind,
                    self.node_id,
                    e
                ),
            }
        }
        delivered
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("node_id", &self.node_id)
            .field("execution_id", &self.execution_id)
            .field("depth", &self.depth)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::groups::GroupOperations;
    use crate::testing::{data_set, instance, Relay, Sink, Source};

    struct Fixture {
        graph: FlowGraph,
        sink: Arc<Sink>,
        relay: Arc<Relay>,
    }

    /// src -> relay -> sink (dataSet), src -> sink (instance)
    fn fixture() -> Fixture {
        let sink = Arc::new(Sink::new());
        let relay = Arc::new(Relay::new());
        let mut graph = FlowGraph::new();
        graph
            .add_node(FlowNode::new(Arc::new(Source::new("src")), (0.0, 0.0)).with_id("src"))
            .unwrap();
        graph
            .add_node(FlowNode::new(relay.clone(), (100.0, 0.0)).with_id("relay"))
            .unwrap();
        graph
            .add_node(FlowNode::new(sink.clone(), (200.0, 0.0)).with_id("sink"))
            .unwrap();
        graph.add_edge(FlowEdge::new("src", "relay", data_set())).unwrap();
        graph.add_edge(FlowEdge::new("relay", "sink", data_set())).unwrap();
        graph.add_edge(FlowEdge::new("src", "sink", instance())).unwrap();
        Fixture { graph, sink, relay }
    }

    fn context(graph: &FlowGraph, node: &str, max_depth: usize) -> RunContext {
        RunContext::new(
            node,
            "exec",
            Arc::new(Router::build(graph)),
            Arc::new(AtomicBool::new(false)),
            Arc::new(Environment::new()),
            max_depth,
        )
    }

    #[test]
    fn test_emit_follows_edges_through_relay() {
        let f = fixture();
        let ctx = context(&f.graph, "src", 8);
        assert_eq!(ctx.emit(Signal::new("instance", serde_json::json!(1))), 1);
        assert_eq!(ctx.emit(Signal::new("dataSet", serde_json::json!(2))), 1);
        assert_eq!(f.sink.count("instance"), 1);
        assert_eq!(f.sink.count("dataSet"), 1);
    }

    #[test]
    fn test_vetoer_blocks_emission() {
        let f = fixture();
        // The relay refuses to emit before it has seen anything
        let ctx = context(&f.graph, "relay", 8);
        assert_eq!(ctx.emit(Signal::new("dataSet", serde_json::Value::Null)), 0);
        assert_eq!(f.sink.count("dataSet"), 0);

        f.relay.blocked.store(true, Ordering::SeqCst);
        let ctx = context(&f.graph, "src", 8);
        assert_eq!(ctx.emit(Signal::new("dataSet", serde_json::Value::Null)), 1);
        assert_eq!(f.sink.count("dataSet"), 0);
    }

    #[test]
    fn test_depth_limit_drops_signal() {
        let f = fixture();
        // Depth 1 reaches the relay but not the sink behind it
        let ctx = context(&f.graph, "src", 1);
        assert_eq!(ctx.emit(Signal::new("dataSet", serde_json::Value::Null)), 1);
        assert_eq!(f.sink.count("dataSet"), 0);
    }

    #[test]
    fn test_routes_through_composite() {
        let mut f = fixture();
        GroupOperations::group(&mut f.graph, &["relay".to_string()], "Solo", (60.0, 60.0), None).unwrap();
        let router = Router::build(&f.graph);
        assert_eq!(router.targets("src", "dataSet"), vec!["relay"]);
        assert_eq!(router.route_count(), 3);
        assert_eq!(router.targets("relay", "dataSet"), vec!["sink"]);

        let ctx = context(&f.graph, "src", 8);
        ctx.emit(Signal::new("dataSet", serde_json::Value::Null));
        assert_eq!(f.sink.count("dataSet"), 1);
    }

    #[test]
    fn test_detached_context() {
        let ctx = RunContext::detached("lonely");
        assert_eq!(ctx.node_id(), "lonely");
        assert!(!ctx.is_cancelled());
        assert_eq!(ctx.emit(Signal::new("dataSet", serde_json::Value::Null)), 0);
    }
}
