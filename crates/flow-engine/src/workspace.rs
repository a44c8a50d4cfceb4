//! One editor tab: a graph plus everything needed to edit and run it
//!
//! Every structural edit goes through one staging step: the pre-state
//! is captured as an undo snapshot, the operation runs on a staged clone of
//! the graph, and only a successful operation is committed and recorded.
//! A rejected operation therefore leaves neither graph changes nor an undo
//! point behind.
//!
//! The graph and the run state share one lock. Run tasks only read the
//! graph when the run is planned and touch the run state when it ends.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::capability::{user_requests, Component, SignalKind, UserRequest};
use crate::clipboard::{prepare_paste, Clipboard};
use crate::config::EditorConfig;
use crate::constants::FLOW_DIRECTORY_KEY;
use crate::environment::Environment;
use crate::error::{FlowError, Result};
use crate::events::{FlowEvent, ObserverRegistry};
use crate::graph::FlowGraph;
use crate::groups::{GroupOperations, PreviewRenderer};
use crate::interaction::{InteractionMachine, Intent, PointerEvent};
use crate::orchestration::{execute, resolve_target, RunHandle, RunPlan, RunState};
use crate::persist;
use crate::registry::ComponentRegistry;
use crate::snapshot::FlowDocument;
use crate::types::{EdgeId, FlowEdge, FlowNode, NodeBody, NodeId, Position, Rect};
use crate::undo::UndoStack;
use crate::validation::{connectable_targets, validate_connection};

/// State shared with run tasks, behind the workspace lock
struct WorkspaceShared {
    graph: FlowGraph,
    run_state: RunState,
    /// Bumped by every run so a finishing stale run leaves newer state alone
    generation: u64,
    cancel: Arc<AtomicBool>,
}

/// Which run states a mutation tolerates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunGuard {
    RequireIdle,
    AllowRunning,
}

/// A pending `connected`/`disconnected` call on a gated receiver
struct GateNotice {
    component: Arc<dyn Component>,
    kind: SignalKind,
    source: NodeId,
}

impl GateNotice {
    fn connected(&self) {
        if let Some(gate) = self.component.as_connection_gate() {
            gate.connected(&self.kind, &self.source);
        }
    }

    fn disconnected(&self) {
        if let Some(gate) = self.component.as_connection_gate() {
            gate.disconnected(&self.kind, &self.source);
        }
    }
}

/// Gated receivers of the given top-level edges
fn top_level_notices<'a>(graph: &FlowGraph, edges: impl IntoIterator<Item = &'a FlowEdge>) -> Vec<GateNotice> {
    edges
        .into_iter()
        .filter(|e| !e.hidden)
        .filter_map(|edge| {
            let component = resolve_target(graph, edge)?.component()?;
            component.as_connection_gate()?;
            Some(GateNotice {
                component: component.clone(),
                kind: edge.kind.clone(),
                source: edge.source.clone(),
            })
        })
        .collect()
}

/// Gated receivers of the edges inside a composite
fn internal_notices(node: &FlowNode) -> Vec<GateNotice> {
    let Some(group) = node.composite() else {
        return Vec::new();
    };
    group
        .edges
        .iter()
        .filter_map(|edge| {
            let component = group.find_member(&edge.target)?.component()?;
            component.as_connection_gate()?;
            Some(GateNotice {
                component: component.clone(),
                kind: edge.kind.clone(),
                source: edge.source.clone(),
            })
        })
        .collect()
}

/// Gated receivers of every edge of `graph`, or only of the edges that
/// land on `nodes` when given
fn connection_notices(graph: &FlowGraph, nodes: Option<&HashSet<&str>>) -> Vec<GateNotice> {
    let wanted = |id: &str| nodes.map_or(true, |set| set.contains(id));
    let mut notices = top_level_notices(graph, graph.edges().iter().filter(|e| wanted(e.target.as_str())));
    for node in graph.nodes().iter().filter(|n| wanted(n.id.as_str())) {
        notices.extend(internal_notices(node));
    }
    notices
}

/// Hand the environment to every `EnvironmentAware` leaf under `node`
fn apply_environment(environment: &Environment, node: &FlowNode) {
    match &node.body {
        NodeBody::Component(component) => {
            if let Some(aware) = component.as_environment_aware() {
                aware.set_environment(environment);
            }
        }
        NodeBody::Composite(group) => {
            for member in &group.members {
                apply_environment(environment, member);
            }
        }
    }
}

fn check_not_busy(node: &FlowNode) -> Result<()> {
    if node.is_busy() {
        return Err(FlowError::NodeBusy(node.id.clone()));
    }
    Ok(())
}

/// An editable, runnable flow
pub struct Workspace {
    name: String,
    shared: Arc<Mutex<WorkspaceShared>>,
    undo: UndoStack,
    registry: Arc<ComponentRegistry>,
    config: EditorConfig,
    clipboard: Clipboard,
    observers: ObserverRegistry,
    environment: Environment,
    file_path: Option<PathBuf>,
    dirty: Arc<AtomicBool>,
    selection: Vec<NodeId>,
    interaction: InteractionMachine,
    preview: Option<Arc<dyn PreviewRenderer>>,
}

impl Workspace {
    pub fn new(name: impl Into<String>, registry: Arc<ComponentRegistry>, config: EditorConfig) -> Self {
        Self {
            name: name.into(),
            shared: Arc::new(Mutex::new(WorkspaceShared {
                graph: FlowGraph::new(),
                run_state: RunState::Idle,
                generation: 0,
                cancel: Arc::new(AtomicBool::new(false)),
            })),
            undo: UndoStack::new(config.undo_limit, config.snapshot_compression_level),
            registry,
            config,
            clipboard: Clipboard::new(),
            observers: ObserverRegistry::new(),
            environment: Environment::new(),
            file_path: None,
            dirty: Arc::new(AtomicBool::new(false)),
            selection: Vec::new(),
            interaction: InteractionMachine::new(),
            preview: None,
        }
    }

    /// Share a clipboard buffer with other workspaces
    pub fn with_clipboard(mut self, clipboard: Clipboard) -> Self {
        self.clipboard = clipboard;
        self
    }

    pub fn with_observers(mut self, observers: ObserverRegistry) -> Self {
        self.observers = observers;
        self
    }

    pub fn with_preview_renderer(mut self, renderer: Arc<dyn PreviewRenderer>) -> Self {
        self.preview = Some(renderer);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    /// Unsaved changes since the last save or load
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.registry
    }

    fn notify(&self, event: FlowEvent) {
        self.observers.notify(&event);
    }

    /// Stage `op` on a copy of the graph and commit it with an undo point
    fn mutate<T>(&mut self, guard: RunGuard, op: impl FnOnce(&mut FlowGraph) -> Result<T>) -> Result<T> {
        let mut shared = self.shared.lock();
        if guard == RunGuard::RequireIdle && shared.run_state.is_active() {
            return Err(FlowError::WorkspaceBusy);
        }

        let snapshot = self
            .undo
            .capture(&FlowDocument::capture(&shared.graph))
            .map_err(|e| {
                log::error!("[{}] Could not record undo point; edit aborted: {}", self.name, e);
                e
            })?;

        let mut staged = shared.graph.clone();
        let value = op(&mut staged)?;

        self.undo.push(snapshot);
        shared.graph = staged;
        drop(shared);
        self.dirty.store(true, Ordering::SeqCst);
        Ok(value)
    }

    // ---------------------------------------------------------------------
    // Graph edits
    // ---------------------------------------------------------------------

    /// Create a component through the registry and place it at `position`
    pub fn add_component(
        &mut self,
        component_type: &str,
        config: &serde_json::Value,
        position: Position,
    ) -> Result<NodeId> {
        let component = self.registry.create(component_type, config)?;
        self.add_node(FlowNode::new(component, position))
    }

    pub fn add_node(&mut self, node: FlowNode) -> Result<NodeId> {
        apply_environment(&self.environment, &node);
        let id = self.mutate(RunGuard::RequireIdle, |graph| graph.add_node(node))?;
        self.notify(FlowEvent::NodeAdded {
            workspace: self.name.clone(),
            node_id: id.clone(),
        });
        Ok(id)
    }

    /// Remove a node and every edge touching it
    pub fn remove_node(&mut self, id: &str) -> Result<()> {
        self.remove_nodes(&[id.to_string()])?;
        Ok(())
    }

    /// Remove every selected node as one undo point
    pub fn delete_selected(&mut self) -> Result<usize> {
        let selection = self.selection.clone();
        let removed = self.remove_nodes(&selection)?;
        self.selection.clear();
        Ok(removed)
    }

    fn remove_nodes(&mut self, ids: &[NodeId]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let notices = self.mutate(RunGuard::RequireIdle, |graph| {
            for id in ids {
                let node = graph.node(id).ok_or_else(|| FlowError::NodeNotFound(id.clone()))?;
                check_not_busy(node)?;
            }
            let mut notices = Vec::new();
            for id in ids {
                notices.extend(top_level_notices(graph, graph.edges().iter().filter(|e| e.touches(id))));
                graph.remove_node(id)?;
            }
            Ok(notices)
        })?;
        for notice in &notices {
            notice.disconnected();
        }
        self.selection.retain(|s| !ids.contains(s));
        for id in ids {
            log::debug!("[{}] Removed node '{}'", self.name, id);
            self.notify(FlowEvent::NodeRemoved {
                workspace: self.name.clone(),
                node_id: id.clone(),
            });
        }
        Ok(ids.len())
    }

    /// Translate nodes; allowed while a run is active
    pub fn move_nodes(&mut self, ids: &[NodeId], dx: f64, dy: f64) -> Result<()> {
        self.mutate(RunGuard::AllowRunning, |graph| graph.move_nodes(ids, dx, dy))?;
        self.notify(FlowEvent::NodesMoved {
            workspace: self.name.clone(),
            node_ids: ids.to_vec(),
        });
        Ok(())
    }

    /// Set a node's custom name and forward it to a `Named` component
    pub fn rename_node(&mut self, id: &str, name: &str) -> Result<()> {
        let named = self.mutate(RunGuard::RequireIdle, |graph| {
            let node = graph
                .node(id)
                .ok_or_else(|| FlowError::NodeNotFound(id.to_string()))?;
            check_not_busy(node)?;
            let component = node.component().cloned();
            graph.rename_node(id, name)?;
            Ok(component)
        })?;
        if let Some(named) = named.as_ref().and_then(|c| c.as_named()) {
            named.set_custom_name(name);
        }
        self.notify(FlowEvent::NodeRenamed {
            workspace: self.name.clone(),
            node_id: id.to_string(),
            name: name.to_string(),
        });
        Ok(())
    }

    /// Connect `signal` of `source` to `target` after validating it
    pub fn connect(&mut self, source: &str, signal: &str, target: &str) -> Result<EdgeId> {
        let (edge_id, notices) = self.mutate(RunGuard::RequireIdle, |graph| {
            for id in [source, target] {
                if let Some(node) = graph.node(id) {
                    check_not_busy(node)?;
                }
            }
            let kind = validate_connection(graph, source, signal, target)?;
            let edge = FlowEdge::new(source, target, kind);
            let notices = top_level_notices(graph, [&edge]);
            let id = graph.add_edge(edge)?;
            Ok((id, notices))
        })?;
        for notice in &notices {
            notice.connected();
        }
        log::debug!("[{}] Connected {} -[{}]-> {}", self.name, source, signal, target);
        self.notify(FlowEvent::EdgeAdded {
            workspace: self.name.clone(),
            edge_id: edge_id.clone(),
        });
        Ok(edge_id)
    }

    pub fn disconnect(&mut self, edge_id: &str) -> Result<()> {
        let notices = self.mutate(RunGuard::RequireIdle, |graph| {
            let edge = graph
                .edge(edge_id)
                .ok_or_else(|| FlowError::EdgeNotFound(edge_id.to_string()))?;
            let notices = top_level_notices(graph, [edge]);
            graph.remove_edge(edge_id)?;
            Ok(notices)
        })?;
        for notice in &notices {
            notice.disconnected();
        }
        self.notify(FlowEvent::EdgeRemoved {
            workspace: self.name.clone(),
            edge_id: edge_id.to_string(),
        });
        Ok(())
    }

    /// Collapse the selection into a composite named `name`
    pub fn group(&mut self, name: &str) -> Result<NodeId> {
        let selection = self.selection.clone();
        let node_size = self.config.node_size;
        let preview = self.preview.clone();
        let composite_id = self.mutate(RunGuard::RequireIdle, |graph| {
            for id in &selection {
                if let Some(node) = graph.node(id) {
                    check_not_busy(node)?;
                }
            }
            GroupOperations::group(graph, &selection, name, node_size, preview.as_deref())
        })?;
        log::info!(
            "[{}] Grouped {} node(s) into '{}' ({})",
            self.name,
            selection.len(),
            name.trim(),
            composite_id
        );
        self.selection = vec![composite_id.clone()];
        self.notify(FlowEvent::Grouped {
            workspace: self.name.clone(),
            composite_id: composite_id.clone(),
            members: selection,
        });
        Ok(composite_id)
    }

    /// Expand a composite back into its members
    pub fn ungroup(&mut self, composite_id: &str) -> Result<Vec<NodeId>> {
        let members = self.mutate(RunGuard::RequireIdle, |graph| {
            GroupOperations::ungroup(graph, composite_id)
        })?;
        self.selection = members.clone();
        self.notify(FlowEvent::Ungrouped {
            workspace: self.name.clone(),
            composite_id: composite_id.to_string(),
            members: members.clone(),
        });
        Ok(members)
    }

    // ---------------------------------------------------------------------
    // Clipboard
    // ---------------------------------------------------------------------

    /// Copy the selection to the shared clipboard
    pub fn copy(&self) -> Result<usize> {
        self.copy_nodes(&self.selection)
    }

    pub fn copy_nodes(&self, ids: &[NodeId]) -> Result<usize> {
        let shared = self.shared.lock();
        self.clipboard.copy(&shared.graph, ids).map_err(|e| {
            log::warn!("[{}] Copy failed: {}", self.name, e);
            e
        })
    }

    /// Copy then delete the selection; nothing is deleted if the copy fails
    pub fn cut(&mut self) -> Result<usize> {
        if self.is_executing() {
            return Err(FlowError::WorkspaceBusy);
        }
        self.copy()?;
        self.delete_selected()
    }

    /// Paste the clipboard so its top-left node lands on `position`
    ///
    /// Pasted nodes are fresh instances with fresh ids and become the
    /// selection.
    pub fn paste(&mut self, position: Position) -> Result<Vec<NodeId>> {
        if self.is_executing() {
            return Err(FlowError::WorkspaceBusy);
        }
        let (nodes, edges) = self
            .clipboard
            .contents()
            .and_then(|contents| prepare_paste(&contents, position).instantiate(&self.registry))
            .map_err(|e| {
                log::warn!("[{}] Paste failed: {}", self.name, e);
                e
            })?;
        let ids: Vec<NodeId> = nodes.iter().map(|n| n.id.clone()).collect();

        self.mutate(RunGuard::RequireIdle, |graph| {
            for node in nodes {
                graph.add_node(node)?;
            }
            for edge in edges {
                graph.add_edge(edge)?;
            }
            Ok(())
        })?;

        {
            let shared = self.shared.lock();
            let pasted: HashSet<&str> = ids.iter().map(|s| s.as_str()).collect();
            for notice in connection_notices(&shared.graph, Some(&pasted)) {
                notice.connected();
            }
            for id in &ids {
                if let Some(node) = shared.graph.node(id) {
                    apply_environment(&self.environment, node);
                }
            }
        }

        log::debug!("[{}] Pasted {} node(s)", self.name, ids.len());
        self.selection = ids.clone();
        self.notify(FlowEvent::Pasted {
            workspace: self.name.clone(),
            node_ids: ids.clone(),
        });
        Ok(ids)
    }

    pub fn clipboard(&self) -> &Clipboard {
        &self.clipboard
    }

    // ---------------------------------------------------------------------
    // Undo
    // ---------------------------------------------------------------------

    /// Whether undo is available right now
    pub fn can_undo(&self) -> bool {
        !self.is_executing() && self.undo.can_undo()
    }

    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    /// Replace the graph with the most recent snapshot
    pub fn undo(&mut self) -> Result<()> {
        let mut shared = self.shared.lock();
        if shared.run_state.is_active() {
            return Err(FlowError::WorkspaceBusy);
        }
        if let Some(busy) = shared.graph.leaf_nodes().into_iter().find(|n| n.is_busy()) {
            return Err(FlowError::NodeBusy(busy.id.clone()));
        }
        let document = match self.undo.pop() {
            None => return Err(FlowError::NothingToUndo),
            Some(Err(e)) => {
                log::error!("[{}] Undo snapshot is unreadable: {}", self.name, e);
                return Err(e);
            }
            Some(Ok(document)) => document,
        };
        let graph = document.restore(&self.registry).map_err(|e| {
            log::error!("[{}] Could not restore undo snapshot: {}", self.name, e);
            e
        })?;
        shared.graph = graph;
        for notice in connection_notices(&shared.graph, None) {
            notice.connected();
        }
        for node in shared.graph.nodes() {
            apply_environment(&self.environment, node);
        }
        let graph = &shared.graph;
        self.selection.retain(|id| graph.node(id).is_some());
        drop(shared);

        self.dirty.store(true, Ordering::SeqCst);
        log::debug!("[{}] Undo restored a snapshot ({} left)", self.name, self.undo.len());
        self.notify(FlowEvent::Restored {
            workspace: self.name.clone(),
        });
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Execution
    // ---------------------------------------------------------------------

    pub fn run_state(&self) -> RunState {
        self.shared.lock().run_state
    }

    pub fn is_executing(&self) -> bool {
        self.run_state().is_active()
    }

    /// Launch every start point, concurrently or in label order
    ///
    /// Must be called inside a tokio runtime.
    pub fn run(&mut self, sequential: bool) -> Result<RunHandle> {
        let (plan, generation) = {
            let mut shared = self.shared.lock();
            if shared.run_state.is_active() {
                return Err(FlowError::WorkspaceBusy);
            }
            shared.run_state = RunState::Running;
            shared.generation += 1;
            shared.cancel = Arc::new(AtomicBool::new(false));
            for node in shared.graph.nodes() {
                apply_environment(&self.environment, node);
            }
            let plan = RunPlan::new(
                self.name.clone(),
                &shared.graph,
                self.environment.clone(),
                shared.cancel.clone(),
                sequential,
                self.config.max_dispatch_depth,
            );
            (plan, shared.generation)
        };

        let execution_id = plan.execution_id.clone();
        log::info!(
            "[{}] Starting {} run {} with {} start point(s)",
            self.name,
            if sequential { "sequential" } else { "parallel" },
            execution_id,
            plan.launch.len()
        );
        self.notify(FlowEvent::RunStarted {
            workspace: self.name.clone(),
            execution_id: execution_id.clone(),
            sequential,
        });

        let shared = self.shared.clone();
        let observers = self.observers.clone();
        let workspace = self.name.clone();
        let task = tokio::spawn(async move {
            let summary = execute(plan, &observers).await;
            {
                let mut shared = shared.lock();
                if shared.generation == generation {
                    shared.run_state = RunState::Idle;
                }
            }
            observers.notify(&FlowEvent::RunFinished {
                workspace,
                execution_id: summary.execution_id.clone(),
                stopped: summary.stopped,
            });
            summary
        });
        Ok(RunHandle::new(execution_id, task))
    }

    /// Ask every stoppable component to stop
    ///
    /// Returns once all of them have been signalled, not once they have
    /// actually finished.
    pub fn stop(&self) {
        let stoppables: Vec<Arc<dyn Component>> = {
            let mut shared = self.shared.lock();
            if shared.run_state == RunState::Running {
                shared.run_state = RunState::Stopping;
            }
            shared.cancel.store(true, Ordering::SeqCst);
            shared
                .graph
                .components()
                .into_iter()
                .filter(|(_, c)| c.as_stoppable().is_some())
                .map(|(_, c)| c.clone())
                .collect()
        };
        log::info!("[{}] Stopping {} component(s)", self.name, stoppables.len());
        self.notify(FlowEvent::StopRequested {
            workspace: self.name.clone(),
        });
        for component in &stoppables {
            if let Some(stoppable) = component.as_stoppable() {
                stoppable.stop();
            }
        }
        let mut shared = self.shared.lock();
        if shared.run_state == RunState::Stopping {
            shared.run_state = RunState::Idle;
        }
    }

    // ---------------------------------------------------------------------
    // User requests
    // ---------------------------------------------------------------------

    /// Parsed requests offered by a node's component
    pub fn node_requests(&self, id: &str) -> Result<Vec<UserRequest>> {
        let shared = self.shared.lock();
        let node = shared
            .graph
            .find_any(id)
            .ok_or_else(|| FlowError::NodeNotFound(id.to_string()))?;
        Ok(node
            .component()
            .map(|c| user_requests(c.as_ref()))
            .unwrap_or_default())
    }

    /// Run a request on a background task
    ///
    /// Disabled requests are rejected; confirm requests need `confirmed`.
    pub fn perform_request(&self, id: &str, request: &str, confirmed: bool) -> Result<JoinHandle<Result<()>>> {
        let component = {
            let shared = self.shared.lock();
            let node = shared
                .graph
                .find_any(id)
                .ok_or_else(|| FlowError::NodeNotFound(id.to_string()))?;
            node.component()
                .cloned()
                .ok_or_else(|| FlowError::RequestRejected(format!("'{}' accepts no requests", id)))?
        };
        let parsed = user_requests(component.as_ref())
            .into_iter()
            .find(|r| r.name == request)
            .ok_or_else(|| FlowError::RequestRejected(format!("'{}' does not offer '{}'", id, request)))?;
        if parsed.disabled {
            return Err(FlowError::RequestRejected(format!("'{}' is disabled", request)));
        }
        if parsed.confirm && !confirmed {
            return Err(FlowError::RequestRejected(format!("'{}' needs confirmation", request)));
        }

        self.dirty.store(true, Ordering::SeqCst);
        log::info!("[{}] Performing '{}' on '{}'", self.name, request, id);
        let node_id = id.to_string();
        let name = parsed.name;
        Ok(tokio::task::spawn_blocking(move || {
            let acceptor = component
                .as_request_acceptor()
                .ok_or_else(|| FlowError::RequestRejected(format!("'{}' accepts no requests", node_id)))?;
            acceptor.perform_request(&name).map_err(|e| {
                log::error!("Request '{}' on '{}' failed: {}", name, node_id, e);
                e
            })
        }))
    }

    // ---------------------------------------------------------------------
    // Persistence and environment
    // ---------------------------------------------------------------------

    /// Write the graph to `path`; the extension picks the format
    pub fn save(&mut self, path: &Path) -> Result<()> {
        let document = self.document();
        persist::write_document(path, &document)?;
        self.file_path = Some(path.to_path_buf());
        self.dirty.store(false, Ordering::SeqCst);
        self.set_flow_directory(path);
        self.notify(FlowEvent::Saved {
            workspace: self.name.clone(),
            path: path.display().to_string(),
        });
        Ok(())
    }

    /// Replace the graph with the contents of `path`
    ///
    /// Clears the undo history.
    pub fn load(&mut self, path: &Path) -> Result<()> {
        if self.is_executing() {
            return Err(FlowError::WorkspaceBusy);
        }
        let document = persist::read_document(path)?;
        let graph = document.restore(&self.registry)?;
        self.set_flow_directory(path);
        {
            let mut shared = self.shared.lock();
            shared.graph = graph;
            for notice in connection_notices(&shared.graph, None) {
                notice.connected();
            }
            for node in shared.graph.nodes() {
                apply_environment(&self.environment, node);
            }
        }
        self.undo.clear();
        self.selection.clear();
        self.interaction.reset();
        self.file_path = Some(path.to_path_buf());
        self.dirty.store(false, Ordering::SeqCst);
        self.notify(FlowEvent::Loaded {
            workspace: self.name.clone(),
            path: path.display().to_string(),
        });
        Ok(())
    }

    fn set_flow_directory(&mut self, path: &Path) {
        if let Some(parent) = path.parent() {
            self.environment
                .set(FLOW_DIRECTORY_KEY, parent.display().to_string());
        }
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Set a variable and hand the updated environment to every node
    pub fn set_variable(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.environment.set(key, value);
        let shared = self.shared.lock();
        for node in shared.graph.nodes() {
            apply_environment(&self.environment, node);
        }
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    /// Read access to the graph under the workspace lock
    pub fn with_graph<R>(&self, f: impl FnOnce(&FlowGraph) -> R) -> R {
        f(&self.shared.lock().graph)
    }

    /// Capture the whole graph
    pub fn document(&self) -> FlowDocument {
        FlowDocument::capture(&self.shared.lock().graph)
    }

    pub fn node_count(&self) -> usize {
        self.shared.lock().graph.nodes().len()
    }

    pub fn edge_count(&self) -> usize {
        self.shared.lock().graph.edges().len()
    }

    /// Replace the selection; unknown ids are dropped
    pub fn select(&mut self, ids: &[NodeId]) {
        let shared = self.shared.lock();
        self.selection = ids
            .iter()
            .filter(|id| shared.graph.node(id).is_some())
            .cloned()
            .collect();
    }

    pub fn selection(&self) -> &[NodeId] {
        &self.selection
    }

    pub fn find_node_at(&self, point: Position) -> Option<NodeId> {
        self.shared.lock().graph.find_node_at(point, self.config.node_size)
    }

    pub fn nodes_in_region(&self, region: &Rect) -> Vec<NodeId> {
        self.shared.lock().graph.nodes_in_region(region, self.config.node_size)
    }

    /// Nodes that would accept `signal` from `source`
    pub fn connectable_targets(&self, source: &str, signal: &str) -> Vec<NodeId> {
        connectable_targets(&self.shared.lock().graph, source, signal)
    }

    // ---------------------------------------------------------------------
    // Pointer interaction
    // ---------------------------------------------------------------------

    pub fn interaction(&self) -> &InteractionMachine {
        &self.interaction
    }

    pub fn interaction_mut(&mut self) -> &mut InteractionMachine {
        &mut self.interaction
    }

    /// Feed a pointer event and apply the gesture it completes
    pub fn handle_pointer(&mut self, event: PointerEvent) -> Result<Option<Intent>> {
        let hit = match event {
            PointerEvent::Pressed(p) | PointerEvent::Dragged(p) | PointerEvent::Released(p) => {
                self.find_node_at(p)
            }
            PointerEvent::Cancelled => None,
        };
        let Some(intent) = self.interaction.handle(event, hit.as_deref(), &self.selection) else {
            return Ok(None);
        };

        match &intent {
            Intent::AddComponent {
                component_type,
                config,
                position,
            } => {
                let id = self.add_component(component_type, config, *position)?;
                self.selection = vec![id];
            }
            Intent::Connect { source, signal, target } => {
                self.connect(source, signal, target)?;
            }
            Intent::MoveNodes { nodes, dx, dy } => self.move_nodes(nodes, *dx, *dy)?,
            Intent::Select { region } => {
                self.selection = if region.width == 0.0 && region.height == 0.0 {
                    self.find_node_at((region.x, region.y)).into_iter().collect()
                } else {
                    self.nodes_in_region(region)
                };
            }
            Intent::Paste { position } => {
                self.paste(*position)?;
            }
        }
        Ok(Some(intent))
    }
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("name", &self.name)
            .field("file_path", &self.file_path)
            .field("run_state", &self.run_state())
            .field("undo_depth", &self.undo.len())
            .finish_non_exhaustive()
    }
}
