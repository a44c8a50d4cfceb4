//! Application context: the set of open workspaces
//!
//! Owns what every tab shares: the component registry, the editor
//! configuration, the clipboard buffer and the observer list.

use std::path::Path;
use std::sync::Arc;

use crate::clipboard::Clipboard;
use crate::config::EditorConfig;
use crate::error::Result;
use crate::events::{FlowObserver, ObserverId, ObserverRegistry};
use crate::registry::ComponentRegistry;
use crate::workspace::Workspace;

const UNTITLED: &str = "Untitled";

/// Open workspaces plus the state they share
pub struct FlowContext {
    registry: Arc<ComponentRegistry>,
    config: EditorConfig,
    clipboard: Clipboard,
    observers: ObserverRegistry,
    workspaces: Vec<Workspace>,
    active: usize,
}

impl FlowContext {
    pub fn new(registry: Arc<ComponentRegistry>, config: EditorConfig) -> Self {
        Self {
            registry,
            config,
            clipboard: Clipboard::new(),
            observers: ObserverRegistry::new(),
            workspaces: Vec::new(),
            active: 0,
        }
    }

    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn clipboard(&self) -> &Clipboard {
        &self.clipboard
    }

    pub fn observers(&self) -> &ObserverRegistry {
        &self.observers
    }

    /// Receive events from every workspace of this context
    pub fn subscribe(&self, observer: Arc<dyn FlowObserver>) -> ObserverId {
        self.observers.subscribe(observer)
    }

    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        self.observers.unsubscribe(id)
    }

    fn make_workspace(&self, name: &str) -> Workspace {
        Workspace::new(name, self.registry.clone(), self.config.clone())
            .with_clipboard(self.clipboard.clone())
            .with_observers(self.observers.clone())
    }

    fn push(&mut self, workspace: Workspace) -> usize {
        self.workspaces.push(workspace);
        self.active = self.workspaces.len() - 1;
        self.active
    }

    /// Open an empty workspace and make it active; returns its index
    pub fn new_workspace(&mut self, name: Option<&str>) -> usize {
        let name = match name {
            Some(name) => name.to_string(),
            None => format!("{} {}", UNTITLED, self.workspaces.len() + 1),
        };
        let workspace = self.make_workspace(&name);
        log::debug!("Opened workspace '{}'", name);
        self.push(workspace)
    }

    /// Load a flow file into a new workspace titled with the file stem
    pub fn open(&mut self, path: &Path) -> Result<usize> {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| UNTITLED.to_string());
        let mut workspace = self.make_workspace(&name);
        workspace.load(path)?;
        Ok(self.push(workspace))
    }

    /// Close a workspace, stopping its run first
    pub fn close(&mut self, index: usize) -> Option<Workspace> {
        if index >= self.workspaces.len() {
            return None;
        }
        let workspace = self.workspaces.remove(index);
        if workspace.is_executing() {
            log::info!("Stopping run of '{}' before closing it", workspace.name());
            workspace.stop();
        }
        if self.active >= self.workspaces.len() {
            self.active = self.workspaces.len().saturating_sub(1);
        } else if index < self.active {
            self.active -= 1;
        }
        Some(workspace)
    }

    pub fn workspaces(&self) -> &[Workspace] {
        &self.workspaces
    }

    pub fn workspace(&self, index: usize) -> Option<&Workspace> {
        self.workspaces.get(index)
    }

    pub fn workspace_mut(&mut self, index: usize) -> Option<&mut Workspace> {
        self.workspaces.get_mut(index)
    }

    pub fn active_index(&self) -> Option<usize> {
        (!self.workspaces.is_empty()).then_some(self.active)
    }

    pub fn active(&self) -> Option<&Workspace> {
        self.workspaces.get(self.active)
    }

    pub fn active_mut(&mut self) -> Option<&mut Workspace> {
        self.workspaces.get_mut(self.active)
    }

    /// Switch tabs; returns false for an out-of-range index
    pub fn set_active(&mut self, index: usize) -> bool {
        if index < self.workspaces.len() {
            self.active = index;
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.workspaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workspaces.is_empty()
    }
}

impl std::fmt::Debug for FlowContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowContext")
            .field("workspaces", &self.workspaces.len())
            .field("active", &self.active)
            .field("observers", &self.observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::events::{FlowEvent, VecObserver};
    use crate::orchestration::RunState;
    use crate::testing::{test_registry, Sink, Source};
    use crate::types::FlowNode;

    fn context() -> FlowContext {
        FlowContext::new(test_registry(), EditorConfig::default())
    }

    #[test]
    fn test_tabs_share_clipboard() {
        let mut ctx = context();
        let first = ctx.new_workspace(Some("first"));
        let second = ctx.new_workspace(None);
        assert_eq!(ctx.active_index(), Some(second));
        assert_eq!(ctx.workspace(second).map(|w| w.name()), Some("Untitled 2"));

        let ws = ctx.workspace_mut(first).unwrap();
        ws.add_node(FlowNode::new(Arc::new(Sink::new()), (0.0, 0.0)).with_id("s"))
            .unwrap();
        ws.select(&["s".to_string()]);
        ws.copy().unwrap();

        let pasted = ctx.active_mut().unwrap().paste((10.0, 10.0)).unwrap();
        assert_eq!(pasted.len(), 1);
    }

    #[test]
    fn test_open_titles_with_file_stem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("iris-pipeline.json");
        let mut ctx = context();
        let index = ctx.new_workspace(None);
        let ws = ctx.workspace_mut(index).unwrap();
        ws.add_node(FlowNode::new(Arc::new(Source::new("src")), (0.0, 0.0)))
            .unwrap();
        ws.save(&path).unwrap();

        let opened = ctx.open(&path).unwrap();
        let ws = ctx.active().unwrap();
        assert_eq!(opened, 1);
        assert_eq!(ws.name(), "iris-pipeline");
        assert_eq!(ws.node_count(), 1);
        assert!(ctx.open(&dir.path().join("missing.json")).is_err());
        assert_eq!(ctx.len(), 2);
    }

    #[test]
    fn test_observers_span_workspaces() {
        let mut ctx = context();
        let events = Arc::new(VecObserver::new());
        let id = ctx.subscribe(events.clone());
        for name in ["a", "b"] {
            let index = ctx.new_workspace(Some(name));
            ctx.workspace_mut(index)
                .unwrap()
                .add_node(FlowNode::new(Arc::new(Sink::new()), (0.0, 0.0)))
                .unwrap();
        }
        let workspaces: Vec<String> = events
            .events()
            .iter()
            .filter_map(|e| match e {
                FlowEvent::NodeAdded { workspace, .. } => Some(workspace.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(workspaces, vec!["a", "b"]);
        assert!(ctx.unsubscribe(id));
    }

    #[test]
    fn test_close_adjusts_active() {
        let mut ctx = context();
        ctx.new_workspace(Some("a"));
        ctx.new_workspace(Some("b"));
        ctx.new_workspace(Some("c"));
        assert!(ctx.set_active(1));
        assert!(!ctx.set_active(7));

        assert_eq!(ctx.close(0).map(|w| w.name().to_string()), Some("a".to_string()));
        assert_eq!(ctx.active().map(|w| w.name()), Some("b"));
        ctx.close(1);
        ctx.close(0);
        assert!(ctx.is_empty());
        assert_eq!(ctx.active_index(), None);
        assert!(ctx.close(0).is_none());
    }

    #[tokio::test]
    async fn test_close_stops_running_workspace() {
        let mut ctx = context();
        let index = ctx.new_workspace(None);
        let source = Arc::new(Source::new("slow").slow(20, 100));
        let ws = ctx.workspace_mut(index).unwrap();
        ws.add_node(FlowNode::new(source.clone(), (0.0, 0.0))).unwrap();
        let handle = ws.run(false).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let closed = ctx.close(index).unwrap();
        assert_eq!(closed.run_state(), RunState::Idle);
        let summary = tokio::time::timeout(Duration::from_secs(5), handle.wait())
            .await
            .unwrap()
            .unwrap();
        assert!(summary.stopped);
        assert!(source.was_stopped());
    }
}
