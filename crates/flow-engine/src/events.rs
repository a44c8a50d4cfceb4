//! Structural and run-lifecycle notifications
//!
//! The engine never paints. Renderers, status bars and log panels subscribe
//! a [`FlowObserver`] to the [`ObserverRegistry`] of their
//! [`FlowContext`](crate::context::FlowContext) and repaint on
//! [`FlowEvent`]s.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::types::{EdgeId, NodeId};

/// Trait for receiving flow events
///
/// Abstracts over the transport (UI channel, log, test vector) so the engine
/// can be embedded anywhere.
pub trait FlowObserver: Send + Sync {
    /// Handle an event
    ///
    /// Returns an error if the event could not be delivered (e.g., channel
    /// closed). Errors are logged and never interrupt the engine.
    fn send(&self, event: &FlowEvent) -> Result<(), EventError>;
}

/// Error when delivering events fails
#[derive(Debug, Clone)]
pub struct EventError {
    pub message: String,
}

impl std::fmt::Display for EventError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Event error: {}", self.message)
    }
}

impl std::error::Error for EventError {}

impl EventError {
    pub fn channel_closed() -> Self {
        Self {
            message: "Channel closed".to_string(),
        }
    }
}

/// Events emitted by workspaces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FlowEvent {
    #[serde(rename_all = "camelCase")]
    NodeAdded { workspace: String, node_id: NodeId },

    #[serde(rename_all = "camelCase")]
    NodeRemoved { workspace: String, node_id: NodeId },

    #[serde(rename_all = "camelCase")]
    NodesMoved {
        workspace: String,
        node_ids: Vec<NodeId>,
    },

    #[serde(rename_all = "camelCase")]
    NodeRenamed {
        workspace: String,
        node_id: NodeId,
        name: String,
    },

    #[serde(rename_all = "camelCase")]
    EdgeAdded { workspace: String, edge_id: EdgeId },

    #[serde(rename_all = "camelCase")]
    EdgeRemoved { workspace: String, edge_id: EdgeId },

    #[serde(rename_all = "camelCase")]
    Grouped {
        workspace: String,
        composite_id: NodeId,
        members: Vec<NodeId>,
    },

    #[serde(rename_all = "camelCase")]
    Ungrouped {
        workspace: String,
        composite_id: NodeId,
        members: Vec<NodeId>,
    },

    #[serde(rename_all = "camelCase")]
    Pasted {
        workspace: String,
        node_ids: Vec<NodeId>,
    },

    /// The graph was replaced by an undo snapshot
    #[serde(rename_all = "camelCase")]
    Restored { workspace: String },

    /// The graph was replaced from a file
    #[serde(rename_all = "camelCase")]
    Loaded { workspace: String, path: String },

    #[serde(rename_all = "camelCase")]
    Saved { workspace: String, path: String },

    #[serde(rename_all = "camelCase")]
    RunStarted {
        workspace: String,
        execution_id: String,
        sequential: bool,
    },

    #[serde(rename_all = "camelCase")]
    StartPointLaunched {
        execution_id: String,
        node_id: NodeId,
        label: String,
    },

    #[serde(rename_all = "camelCase")]
    StartPointCompleted {
        execution_id: String,
        node_id: NodeId,
    },

    #[serde(rename_all = "camelCase")]
    StartPointFailed {
        execution_id: String,
        node_id: NodeId,
        error: String,
    },

    #[serde(rename_all = "camelCase")]
    StopRequested { workspace: String },

    #[serde(rename_all = "camelCase")]
    RunFinished {
        workspace: String,
        execution_id: String,
        stopped: bool,
    },
}

impl FlowEvent {
    /// Whether this event changes what a renderer must draw
    pub fn is_structural(&self) -> bool {
        !matches!(
            self,
            Self::Saved { .. }
                | Self::RunStarted { .. }
                | Self::StartPointLaunched { .. }
                | Self::StartPointCompleted { .. }
                | Self::StartPointFailed { .. }
                | Self::StopRequested { .. }
                | Self::RunFinished { .. }
        )
    }
}

/// A no-op observer that discards all events
pub struct NullObserver;

impl FlowObserver for NullObserver {
    fn send(&self, _event: &FlowEvent) -> Result<(), EventError> {
        Ok(())
    }
}

/// A vector-based observer that collects events
///
/// Useful for testing to verify events were emitted correctly.
pub struct VecObserver {
    events: parking_lot::Mutex<Vec<FlowEvent>>,
}

impl VecObserver {
    pub fn new() -> Self {
        Self {
            events: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Get all collected events
    pub fn events(&self) -> Vec<FlowEvent> {
        self.events.lock().clone()
    }

    /// Clear all collected events
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl Default for VecObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowObserver for VecObserver {
    fn send(&self, event: &FlowEvent) -> Result<(), EventError> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

/// Handle returned by [`ObserverRegistry::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Subscribed observers, shared by all workspaces of a context
#[derive(Clone, Default)]
pub struct ObserverRegistry {
    observers: Arc<RwLock<Vec<(ObserverId, Arc<dyn FlowObserver>)>>>,
    next_id: Arc<AtomicU64>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, observer: Arc<dyn FlowObserver>) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.observers.write().push((id, observer));
        id
    }

    /// Remove an observer; returns false if it was not subscribed
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|(other, _)| *other != id);
        observers.len() != before
    }

    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.read().is_empty()
    }

    /// Deliver an event to every observer; failures are logged
    pub fn notify(&self, event: &FlowEvent) {
        let observers: Vec<Arc<dyn FlowObserver>> =
            self.observers.read().iter().map(|(_, o)| o.clone()).collect();
        for observer in observers {
            if let Err(e) = observer.send(event) {
                log::warn!("Observer rejected {:?}: {}", event, e);
            }
        }
    }
}

impl std::fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("observers", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Closed;

    impl FlowObserver for Closed {
        fn send(&self, _event: &FlowEvent) -> Result<(), EventError> {
            Err(EventError::channel_closed())
        }
    }

    fn added(id: &str) -> FlowEvent {
        FlowEvent::NodeAdded {
            workspace: "ws".to_string(),
            node_id: id.to_string(),
        }
    }

    #[test]
    fn test_subscribe_notify_unsubscribe() {
        let registry = ObserverRegistry::new();
        let observer = Arc::new(VecObserver::new());
        let id = registry.subscribe(observer.clone());

        registry.notify(&added("a"));
        assert_eq!(observer.events(), vec![added("a")]);

        assert!(registry.unsubscribe(id));
        assert!(!registry.unsubscribe(id));
        registry.notify(&added("b"));
        assert_eq!(observer.events().len(), 1);
    }

    #[test]
    fn test_failing_observer_does_not_block_others() {
        let registry = ObserverRegistry::new();
        registry.subscribe(Arc::new(Closed));
        let observer = Arc::new(VecObserver::new());
        registry.subscribe(observer.clone());
        registry.notify(&added("a"));
        assert_eq!(observer.events().len(), 1);
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let json = serde_json::to_value(added("n1")).unwrap();
        assert_eq!(json["type"], "nodeAdded");
        assert_eq!(json["nodeId"], "n1");
        assert!(added("n1").is_structural());
        assert!(!FlowEvent::StopRequested {
            workspace: "ws".into()
        }
        .is_structural());
    }

    #[test]
    fn test_null_observer() {
        NullObserver.send(&added("a")).unwrap();
    }
}
