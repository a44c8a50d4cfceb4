//! Flow Engine - graph model, editing protocol and orchestrator for KnowledgeFlow
//!
//! A flow is a directed graph of components wired by typed signal
//! connections. This crate owns everything below the canvas:
//!
//! - Capability model for wrapped components (`Startable`, `EventListener`, ...)
//! - Graph store with cascading removal and hit testing
//! - Connection validation with receiver veto
//! - Grouping selections into composite nodes and back
//! - Compressed snapshot undo, bounded per workspace
//! - Clipboard copy/paste through serialized subgraphs
//! - Parallel or label-ordered sequential execution with cooperative stop
//!
//! # Architecture
//!
//! - `Workspace`: one tab; every edit is staged, snapshotted, then committed
//! - `FlowContext`: the open tabs plus the registry, clipboard and observers
//!   they share
//! - `ComponentRegistry`: factories keyed by component type, filled at link
//!   time through `inventory`
//! - `FlowObserver`: structural and run events for whatever paints the canvas
//!
//! # Example
//!
//! ```ignore
//! use flow_engine::{ComponentRegistry, EditorConfig, FlowContext};
//!
//! let mut ctx = FlowContext::new(Arc::new(ComponentRegistry::with_builtins()), EditorConfig::default());
//! let index = ctx.open(Path::new("iris.json"))?;
//! let summary = ctx.workspace_mut(index).unwrap().run(true)?.wait().await?;
//! ```

pub mod capability;
pub mod clipboard;
pub mod config;
pub mod constants;
pub mod context;
pub mod environment;
pub mod error;
pub mod events;
pub mod graph;
pub mod groups;
pub mod interaction;
pub mod orchestration;
pub mod persist;
pub mod registry;
pub mod snapshot;
pub mod types;
pub mod undo;
pub mod validation;
pub mod workspace;

#[cfg(test)]
pub(crate) mod testing;

// Re-export key types
pub use capability::{
    implements, Busy, Capability, Component, ConnectionGate, EnvironmentAware, EventListener,
    EventSource, EventVetoer, ListenerKind, Named, RequestAcceptor, Signal, SignalKind, Startable,
    Stoppable, UserRequest,
};
pub use clipboard::Clipboard;
pub use config::{ConfigError, EditorConfig};
pub use context::FlowContext;
pub use environment::Environment;
pub use error::{FlowError, Result};
pub use events::{FlowEvent, FlowObserver, ObserverId, ObserverRegistry};
pub use graph::FlowGraph;
pub use groups::{CompositeNode, GroupOperations, PreviewRenderer};
pub use interaction::{EditMode, Intent, InteractionMachine, PointerEvent};
pub use orchestration::{RunContext, RunHandle, RunState, RunSummary};
pub use registry::{ComponentCategory, ComponentDescriptor, ComponentRegistration, ComponentRegistry};
pub use snapshot::FlowDocument;
pub use types::{EdgeId, FlowEdge, FlowNode, NodeId, Position, Rect};
pub use undo::UndoStack;
pub use validation::ValidationError;
pub use workspace::Workspace;
