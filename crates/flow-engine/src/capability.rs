//! Capability model for wrapped components
//!
//! A node on the canvas wraps a [`Component`]. Components opt into
//! behaviour by implementing capability traits and returning themselves
//! from the matching `as_*` accessor. Callers never inspect concrete types;
//! they ask [`implements`] or use the accessor directly.
//!
//! # Example
//!
//! ```ignore
//! impl Component for MySource {
//!     fn component_type(&self) -> &str { "my-source" }
//!     fn as_startable(&self) -> Option<&dyn Startable> { Some(self) }
//!     fn as_event_source(&self) -> Option<&dyn EventSource> { Some(self) }
//! }
//! ```

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::environment::Environment;
use crate::error::Result;
use crate::orchestration::RunContext;
use crate::types::NodeId;

/// Receiver contract a signal kind expects of its target
/// (e.g. `DataSetListener`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListenerKind(pub String);

impl ListenerKind {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ListenerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A named output signal and the listener capability it feeds
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalKind {
    /// Signal name as emitted by the source (e.g. `dataSet`)
    pub name: String,
    /// Capability the receiving component must implement
    pub listener: ListenerKind,
}

impl SignalKind {
    pub fn new(name: impl Into<String>, listener: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            listener: ListenerKind::new(listener),
        }
    }
}

/// A signal travelling along an edge at run time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// Signal kind name
    pub kind: String,
    /// Payload carried to listeners
    pub payload: serde_json::Value,
}

impl Signal {
    pub fn new(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }
}

/// Named capabilities a component may implement
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Capability {
    Named,
    Busy,
    ConnectionGate,
    EnvironmentAware,
    EventSource,
    Startable,
    Stoppable,
    RequestAcceptor,
    EventVetoer,
    /// Receives signals whose kind expects this listener
    EventListener(ListenerKind),
}

/// The object wrapped by a canvas node
///
/// `config()` must capture everything needed to rebuild an equivalent
/// component through the registry; snapshots, clipboard and files rely on
/// it exclusively.
pub trait Component: Send + Sync + 'static {
    /// Registry key for this component's factory
    fn component_type(&self) -> &str;

    /// Configuration that reconstructs this component
    fn config(&self) -> serde_json::Value {
        serde_json::Value::Null
    }

    fn as_named(&self) -> Option<&dyn Named> {
        None
    }

    fn as_busy(&self) -> Option<&dyn Busy> {
        None
    }

    fn as_connection_gate(&self) -> Option<&dyn ConnectionGate> {
        None
    }

    fn as_environment_aware(&self) -> Option<&dyn EnvironmentAware> {
        None
    }

    fn as_event_source(&self) -> Option<&dyn EventSource> {
        None
    }

    fn as_event_listener(&self) -> Option<&dyn EventListener> {
        None
    }

    fn as_startable(&self) -> Option<&dyn Startable> {
        None
    }

    fn as_stoppable(&self) -> Option<&dyn Stoppable> {
        None
    }

    fn as_request_acceptor(&self) -> Option<&dyn RequestAcceptor> {
        None
    }

    fn as_event_vetoer(&self) -> Option<&dyn EventVetoer> {
        None
    }
}

impl fmt::Debug for dyn Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("type", &self.component_type())
            .finish_non_exhaustive()
    }
}

/// Custom display name holder
pub trait Named: Send + Sync {
    fn custom_name(&self) -> Option<String>;
    fn set_custom_name(&self, name: &str);
}

/// Reports whether the component is currently executing
pub trait Busy: Send + Sync {
    fn is_busy(&self) -> bool;
}

/// Veto over incoming connections
pub trait ConnectionGate: Send + Sync {
    /// Whether a new incoming connection of this kind is acceptable now
    fn connection_allowed(&self, kind: &SignalKind) -> bool;

    /// An incoming connection of `kind` from `source` was established
    fn connected(&self, _kind: &SignalKind, _source: &NodeId) {}

    /// An incoming connection of `kind` from `source` was removed
    fn disconnected(&self, _kind: &SignalKind, _source: &NodeId) {}
}

/// Consumes the workspace environment before first use
pub trait EnvironmentAware: Send + Sync {
    fn set_environment(&self, env: &Environment);
}

/// Enumerates the signals this component can emit
pub trait EventSource: Send + Sync {
    fn signal_kinds(&self) -> Vec<SignalKind>;
}

/// Receives signals of the listed listener kinds
pub trait EventListener: Send + Sync {
    fn listener_kinds(&self) -> Vec<ListenerKind>;

    /// Handle a delivered signal; `ctx` is scoped to the receiving node so
    /// the listener may emit downstream.
    fn receive(&self, signal: &Signal, ctx: &RunContext) -> Result<()>;
}

/// Can be launched as a start point
#[async_trait]
pub trait Startable: Send + Sync {
    /// Run until the component's work is complete or `ctx` is cancelled
    async fn start(&self, ctx: RunContext) -> Result<()>;
}

/// Accepts a best-effort stop request
pub trait Stoppable: Send + Sync {
    fn stop(&self);
}

/// Exposes user-triggerable actions
///
/// Entries may carry leading markers: `$` disabled, then `?` confirm.
pub trait RequestAcceptor: Send + Sync {
    fn requests(&self) -> Vec<String>;
    fn perform_request(&self, request: &str) -> Result<()>;
}

/// May refuse to emit a signal kind right now
pub trait EventVetoer: Send + Sync {
    fn can_emit(&self, signal: &str) -> bool;
}

/// Type-safe capability query
pub fn implements(component: &dyn Component, capability: &Capability) -> bool {
    match capability {
        Capability::Named => component.as_named().is_some(),
        Capability::Busy => component.as_busy().is_some(),
        Capability::ConnectionGate => component.as_connection_gate().is_some(),
        Capability::EnvironmentAware => component.as_environment_aware().is_some(),
        Capability::EventSource => component.as_event_source().is_some(),
        Capability::Startable => component.as_startable().is_some(),
        Capability::Stoppable => component.as_stoppable().is_some(),
        Capability::RequestAcceptor => component.as_request_acceptor().is_some(),
        Capability::EventVetoer => component.as_event_vetoer().is_some(),
        Capability::EventListener(kind) => component
            .as_event_listener()
            .is_some_and(|l| l.listener_kinds().contains(kind)),
    }
}

/// Whether `component` would accept an incoming connection of `kind`:
/// it must implement the expected listener and not veto through its gate.
pub fn accepts_connection(component: &dyn Component, kind: &SignalKind) -> bool {
    implements(component, &Capability::EventListener(kind.listener.clone()))
        && component
            .as_connection_gate()
            .map_or(true, |gate| gate.connection_allowed(kind))
}

/// All capabilities a component implements (listener kinds expanded)
pub fn capabilities_of(component: &dyn Component) -> Vec<Capability> {
    let fixed = [
        Capability::Named,
        Capability::Busy,
        Capability::ConnectionGate,
        Capability::EnvironmentAware,
        Capability::EventSource,
        Capability::Startable,
        Capability::Stoppable,
        Capability::RequestAcceptor,
        Capability::EventVetoer,
    ];
    let mut caps: Vec<Capability> = fixed
        .into_iter()
        .filter(|c| implements(component, c))
        .collect();
    if let Some(listener) = component.as_event_listener() {
        caps.extend(listener.listener_kinds().into_iter().map(Capability::EventListener));
    }
    caps
}

/// A parsed `RequestAcceptor` entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRequest {
    /// Request name with markers stripped
    pub name: String,
    /// `$` marker: shown but not executable
    pub disabled: bool,
    /// `?` marker: ask before running
    pub confirm: bool,
}

impl UserRequest {
    /// Parse a raw request entry. Markers are read in order `$` then `?`.
    pub fn parse(raw: &str) -> Self {
        let mut name = raw;
        let disabled = name.starts_with('$');
        if disabled {
            name = &name[1..];
        }
        let confirm = name.starts_with('?');
        if confirm {
            name = &name[1..];
        }
        Self {
            name: name.to_string(),
            disabled,
            confirm,
        }
    }
}

/// Parsed requests offered by a component (empty when it accepts none)
pub fn user_requests(component: &dyn Component) -> Vec<UserRequest> {
    component
        .as_request_acceptor()
        .map(|acceptor| {
            acceptor
                .requests()
                .iter()
                .filter(|raw| !raw.is_empty())
                .map(|raw| UserRequest::parse(raw))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{GatedSink, Sink, Source};

    #[test]
    fn test_parse_request_markers() {
        assert_eq!(
            UserRequest::parse("$?Reset"),
            UserRequest {
                name: "Reset".to_string(),
                disabled: true,
                confirm: true
            }
        );
        let plain = UserRequest::parse("Start loading");
        assert!(!plain.disabled && !plain.confirm);
        assert_eq!(plain.name, "Start loading");

        // `?` before `$` leaves the dollar in the name
        let odd = UserRequest::parse("?$x");
        assert!(odd.confirm && !odd.disabled);
        assert_eq!(odd.name, "$x");
    }

    #[test]
    fn test_implements_queries_capabilities() {
        let source = Source::new("src");
        assert!(implements(&source, &Capability::Startable));
        assert!(implements(&source, &Capability::EventSource));
        assert!(!implements(&source, &Capability::ConnectionGate));

        let sink = Sink::new();
        assert!(implements(
            &sink,
            &Capability::EventListener(ListenerKind::new("DataSetListener"))
        ));
        assert!(!implements(
            &sink,
            &Capability::EventListener(ListenerKind::new("ChartListener"))
        ));
    }

    #[test]
    fn test_absent_gate_always_allows() {
        let sink = Sink::new();
        let kind = SignalKind::new("dataSet", "DataSetListener");
        assert!(accepts_connection(&sink, &kind));

        let gated = GatedSink::closed();
        assert!(!accepts_connection(&gated, &kind));
    }

    #[test]
    fn test_capabilities_of_lists_listener_kinds() {
        let caps = capabilities_of(&Sink::new());
        assert!(caps.contains(&Capability::EventListener(ListenerKind::new("DataSetListener"))));
        assert!(!caps.contains(&Capability::Startable));
    }
}
