//! Row Filter Component
//!
//! Passes through the `instance` signals whose record matches a field
//! condition and re-emits the batch's `dataSet` with the number of rows
//! that survived.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use flow_engine::{
    Component, ComponentCategory, ComponentDescriptor, ComponentRegistration, ConnectionGate,
    EventListener, EventSource, EventVetoer, ListenerKind, NodeId, Result, RunContext, Signal,
    SignalKind,
};
use serde::{Deserialize, Serialize};

use crate::signals;

/// Configuration for the row filter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RowFilterConfig {
    /// Field inspected in each record; `None` passes every record
    pub field: Option<String>,
    /// Required value; `None` only requires the field to be present
    pub equals: Option<serde_json::Value>,
}

/// Row Filter
///
/// Accepts a single incoming `dataSet` connection. Refuses to emit a
/// `dataSet` until at least one instance of the current batch has passed.
pub struct RowFilter {
    config: RowFilterConfig,
    passed: AtomicU64,
    data_set_inputs: AtomicUsize,
}

impl RowFilter {
    pub const TYPE: &'static str = "row-filter";

    pub fn new(config: RowFilterConfig) -> Self {
        Self {
            config,
            passed: AtomicU64::new(0),
            data_set_inputs: AtomicUsize::new(0),
        }
    }

    /// Filter keeping records whose `field` equals `value`
    pub fn equals(field: &str, value: serde_json::Value) -> Self {
        Self::new(RowFilterConfig {
            field: Some(field.to_string()),
            equals: Some(value),
        })
    }

    pub fn descriptor() -> ComponentDescriptor {
        ComponentDescriptor {
            component_type: Self::TYPE.to_string(),
            label: "Row Filter".to_string(),
            description: "Keeps records whose field matches a value".to_string(),
            category: ComponentCategory::Filter,
        }
    }

    pub fn create(config: &serde_json::Value) -> Result<Arc<dyn Component>> {
        let config: RowFilterConfig = crate::parse_config(Self::TYPE, config)?;
        Ok(Arc::new(Self::new(config)))
    }

    /// Instances passed in the current batch
    pub fn passed(&self) -> u64 {
        self.passed.load(Ordering::SeqCst)
    }

    fn matches(&self, values: &serde_json::Value) -> bool {
        let Some(field) = &self.config.field else {
            return true;
        };
        match (values.get(field), &self.config.equals) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(actual), Some(expected)) => actual == expected,
        }
    }
}

inventory::submit!(ComponentRegistration {
    descriptor: RowFilter::descriptor,
    create: RowFilter::create,
});

impl Component for RowFilter {
    fn component_type(&self) -> &str {
        Self::TYPE
    }

    fn config(&self) -> serde_json::Value {
        crate::config_value(Self::TYPE, &self.config)
    }

    fn as_connection_gate(&self) -> Option<&dyn ConnectionGate> {
        Some(self)
    }

    fn as_event_source(&self) -> Option<&dyn EventSource> {
        Some(self)
    }

    fn as_event_listener(&self) -> Option<&dyn EventListener> {
        Some(self)
    }

    fn as_event_vetoer(&self) -> Option<&dyn EventVetoer> {
        Some(self)
    }
}

impl EventListener for RowFilter {
    fn listener_kinds(&self) -> Vec<ListenerKind> {
        vec![
            ListenerKind::new(signals::INSTANCE_LISTENER),
            ListenerKind::new(signals::DATA_SET_LISTENER),
        ]
    }

    fn receive(&self, signal: &Signal, ctx: &RunContext) -> Result<()> {
        match signal.kind.as_str() {
            signals::INSTANCE => {
                let values = signal.payload.get("values").unwrap_or(&signal.payload);
                if self.matches(values) {
                    self.passed.fetch_add(1, Ordering::SeqCst);
                    ctx.emit(signal.clone());
                }
            }
            signals::DATA_SET => {
                let mut payload = signal.payload.clone();
                if let Some(object) = payload.as_object_mut() {
                    object.insert("rows".to_string(), self.passed().into());
                }
                let delivered = ctx.emit(Signal::new(signals::DATA_SET, payload));
                log::debug!(
                    "RowFilter '{}': {} rows passed, data set reached {} listeners",
                    ctx.node_id(),
                    self.passed(),
                    delivered
                );
                self.passed.store(0, Ordering::SeqCst);
            }
            other => log::warn!("RowFilter '{}': ignoring '{}' signal", ctx.node_id(), other),
        }
        Ok(())
    }
}

impl EventSource for RowFilter {
    fn signal_kinds(&self) -> Vec<SignalKind> {
        vec![signals::instance(), signals::data_set()]
    }
}

impl EventVetoer for RowFilter {
    fn can_emit(&self, signal: &str) -> bool {
        signal != signals::DATA_SET || self.passed() > 0
    }
}

impl ConnectionGate for RowFilter {
    fn connection_allowed(&self, kind: &SignalKind) -> bool {
        kind.name != signals::DATA_SET || self.data_set_inputs.load(Ordering::SeqCst) == 0
    }

    fn connected(&self, kind: &SignalKind, _source: &NodeId) {
        if kind.name == signals::DATA_SET {
            self.data_set_inputs.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn disconnected(&self, kind: &SignalKind, _source: &NodeId) {
        if kind.name == signals::DATA_SET {
            let _ = self
                .data_set_inputs
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        }
    }
}
