//! Components shared by the engine's unit tests

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::capability::{
    Busy, Component, ConnectionGate, EnvironmentAware, EventListener, EventSource, EventVetoer,
    ListenerKind, Named, RequestAcceptor, Signal, SignalKind, Startable, Stoppable,
};
use crate::environment::Environment;
use crate::error::{FlowError, Result};
use crate::orchestration::RunContext;
use crate::registry::{ComponentCategory, ComponentDescriptor, ComponentRegistry};
use crate::types::NodeId;

pub fn data_set() -> SignalKind {
    SignalKind::new("dataSet", "DataSetListener")
}

pub fn instance() -> SignalKind {
    SignalKind::new("instance", "InstanceListener")
}

pub fn chart() -> SignalKind {
    SignalKind::new("chart", "ChartListener")
}

/// Shared record of which start points ran, in order
pub type LaunchLog = Arc<Mutex<Vec<String>>>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SourceConfig {
    pub name: Option<String>,
    pub rows: u64,
    pub fail: bool,
    pub delay_ms: u64,
}

/// Start point emitting `rows` instances then one data set
pub struct Source {
    name: Mutex<Option<String>>,
    rows: u64,
    fail: bool,
    delay_ms: u64,
    busy: AtomicBool,
    stopped: AtomicBool,
    log: Option<LaunchLog>,
    pub environment: Mutex<Option<Environment>>,
    pub performed: Mutex<Vec<String>>,
}

impl Source {
    pub fn new(name: &str) -> Self {
        Self::from_config(SourceConfig {
            name: Some(name.to_string()),
            rows: 1,
            ..Default::default()
        })
    }

    pub fn from_config(config: SourceConfig) -> Self {
        Self {
            name: Mutex::new(config.name),
            rows: config.rows,
            fail: config.fail,
            delay_ms: config.delay_ms,
            busy: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            log: None,
            environment: Mutex::new(None),
            performed: Mutex::new(Vec::new()),
        }
    }

    pub fn logging(mut self, log: LaunchLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn slow(mut self, delay_ms: u64, rows: u64) -> Self {
        self.delay_ms = delay_ms;
        self.rows = rows;
        self
    }

    pub fn was_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn set_busy(&self, busy: bool) {
        self.busy.store(busy, Ordering::SeqCst);
    }
}

impl Component for Source {
    fn component_type(&self) -> &str {
        "test-source"
    }

    fn config(&self) -> serde_json::Value {
        serde_json::json!({
            "name": *self.name.lock(),
            "rows": self.rows,
            "fail": self.fail,
            "delayMs": self.delay_ms,
        })
    }

    fn as_named(&self) -> Option<&dyn Named> {
        Some(self)
    }

    fn as_busy(&self) -> Option<&dyn Busy> {
        Some(self)
    }

    fn as_environment_aware(&self) -> Option<&dyn EnvironmentAware> {
        Some(self)
    }

    fn as_event_source(&self) -> Option<&dyn EventSource> {
        Some(self)
    }

    fn as_startable(&self) -> Option<&dyn Startable> {
        Some(self)
    }

    fn as_stoppable(&self) -> Option<&dyn Stoppable> {
        Some(self)
    }

    fn as_request_acceptor(&self) -> Option<&dyn RequestAcceptor> {
        Some(self)
    }
}

impl Named for Source {
    fn custom_name(&self) -> Option<String> {
        self.name.lock().clone()
    }

    fn set_custom_name(&self, name: &str) {
        *self.name.lock() = Some(name.to_string());
    }
}

impl Busy for Source {
    fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }
}

impl EnvironmentAware for Source {
    fn set_environment(&self, env: &Environment) {
        *self.environment.lock() = Some(env.clone());
    }
}

impl EventSource for Source {
    fn signal_kinds(&self) -> Vec<SignalKind> {
        vec![instance(), data_set()]
    }
}

impl Stoppable for Source {
    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

impl RequestAcceptor for Source {
    fn requests(&self) -> Vec<String> {
        vec![
            "Start loading".to_string(),
            "$Reset".to_string(),
            "?Forget".to_string(),
        ]
    }

    fn perform_request(&self, request: &str) -> Result<()> {
        self.performed.lock().push(request.to_string());
        Ok(())
    }
}

#[async_trait]
impl Startable for Source {
    async fn start(&self, ctx: RunContext) -> Result<()> {
        self.stopped.store(false, Ordering::SeqCst);
        self.busy.store(true, Ordering::SeqCst);
        if let Some(log) = &self.log {
            log.lock().push(self.custom_name().unwrap_or_default());
        }
        if self.fail {
            self.busy.store(false, Ordering::SeqCst);
            return Err(FlowError::failed("source exploded"));
        }
        let mut emitted = 0u64;
        for row in 0..self.rows {
            if ctx.is_cancelled() || self.was_stopped() {
                break;
            }
            ctx.emit(Signal::new("instance", serde_json::json!({ "row": row })));
            emitted += 1;
            if self.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            } else {
                tokio::task::yield_now().await;
            }
        }
        ctx.emit(Signal::new("dataSet", serde_json::json!({ "rows": emitted })));
        self.busy.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Records every signal it receives
#[derive(Default)]
pub struct Sink {
    pub received: Mutex<Vec<Signal>>,
}

impl Sink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.received.lock().iter().filter(|s| s.kind == kind).count()
    }
}

impl Component for Sink {
    fn component_type(&self) -> &str {
        "test-sink"
    }

    fn as_event_listener(&self) -> Option<&dyn EventListener> {
        Some(self)
    }
}

impl EventListener for Sink {
    fn listener_kinds(&self) -> Vec<ListenerKind> {
        vec![
            ListenerKind::new("DataSetListener"),
            ListenerKind::new("InstanceListener"),
        ]
    }

    fn receive(&self, signal: &Signal, _ctx: &RunContext) -> Result<()> {
        self.received.lock().push(signal.clone());
        Ok(())
    }
}

/// Data set listener with a connection gate
pub struct GatedSink {
    open: bool,
    pub connections: AtomicUsize,
}

impl GatedSink {
    pub fn open() -> Self {
        Self {
            open: true,
            connections: AtomicUsize::new(0),
        }
    }

    pub fn closed() -> Self {
        Self {
            open: false,
            connections: AtomicUsize::new(0),
        }
    }
}

impl Component for GatedSink {
    fn component_type(&self) -> &str {
        "test-gated-sink"
    }

    fn config(&self) -> serde_json::Value {
        serde_json::json!({ "open": self.open })
    }

    fn as_event_listener(&self) -> Option<&dyn EventListener> {
        Some(self)
    }

    fn as_connection_gate(&self) -> Option<&dyn ConnectionGate> {
        Some(self)
    }
}

impl EventListener for GatedSink {
    fn listener_kinds(&self) -> Vec<ListenerKind> {
        vec![ListenerKind::new("DataSetListener")]
    }

    fn receive(&self, _signal: &Signal, _ctx: &RunContext) -> Result<()> {
        Ok(())
    }
}

impl ConnectionGate for GatedSink {
    fn connection_allowed(&self, _kind: &SignalKind) -> bool {
        self.open && self.connections.load(Ordering::SeqCst) == 0
    }

    fn connected(&self, _kind: &SignalKind, _source: &NodeId) {
        self.connections.fetch_add(1, Ordering::SeqCst);
    }

    fn disconnected(&self, _kind: &SignalKind, _source: &NodeId) {
        self.connections.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Forwards data sets; refuses to emit until it has seen one
#[derive(Default)]
pub struct Relay {
    seen: AtomicBool,
    pub blocked: AtomicBool,
}

impl Relay {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Component for Relay {
    fn component_type(&self) -> &str {
        "test-relay"
    }

    fn config(&self) -> serde_json::Value {
        serde_json::json!({ "blocked": self.blocked.load(Ordering::SeqCst) })
    }

    fn as_event_listener(&self) -> Option<&dyn EventListener> {
        Some(self)
    }

    fn as_event_source(&self) -> Option<&dyn EventSource> {
        Some(self)
    }

    fn as_event_vetoer(&self) -> Option<&dyn EventVetoer> {
        Some(self)
    }
}

impl EventListener for Relay {
    fn listener_kinds(&self) -> Vec<ListenerKind> {
        vec![ListenerKind::new("DataSetListener")]
    }

    fn receive(&self, signal: &Signal, ctx: &RunContext) -> Result<()> {
        self.seen.store(true, Ordering::SeqCst);
        ctx.emit(signal.clone());
        Ok(())
    }
}

impl EventSource for Relay {
    fn signal_kinds(&self) -> Vec<SignalKind> {
        vec![data_set()]
    }
}

impl EventVetoer for Relay {
    fn can_emit(&self, _signal: &str) -> bool {
        self.seen.load(Ordering::SeqCst) && !self.blocked.load(Ordering::SeqCst)
    }
}

fn descriptor(component_type: &str, category: ComponentCategory) -> ComponentDescriptor {
    ComponentDescriptor {
        component_type: component_type.to_string(),
        label: component_type.to_string(),
        description: String::new(),
        category,
    }
}

/// Registry holding every test component
pub fn test_registry() -> Arc<ComponentRegistry> {
    let mut registry = ComponentRegistry::new();
    registry.register_fn(descriptor("test-source", ComponentCategory::Source), |config| {
        let config: SourceConfig = serde_json::from_value(config.clone())?;
        Ok(Arc::new(Source::from_config(config)) as Arc<dyn Component>)
    });
    registry.register_fn(descriptor("test-sink", ComponentCategory::Sink), |_| {
        Ok(Arc::new(Sink::new()) as Arc<dyn Component>)
    });
    registry.register_fn(
        descriptor("test-gated-sink", ComponentCategory::Sink),
        |config| {
            let open = config.get("open").and_then(|v| v.as_bool()).unwrap_or(true);
            let sink = if open {
                GatedSink::open()
            } else {
                GatedSink::closed()
            };
            Ok(Arc::new(sink) as Arc<dyn Component>)
        },
    );
    registry.register_fn(descriptor("test-relay", ComponentCategory::Filter), |_| {
        Ok(Arc::new(Relay::new()) as Arc<dyn Component>)
    });
    Arc::new(registry)
}
