//! Text Collector Component
//!
//! Renders every signal it receives as a line of text and keeps the lines
//! for display.

use std::collections::BTreeMap;
use std::sync::Arc;

use flow_engine::{
    Component, ComponentCategory, ComponentDescriptor, ComponentRegistration, EventListener,
    FlowError, ListenerKind, Named, RequestAcceptor, Result, RunContext, Signal,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::signals;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TextCollectorConfig {
    pub name: Option<String>,
}

#[derive(Default)]
struct Collected {
    lines: Vec<String>,
    counts: BTreeMap<String, usize>,
}

/// Text Collector
///
/// # Requests
/// - `Clear results` - drop the collected lines
/// - `Discard all` (confirm) - drop lines and per-kind counts
pub struct TextCollector {
    name: Mutex<Option<String>>,
    collected: Mutex<Collected>,
}

impl TextCollector {
    pub const TYPE: &'static str = "text-collector";

    pub const REQUEST_CLEAR: &'static str = "Clear results";
    pub const REQUEST_DISCARD: &'static str = "Discard all";

    pub fn new(config: TextCollectorConfig) -> Self {
        Self {
            name: Mutex::new(config.name),
            collected: Mutex::new(Collected::default()),
        }
    }

    pub fn descriptor() -> ComponentDescriptor {
        ComponentDescriptor {
            component_type: Self::TYPE.to_string(),
            label: "Text Collector".to_string(),
            description: "Collects received records and summaries as text".to_string(),
            category: ComponentCategory::Sink,
        }
    }

    pub fn create(config: &serde_json::Value) -> Result<Arc<dyn Component>> {
        let config: TextCollectorConfig = crate::parse_config(Self::TYPE, config)?;
        Ok(Arc::new(Self::new(config)))
    }

    pub fn lines(&self) -> Vec<String> {
        self.collected.lock().lines.clone()
    }

    /// All lines joined for display
    pub fn text(&self) -> String {
        self.collected.lock().lines.join("\n")
    }

    /// Signals of `kind` received since the last discard
    pub fn count(&self, kind: &str) -> usize {
        self.collected.lock().counts.get(kind).copied().unwrap_or(0)
    }

    fn render(signal: &Signal) -> String {
        let payload = &signal.payload;
        let relation = payload.get("relation").and_then(|r| r.as_str()).unwrap_or("?");
        match signal.kind.as_str() {
            signals::INSTANCE => {
                let index = payload.get("index").and_then(|i| i.as_u64()).unwrap_or(0);
                let values = payload.get("values").unwrap_or(payload);
                format!("{}[{}] {}", relation, index, values)
            }
            signals::DATA_SET => {
                let rows = payload.get("rows").and_then(|r| r.as_u64()).unwrap_or(0);
                format!("=== {}: {} rows ===", relation, rows)
            }
            signals::TEXT => match payload.as_str() {
                Some(text) => text.to_string(),
                None => payload.to_string(),
            },
            other => format!("{}: {}", other, payload),
        }
    }
}

inventory::submit!(ComponentRegistration {
    descriptor: TextCollector::descriptor,
    create: TextCollector::create,
});

impl Component for TextCollector {
    fn component_type(&self) -> &str {
        Self::TYPE
    }

    fn config(&self) -> serde_json::Value {
        serde_json::json!({ "name": *self.name.lock() })
    }

    fn as_named(&self) -> Option<&dyn Named> {
        Some(self)
    }

    fn as_event_listener(&self) -> Option<&dyn EventListener> {
        Some(self)
    }

    fn as_request_acceptor(&self) -> Option<&dyn RequestAcceptor> {
        Some(self)
    }
}

impl Named for TextCollector {
    fn custom_name(&self) -> Option<String> {
        self.name.lock().clone()
    }

    fn set_custom_name(&self, name: &str) {
        *self.name.lock() = Some(name.to_string());
    }
}

impl EventListener for TextCollector {
    fn listener_kinds(&self) -> Vec<ListenerKind> {
        vec![
            ListenerKind::new(signals::INSTANCE_LISTENER),
            ListenerKind::new(signals::DATA_SET_LISTENER),
            ListenerKind::new(signals::TEXT_LISTENER),
        ]
    }

    fn receive(&self, signal: &Signal, _ctx: &RunContext) -> Result<()> {
        let line = Self::render(signal);
        let mut collected = self.collected.lock();
        collected.lines.push(line);
        *collected.counts.entry(signal.kind.clone()).or_insert(0) += 1;
        Ok(())
    }
}

impl RequestAcceptor for TextCollector {
    fn requests(&self) -> Vec<String> {
        vec![
            Self::REQUEST_CLEAR.to_string(),
            format!("?{}", Self::REQUEST_DISCARD),
        ]
    }

    fn perform_request(&self, request: &str) -> Result<()> {
        let mut collected = self.collected.lock();
        match request {
            Self::REQUEST_CLEAR => collected.lines.clear(),
            Self::REQUEST_DISCARD => *collected = Collected::default(),
            other => {
                return Err(FlowError::RequestRejected(format!(
                    "{} does not understand '{}'",
                    Self::TYPE,
                    other
                )))
            }
        }
        Ok(())
    }
}
