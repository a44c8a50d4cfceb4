//! Record Source Component
//!
//! Start point that streams records into the flow, one `instance` signal
//! per record followed by a single `dataSet` signal describing the batch.
//! Records come from inline configuration or from a JSON-lines file whose
//! path may reference environment variables (e.g.
//! `${Internal.flow.directory}/iris.jsonl`).

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use flow_engine::{
    Busy, Component, ComponentCategory, ComponentDescriptor, ComponentRegistration,
    EnvironmentAware, Environment, EventSource, FlowError, Named, RequestAcceptor, Result,
    RunContext, Signal, SignalKind, Startable, Stoppable,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::signals;

/// Configuration for the record source
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RecordSourceConfig {
    /// Display name; a `N :` or `! :` prefix orders or excludes the start point
    pub name: Option<String>,
    /// Relation name reported in every signal
    pub relation: String,
    /// JSON-lines file to read; takes precedence over `records`
    pub file: Option<String>,
    /// Inline records
    pub records: Vec<serde_json::Value>,
    /// Pause between records
    pub delay_ms: u64,
}

/// Record Source
///
/// # Signals
/// - `instance` - `{ relation, index, values }` per record
/// - `dataSet` - `{ relation, rows }` once the stream ends
///
/// # Requests
/// - `Start loading` - read the records ahead of the next run
/// - `Reset` - drop loaded records (disabled while streaming)
pub struct RecordSource {
    name: Mutex<Option<String>>,
    config: RecordSourceConfig,
    environment: Mutex<Environment>,
    loaded: Mutex<Option<Arc<Vec<serde_json::Value>>>>,
    busy: AtomicBool,
    stopped: AtomicBool,
}

impl RecordSource {
    pub const TYPE: &'static str = "record-source";

    pub const REQUEST_LOAD: &'static str = "Start loading";
    pub const REQUEST_RESET: &'static str = "Reset";

    pub fn new(config: RecordSourceConfig) -> Self {
        Self {
            name: Mutex::new(config.name.clone()),
            config,
            environment: Mutex::new(Environment::new()),
            loaded: Mutex::new(None),
            busy: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        }
    }

    /// Source streaming the given inline records
    pub fn with_records(name: &str, records: Vec<serde_json::Value>) -> Self {
        Self::new(RecordSourceConfig {
            name: Some(name.to_string()),
            relation: name.to_string(),
            records,
            ..Default::default()
        })
    }

    pub fn descriptor() -> ComponentDescriptor {
        ComponentDescriptor {
            component_type: Self::TYPE.to_string(),
            label: "Record Source".to_string(),
            description: "Streams records from a JSON-lines file or inline data".to_string(),
            category: ComponentCategory::Source,
        }
    }

    pub fn create(config: &serde_json::Value) -> Result<Arc<dyn Component>> {
        let config: RecordSourceConfig = crate::parse_config(Self::TYPE, config)?;
        Ok(Arc::new(Self::new(config)))
    }

    /// Whether records are cached for the next run
    pub fn is_loaded(&self) -> bool {
        self.loaded.lock().is_some()
    }

    fn relation(&self) -> String {
        if self.config.relation.is_empty() {
            self.custom_name().unwrap_or_else(|| Self::TYPE.to_string())
        } else {
            self.config.relation.clone()
        }
    }

    fn file_path(&self) -> Result<Option<PathBuf>> {
        match &self.config.file {
            Some(file) => {
                let expanded = self.environment.lock().substitute(file)?;
                Ok(Some(PathBuf::from(expanded)))
            }
            None => Ok(None),
        }
    }

    fn parse_lines(text: &str) -> Result<Vec<serde_json::Value>> {
        text.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| serde_json::from_str(line).map_err(FlowError::from))
            .collect()
    }

    fn cache(&self, records: Vec<serde_json::Value>) -> Arc<Vec<serde_json::Value>> {
        let records = Arc::new(records);
        *self.loaded.lock() = Some(records.clone());
        records
    }

    /// Read records synchronously (request path)
    fn load_blocking(&self) -> Result<Arc<Vec<serde_json::Value>>> {
        let records = match self.file_path()? {
            Some(path) => Self::parse_lines(&std::fs::read_to_string(&path)?)?,
            None => self.config.records.clone(),
        };
        Ok(self.cache(records))
    }

    async fn load(&self) -> Result<Arc<Vec<serde_json::Value>>> {
        if let Some(records) = self.loaded.lock().clone() {
            return Ok(records);
        }
        let records = match self.file_path()? {
            Some(path) => {
                log::debug!("RecordSource: reading {:?}", path);
                Self::parse_lines(&tokio::fs::read_to_string(&path).await?)?
            }
            None => self.config.records.clone(),
        };
        Ok(self.cache(records))
    }

    async fn stream(&self, ctx: &RunContext) -> Result<u64> {
        let records = self.load().await?;
        let relation = self.relation();
        let mut emitted = 0u64;
        for (index, values) in records.iter().enumerate() {
            if ctx.is_cancelled() || self.stopped.load(Ordering::SeqCst) {
                log::info!("RecordSource '{}': stopped after {} records", ctx.node_id(), emitted);
                break;
            }
            ctx.emit(Signal::new(
                signals::INSTANCE,
                serde_json::json!({ "relation": relation, "index": index, "values": values }),
            ));
            emitted += 1;
            if self.config.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.delay_ms)).await;
            } else {
                tokio::task::yield_now().await;
            }
        }
        ctx.emit(Signal::new(
            signals::DATA_SET,
            serde_json::json!({ "relation": relation, "rows": emitted }),
        ));
        Ok(emitted)
    }
}

inventory::submit!(ComponentRegistration {
    descriptor: RecordSource::descriptor,
    create: RecordSource::create,
});

impl Component for RecordSource {
    fn component_type(&self) -> &str {
        Self::TYPE
    }

    fn config(&self) -> serde_json::Value {
        let config = RecordSourceConfig {
            name: self.name.lock().clone(),
            ..self.config.clone()
        };
        crate::config_value(Self::TYPE, &config)
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

impl Named for RecordSource {
    fn custom_name(&self) -> Option<String> {
        self.name.lock().clone()
    }

    fn set_custom_name(&self, name: &str) {
        *self.name.lock() = Some(name.to_string());
    }
}

impl Busy for RecordSource {
    fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }
}

impl EnvironmentAware for RecordSource {
    fn set_environment(&self, env: &Environment) {
        *self.environment.lock() = env.clone();
    }
}

impl EventSource for RecordSource {
    fn signal_kinds(&self) -> Vec<SignalKind> {
        vec![signals::instance(), signals::data_set()]
    }
}

impl Stoppable for RecordSource {
    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

impl RequestAcceptor for RecordSource {
    fn requests(&self) -> Vec<String> {
        let reset = if self.is_busy() {
            format!("${}", Self::REQUEST_RESET)
        } else {
            Self::REQUEST_RESET.to_string()
        };
        vec![Self::REQUEST_LOAD.to_string(), reset]
    }

    fn perform_request(&self, request: &str) -> Result<()> {
        match request {
            Self::REQUEST_LOAD => {
                let records = self.load_blocking()?;
                log::info!("RecordSource '{}': loaded {} records", self.relation(), records.len());
                Ok(())
            }
            Self::REQUEST_RESET => {
                *self.loaded.lock() = None;
                Ok(())
            }
            other => Err(FlowError::RequestRejected(format!(
                "{} does not understand '{}'",
                Self::TYPE,
                other
            ))),
        }
    }
}

#[async_trait]
impl Startable for RecordSource {
    async fn start(&self, ctx: RunContext) -> Result<()> {
        self.stopped.store(false, Ordering::SeqCst);
        self.busy.store(true, Ordering::SeqCst);
        let result = self.stream(&ctx).await;
        self.busy.store(false, Ordering::SeqCst);
        let emitted = result?;
        log::debug!("RecordSource '{}': emitted {} records", ctx.node_id(), emitted);
        Ok(())
    }
}
