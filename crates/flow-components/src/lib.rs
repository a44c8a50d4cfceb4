//! Flow Components
//!
//! Built-in components for KnowledgeFlow. Each one wraps a small piece of
//! work behind the engine's capability traits and registers itself with
//! `inventory`, so `ComponentRegistry::with_builtins()` sees every type
//! linked into the binary.
//!
//! # Categories
//!
//! - **Input**: start points that load records into the flow
//! - **Processing**: listeners that transform records in flight
//! - **Output**: listeners that collect results for display

use std::sync::Arc;

use flow_engine::{ComponentRegistry, FlowError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

pub mod input;
pub mod output;
pub mod processing;
pub mod signals;

pub use input::*;
pub use output::*;
pub use processing::*;

/// Registry holding every component linked into this build
pub fn registry() -> Arc<ComponentRegistry> {
    Arc::new(ComponentRegistry::with_builtins())
}

/// Decode a factory configuration; `null` means defaults
pub(crate) fn parse_config<T>(component_type: &str, config: &serde_json::Value) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    if config.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(config.clone()).map_err(|e| FlowError::InvalidConfig {
        component_type: component_type.to_string(),
        message: e.to_string(),
    })
}

/// Encode a component's configuration for saving
///
/// A configuration that cannot be encoded is logged and saved as `null`,
/// which the factory reads back as defaults.
pub(crate) fn config_value<T: Serialize>(component_type: &str, config: &T) -> serde_json::Value {
    serde_json::to_value(config).unwrap_or_else(|e| {
        log::error!("Failed to encode {} configuration: {}", component_type, e);
        serde_json::Value::Null
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use flow_engine::environment::FLOW_DIRECTORY_KEY;
    use flow_engine::{ComponentCategory, EditorConfig, FlowNode, Workspace};
    use serde_json::json;

    #[test]
    fn test_inventory_collects_all_builtins() {
        let registry = registry();
        assert_eq!(registry.len(), 3, "Expected 3 built-in components");

        assert!(registry.has_component_type("record-source"));
        assert!(registry.has_component_type("row-filter"));
        assert!(registry.has_component_type("text-collector"));

        let grouped = registry.descriptors_by_category();
        assert_eq!(grouped[&ComponentCategory::Source].len(), 1);
        assert_eq!(grouped[&ComponentCategory::Filter].len(), 1);
        assert_eq!(grouped[&ComponentCategory::Sink].len(), 1);
    }

    fn workspace() -> Workspace {
        Workspace::new("iris", registry(), EditorConfig::default())
    }

    fn wire(ws: &mut Workspace, from: &str, to: &str) {
        for signal in ["instance", "dataSet"] {
            ws.connect(from, signal, to).unwrap();
        }
    }

    #[tokio::test]
    async fn test_filtered_flow_reaches_collector() {
        let mut ws = workspace();
        let records = vec![
            json!({"class": "setosa"}),
            json!({"class": "virginica"}),
            json!({"class": "setosa"}),
        ];
        let src = ws
            .add_node(FlowNode::new(Arc::new(RecordSource::with_records("1: iris", records)), (0.0, 0.0)))
            .unwrap();
        let filter = ws
            .add_node(FlowNode::new(Arc::new(RowFilter::equals("class", json!("setosa"))), (100.0, 0.0)))
            .unwrap();
        let collector = Arc::new(TextCollector::new(TextCollectorConfig::default()));
        let out = ws.add_node(FlowNode::new(collector.clone(), (200.0, 0.0))).unwrap();
        wire(&mut ws, &src, &filter);
        wire(&mut ws, &filter, &out);

        // The filter's gate refuses a second data set input
        let other = ws
            .add_component("record-source", &json!({"name": "other"}), (0.0, 100.0))
            .unwrap();
        assert!(ws.connect(&other, "dataSet", &filter).unwrap_err().is_validation());
        ws.connect(&other, "instance", &filter).unwrap();

        let summary = ws.run(true).unwrap().wait().await.unwrap();
        assert!(summary.succeeded(), "{:?}", summary.failed);
        assert_eq!(summary.launched.len(), 2);

        assert_eq!(collector.count("instance"), 2);
        assert_eq!(collector.count("dataSet"), 1);
        assert_eq!(collector.lines().last().map(String::as_str), Some("=== 1: iris: 2 rows ==="));
    }

    #[tokio::test]
    async fn test_saved_flow_resolves_files_next_to_it() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("iris.jsonl"), "{\"class\": \"setosa\"}\n").unwrap();
        let path = dir.path().join("iris.kf");

        let mut ws = workspace();
        let file = format!("${{{}}}/iris.jsonl", FLOW_DIRECTORY_KEY);
        let src = ws
            .add_component("record-source", &json!({"name": "iris", "file": file}), (0.0, 0.0))
            .unwrap();
        let out = ws.add_component("text-collector", &json!({}), (100.0, 0.0)).unwrap();
        wire(&mut ws, &src, &out);
        ws.save(&path).unwrap();

        let mut reopened = workspace();
        reopened.load(&path).unwrap();
        assert_eq!(reopened.node_count(), 2);
        assert_eq!(reopened.edge_count(), 2);

        let summary = reopened.run(false).unwrap().wait().await.unwrap();
        assert!(summary.succeeded(), "{:?}", summary.failed);
    }

    #[test]
    fn test_unencodable_config_saves_as_defaults() {
        // JSON objects need string keys
        let config: std::collections::BTreeMap<(u8, u8), u8> = [((1, 2), 3)].into_iter().collect();
        let saved = config_value("row-filter", &config);
        assert!(saved.is_null());
        assert!(parse_config::<RowFilterConfig>("row-filter", &saved).is_ok());

        assert_eq!(config_value("row-filter", &json!({"field": "x"})), json!({"field": "x"}));
    }

    #[tokio::test]
    async fn test_collector_requests_through_workspace() {
        let mut ws = workspace();
        let out = ws.add_component("text-collector", &json!({}), (0.0, 0.0)).unwrap();
        let requests = ws.node_requests(&out).unwrap();
        assert!(requests.iter().any(|r| r.name == "Discard all" && r.confirm));

        assert!(ws.perform_request(&out, "Discard all", false).is_err());
        let handle = ws.perform_request(&out, "Discard all", true).unwrap();
        handle.await.unwrap().unwrap();
        assert!(ws.is_dirty());
    }
}
