//! Flow file formats
//!
//! Three containers hold the same [`FlowDocument`]:
//!
//! - `.kf` compact binary: magic bytes followed by a bincode encoding
//! - `.json` canonical structured text, used for every text write
//! - `.toml` alternative structured text, accepted on read only
//!
//! Reading sniffs the binary magic first, so a file's extension only
//! matters when writing.

use std::path::Path;

use crate::constants::formats::{BINARY_EXTENSION, BINARY_MAGIC, JSON_EXTENSION, TOML_EXTENSION};
use crate::error::{FlowError, Result};
use crate::snapshot::FlowDocument;

/// Container format of a flow file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowFormat {
    Binary,
    Json,
    Toml,
}

impl FlowFormat {
    /// Format implied by a path's extension; unknown extensions are JSON
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case(BINARY_EXTENSION) => Self::Binary,
            Some(ext) if ext.eq_ignore_ascii_case(TOML_EXTENSION) => Self::Toml,
            _ => Self::Json,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Binary => BINARY_EXTENSION,
            Self::Json => JSON_EXTENSION,
            Self::Toml => TOML_EXTENSION,
        }
    }

    /// Guess the format of raw file contents
    pub fn sniff(bytes: &[u8]) -> Self {
        if bytes.starts_with(BINARY_MAGIC) {
            return Self::Binary;
        }
        match bytes.iter().find(|b| !b.is_ascii_whitespace()) {
            Some(b'{') => Self::Json,
            _ => Self::Toml,
        }
    }
}

/// Encode a document in the given format
pub fn encode(document: &FlowDocument, format: FlowFormat) -> Result<Vec<u8>> {
    match format {
        FlowFormat::Binary => {
            let mut bytes = BINARY_MAGIC.to_vec();
            bytes.extend(bincode::serde::encode_to_vec(document, bincode::config::standard())?);
            Ok(bytes)
        }
        FlowFormat::Json => Ok(serde_json::to_vec_pretty(document)?),
        FlowFormat::Toml => Err(FlowError::serialization(
            "TOML flow files are read-only; save as .json or .kf",
        )),
    }
}

/// Decode a document, detecting its format from the contents
pub fn decode(bytes: &[u8]) -> Result<FlowDocument> {
    decode_as(bytes, FlowFormat::sniff(bytes))
}

/// Decode a document in a known format
pub fn decode_as(bytes: &[u8], format: FlowFormat) -> Result<FlowDocument> {
    match format {
        FlowFormat::Binary => {
            let payload = bytes
                .strip_prefix(BINARY_MAGIC.as_slice())
                .ok_or_else(|| FlowError::serialization("Missing binary flow header"))?;
            let (document, _) =
                bincode::serde::decode_from_slice::<FlowDocument, _>(payload, bincode::config::standard())?;
            Ok(document)
        }
        FlowFormat::Json => Ok(serde_json::from_slice(bytes)?),
        FlowFormat::Toml => {
            let text = std::str::from_utf8(bytes)
                .map_err(|e| FlowError::serialization(format!("TOML flow is not UTF-8: {}", e)))?;
            let value: toml::Value = toml::from_str(text)?;
            let json = serde_json::to_value(value)?;
            Ok(serde_json::from_value(json)?)
        }
    }
}

/// Write a document to `path`, choosing the format from its extension
pub fn write_document(path: &Path, document: &FlowDocument) -> Result<()> {
    let bytes = encode(document, FlowFormat::from_path(path))?;
    std::fs::write(path, bytes)?;
    log::info!("Saved flow to {}", path.display());
    Ok(())
}

/// Read a document from `path`
pub fn read_document(path: &Path) -> Result<FlowDocument> {
    let bytes = std::fs::read(path)?;
    let document = decode(&bytes)?;
    log::info!(
        "Loaded flow from {} ({} node(s), {} edge(s))",
        path.display(),
        document.node_count(),
        document.edges.len()
    );
    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::graph::FlowGraph;
    use crate::groups::GroupOperations;
    use crate::testing::{data_set, test_registry, Relay, Sink, Source};
    use crate::types::{FlowEdge, FlowNode};

    fn document() -> FlowDocument {
        let mut graph = FlowGraph::new();
        graph
            .add_node(FlowNode::new(Arc::new(Source::new("1: A")), (0.0, 0.0)).with_id("src"))
            .unwrap();
        graph
            .add_node(FlowNode::new(Arc::new(Relay::new()), (100.0, 0.0)).with_id("relay"))
            .unwrap();
        graph
            .add_node(FlowNode::new(Arc::new(Sink::new()), (200.0, 0.0)).with_id("sink"))
            .unwrap();
        graph.add_edge(FlowEdge::new("src", "relay", data_set())).unwrap();
        graph.add_edge(FlowEdge::new("relay", "sink", data_set())).unwrap();
        GroupOperations::group(&mut graph, &["relay".to_string()], "Solo", (60.0, 60.0), None).unwrap();
        FlowDocument::capture(&graph)
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(FlowFormat::from_path(Path::new("a/flow.kf")), FlowFormat::Binary);
        assert_eq!(FlowFormat::from_path(Path::new("flow.TOML")), FlowFormat::Toml);
        assert_eq!(FlowFormat::from_path(Path::new("flow.json")), FlowFormat::Json);
        assert_eq!(FlowFormat::from_path(Path::new("flow")), FlowFormat::Json);
    }

    #[test]
    fn test_binary_and_json_carry_same_document() {
        let doc = document();
        let binary = encode(&doc, FlowFormat::Binary).unwrap();
        assert!(binary.starts_with(BINARY_MAGIC));
        assert_eq!(decode(&binary).unwrap(), doc);

        let json = encode(&doc, FlowFormat::Json).unwrap();
        assert_eq!(FlowFormat::sniff(&json), FlowFormat::Json);
        assert_eq!(decode(&json).unwrap(), doc);
    }

    #[test]
    fn test_toml_is_read_only() {
        let err = encode(&document(), FlowFormat::Toml).unwrap_err();
        assert!(err.is_serialization());
    }

    #[test]
    fn test_read_toml_flow() {
        let text = r#"
version = 1
edges = []

[[nodes]]
id = "src"
position = [10.0, 20.0]

[nodes.body.component]
componentType = "test-source"
config = { name = "1: A", rows = 2 }

[[nodes]]
id = "sink"
position = [100, 20]
name = "Results"

[nodes.body.component]
componentType = "test-sink"
"#;
        let doc = decode(text.as_bytes()).unwrap();
        assert_eq!(doc.nodes.len(), 2);
        assert_eq!(doc.nodes[1].position, (100.0, 20.0));
        assert_eq!(doc.nodes[1].name.as_deref(), Some("Results"));

        let graph = doc.restore(&test_registry()).unwrap();
        assert_eq!(graph.node("src").unwrap().label(), "1: A");
    }

    #[test]
    fn test_corrupt_input_is_serialization_error() {
        let mut bytes = BINARY_MAGIC.to_vec();
        bytes.extend([0xff, 0xff, 0xff]);
        assert!(decode(&bytes).unwrap_err().is_serialization());
        assert!(decode(b"{ not json").unwrap_err().is_serialization());
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let doc = document();
        for name in ["flow.kf", "flow.json"] {
            let path = dir.path().join(name);
            write_document(&path, &doc).unwrap();
            assert_eq!(read_document(&path).unwrap(), doc);
        }
        assert!(read_document(&dir.path().join("missing.kf")).is_err());
    }
}
