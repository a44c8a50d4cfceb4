//! Undo system using compressed snapshots
//!
//! Before every user mutation the workspace captures the whole graph as a
//! [`FlowDocument`], compresses it and pushes it here. Undo pops the most
//! recent snapshot and the workspace replaces its graph with it wholesale.
//! There is no redo; a successful undo simply pops.

use std::collections::VecDeque;

use crate::constants::defaults;
use crate::error::{FlowError, Result};
use crate::snapshot::FlowDocument;

/// A compressed, self-contained graph state
#[derive(Debug, Clone)]
pub struct Snapshot {
    bytes: Vec<u8>,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Bounded undo stack; the oldest snapshot is evicted first
pub struct UndoStack {
    /// Compressed graph states (zstd), oldest at the front
    snapshots: VecDeque<Snapshot>,
    /// Maximum number of snapshots to keep
    max_snapshots: usize,
    /// zstd compression level
    level: i32,
}

impl UndoStack {
    /// Create a new undo stack with the specified maximum size
    pub fn new(max_snapshots: usize, level: i32) -> Self {
        Self {
            snapshots: VecDeque::new(),
            max_snapshots: max_snapshots.max(1), // At least 1 snapshot
            level,
        }
    }

    /// Serialize and compress a document without touching the stack
    ///
    /// Split from [`push`](Self::push) so a mutation can capture its
    /// pre-state first and only record it once it succeeded.
    pub fn capture(&self, document: &FlowDocument) -> Result<Snapshot> {
        let json = serde_json::to_vec(document)?;
        let bytes = zstd::encode_all(&json[..], self.level)
            .map_err(|e| FlowError::Compression(e.to_string()))?;
        Ok(Snapshot { bytes })
    }

    /// Push a captured snapshot, evicting the oldest past the limit
    pub fn push(&mut self, snapshot: Snapshot) {
        self.snapshots.push_back(snapshot);
        while self.snapshots.len() > self.max_snapshots {
            self.snapshots.pop_front();
        }
    }

    /// Capture and push in one step
    pub fn push_document(&mut self, document: &FlowDocument) -> Result<()> {
        let snapshot = self.capture(document)?;
        self.push(snapshot);
        Ok(())
    }

    /// Pop the most recent snapshot
    ///
    /// Returns None when there is nothing to undo. A snapshot that fails to
    /// decode is still consumed.
    pub fn pop(&mut self) -> Option<Result<FlowDocument>> {
        self.snapshots.pop_back().map(|s| Self::decompress(&s))
    }

    /// Check if undo is available
    pub fn can_undo(&self) -> bool {
        !self.snapshots.is_empty()
    }

    /// Get the number of snapshots
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Check if the stack is empty
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn max_snapshots(&self) -> usize {
        self.max_snapshots
    }

    /// Clear all snapshots
    pub fn clear(&mut self) {
        self.snapshots.clear();
    }

    /// Get the total compressed size of all snapshots
    pub fn memory_usage(&self) -> usize {
        self.snapshots.iter().map(|s| s.len()).sum()
    }

    fn decompress(snapshot: &Snapshot) -> Result<FlowDocument> {
        let json = zstd::decode_all(&snapshot.bytes[..])
            .map_err(|e| FlowError::Compression(e.to_string()))?;
        Ok(serde_json::from_slice(&json)?)
    }
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::new(defaults::UNDO_LIMIT, defaults::SNAPSHOT_COMPRESSION_LEVEL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{ComponentRecord, NodeRecord, NodeRecordBody};

    fn document(marker: usize) -> FlowDocument {
        let mut doc = FlowDocument::empty();
        doc.nodes.push(NodeRecord {
            id: format!("node-{}", marker),
            position: (marker as f64, 0.0),
            name: None,
            body: NodeRecordBody::Component(ComponentRecord {
                component_type: "test-sink".to_string(),
                config: serde_json::Value::Null,
            }),
        });
        doc
    }

    #[test]
    fn test_push_and_pop() {
        let mut stack = UndoStack::default();
        assert!(!stack.can_undo());

        stack.push_document(&document(1)).unwrap();
        stack.push_document(&document(2)).unwrap();
        assert_eq!(stack.len(), 2);

        assert_eq!(stack.pop().unwrap().unwrap(), document(2));
        assert_eq!(stack.pop().unwrap().unwrap(), document(1));
        assert!(stack.pop().is_none());
    }

    #[test]
    fn test_oldest_snapshot_evicted() {
        let mut stack = UndoStack::default();
        for i in 0..21 {
            stack.push_document(&document(i)).unwrap();
        }
        assert_eq!(stack.len(), 20);

        let mut last = None;
        while let Some(doc) = stack.pop() {
            last = Some(doc.unwrap());
        }
        // Snapshot 0 was evicted by the 21st push
        assert_eq!(last, Some(document(1)));
    }

    #[test]
    fn test_capture_does_not_push() {
        let mut stack = UndoStack::new(3, 1);
        let snapshot = stack.capture(&document(7)).unwrap();
        assert!(stack.is_empty());
        assert!(!snapshot.is_empty());
        stack.push(snapshot);
        assert_eq!(stack.len(), 1);
        assert!(stack.memory_usage() > 0);
    }

    #[test]
    fn test_minimum_capacity_and_clear() {
        let mut stack = UndoStack::new(0, 3);
        assert_eq!(stack.max_snapshots(), 1);
        stack.push_document(&document(1)).unwrap();
        stack.push_document(&document(2)).unwrap();
        assert_eq!(stack.len(), 1);
        stack.clear();
        assert!(!stack.can_undo());
    }
}
