//! Output components
//!
//! Listeners that collect results for display.

mod text_collector;

pub use text_collector::{TextCollector, TextCollectorConfig};
