//! Execution orchestrator.
//!
//! A run discovers every `Startable` node (composite members included),
//! orders them by their label prefixes and launches them, either all at once
//! or one after another. While a run is active the workspace refuses
//! structural edits; `stop()` is cooperative and only asks components to
//! finish.
//!
//! # Label prefixes
//!
//! - `"1: Load"` launches at position 1 (ties keep discovery order)
//! - `"! : Load"` is never launched
//! - anything else launches after every numbered start point
//!
//! # Example
//!
//! ```ignore
//! let handle = workspace.run(true)?;
//! let summary = handle.wait().await?;
//! for (node_id, error) in &summary.failed {
//!     log::warn!("{} failed: {}", node_id, error);
//! }
//! ```

pub mod dispatch;
pub mod executor;
pub mod ordering;

pub use dispatch::{resolve_source, resolve_target, RunContext, Router};
pub use executor::{execute, RunHandle, RunPlan, RunState, RunSummary};
pub use ordering::{discover_start_points, order_start_points, parse_start_label, LaunchOrder, StartPoint};
