//! Processing components
//!
//! Listeners that transform records in flight and re-emit them.

mod row_filter;

pub use row_filter::{RowFilter, RowFilterConfig};
