//! Input components
//!
//! Start points that load records into a flow.

mod record_source;

pub use record_source::{RecordSource, RecordSourceConfig};
