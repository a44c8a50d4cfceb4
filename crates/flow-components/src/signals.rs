//! Signal kinds exchanged by the built-in components

use flow_engine::SignalKind;

pub const INSTANCE: &str = "instance";
pub const DATA_SET: &str = "dataSet";
pub const TEXT: &str = "text";

pub const INSTANCE_LISTENER: &str = "InstanceListener";
pub const DATA_SET_LISTENER: &str = "DataSetListener";
pub const TEXT_LISTENER: &str = "TextListener";

/// One record at a time
pub fn instance() -> SignalKind {
    SignalKind::new(INSTANCE, INSTANCE_LISTENER)
}

/// End of a batch, carrying the relation name and row count
pub fn data_set() -> SignalKind {
    SignalKind::new(DATA_SET, DATA_SET_LISTENER)
}

pub fn text() -> SignalKind {
    SignalKind::new(TEXT, TEXT_LISTENER)
}
