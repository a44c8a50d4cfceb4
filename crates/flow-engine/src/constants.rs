//! Engine-wide constants
//!
//! Single source of truth for defaults and well-known keys.

/// Environment key holding the directory of the last loaded/saved flow file
pub const FLOW_DIRECTORY_KEY: &str = "Internal.flow.directory";

/// Default values for editor configuration
pub mod defaults {
    /// Maximum undo snapshots kept per workspace
    pub const UNDO_LIMIT: usize = 20;
    /// Canvas footprint of a node (width, height)
    pub const NODE_SIZE: (f64, f64) = (60.0, 60.0);
    /// zstd level for undo snapshots
    pub const SNAPSHOT_COMPRESSION_LEVEL: i32 = 3;
    /// Nested signal deliveries allowed before dropping
    pub const MAX_DISPATCH_DEPTH: usize = 64;
}

/// Persisted flow formats
pub mod formats {
    /// Leading bytes of the compact binary form
    pub const BINARY_MAGIC: &[u8; 4] = b"KFLW";
    /// Current document schema version
    pub const DOCUMENT_VERSION: u32 = 1;
    /// File extension of the compact binary form
    pub const BINARY_EXTENSION: &str = "kf";
    /// File extension of the canonical text form
    pub const JSON_EXTENSION: &str = "json";
    /// File extension of the alternative (read-only) text form
    pub const TOML_EXTENSION: &str = "toml";
}
