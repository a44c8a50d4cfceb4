//! Editor configuration storage
//!
//! Tunables shared by every workspace of a context. Persisted as
//! `editor.json` in the application data directory; a missing file means
//! defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::constants::defaults;

const CONFIG_FILE: &str = "editor.json";

/// Editor-wide settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Undo snapshots kept per workspace
    pub undo_limit: usize,
    /// Canvas footprint (width, height) used for hit testing and selection
    pub node_size: (f64, f64),
    /// zstd level for undo snapshots
    pub snapshot_compression_level: i32,
    /// Nested signal deliveries allowed before a signal is dropped
    pub max_dispatch_depth: usize,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            undo_limit: defaults::UNDO_LIMIT,
            node_size: defaults::NODE_SIZE,
            snapshot_compression_level: defaults::SNAPSHOT_COMPRESSION_LEVEL,
            max_dispatch_depth: defaults::MAX_DISPATCH_DEPTH,
        }
    }
}

impl EditorConfig {
    /// Load configuration from disk
    pub async fn load(dir: &Path) -> Result<Self, ConfigError> {
        let config_path = dir.join(CONFIG_FILE);

        if !config_path.exists() {
            log::debug!("No editor config at {:?}; using defaults", config_path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&config_path).await.map_err(ConfigError::Io)?;

        serde_json::from_str(&contents).map_err(ConfigError::Parse)
    }

    /// Save configuration to disk
    pub async fn save(&self, dir: &Path) -> Result<(), ConfigError> {
        // Ensure directory exists
        fs::create_dir_all(dir).await.map_err(ConfigError::Io)?;

        let config_path = dir.join(CONFIG_FILE);
        let contents = serde_json::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        fs::write(&config_path, contents).await.map_err(ConfigError::Io)?;

        log::info!("Editor configuration saved to {:?}", config_path);
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(serde_json::Error),
    #[error("Failed to serialize config: {0}")]
    Serialize(serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = EditorConfig::load(dir.path()).await.unwrap();
        assert_eq!(config, EditorConfig::default());
        assert_eq!(config.undo_limit, 20);
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let config = EditorConfig {
            undo_limit: 5,
            ..Default::default()
        };
        config.save(&dir.path().join("nested")).await.unwrap();
        let loaded = EditorConfig::load(&dir.path().join("nested")).await.unwrap();
        assert_eq!(loaded, config);
    }

    #[tokio::test]
    async fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), r#"{ "max_dispatch_depth": 8 }"#).unwrap();
        let loaded = EditorConfig::load(dir.path()).await.unwrap();
        assert_eq!(loaded.max_dispatch_depth, 8);
        assert_eq!(loaded.node_size, (60.0, 60.0));
    }

    #[tokio::test]
    async fn test_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "{").unwrap();
        assert!(matches!(
            EditorConfig::load(dir.path()).await,
            Err(ConfigError::Parse(_))
        ));
    }
}
