//! Store configuration
//!
//! Loaded from TOML; every field has a default so an empty document is a
//! valid in-memory configuration.
//!
//! ```toml
//! database_path = "data/tenants.db"
//! busy_timeout_ms = 5000
//! journal_mode_wal = true
//! foreign_keys = true
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{config_error, io_error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Database file; `None` opens a private in-memory database
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// How long a connection waits on a locked database
    #[serde(default = "StoreConfig::default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Use write-ahead logging (file databases only)
    #[serde(default = "StoreConfig::default_journal_mode_wal")]
    pub journal_mode_wal: bool,

    /// Enforce declared foreign keys
    #[serde(default = "StoreConfig::default_foreign_keys")]
    pub foreign_keys: bool,
}

impl StoreConfig {
    fn default_busy_timeout_ms() -> u64 {
        5000
    }

    fn default_journal_mode_wal() -> bool {
        true
    }

    fn default_foreign_keys() -> bool {
        true
    }

    /// Configuration for a database file at `path`
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| config_error(format!("invalid store config: {}", e)))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| io_error("store_config_read", e))?;
        Self::from_toml_str(&text)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            busy_timeout_ms: Self::default_busy_timeout_ms(),
            journal_mode_wal: Self::default_journal_mode_wal(),
            foreign_keys: Self::default_foreign_keys(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tenantry_core::errors::ExErrorKind;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = StoreConfig::from_toml_str("").unwrap();
        assert_eq!(config, StoreConfig::default());
        assert_eq!(config.busy_timeout_ms, 5000);
        assert!(config.journal_mode_wal);
        assert!(config.foreign_keys);
        assert!(config.database_path.is_none());
    }

    #[test]
    fn test_partial_document() {
        let config = StoreConfig::from_toml_str(
            r#"
            database_path = "data/tenants.db"
            busy_timeout_ms = 250
            "#,
        )
        .unwrap();
        assert_eq!(config.database_path, Some(PathBuf::from("data/tenants.db")));
        assert_eq!(config.busy_timeout_ms, 250);
        assert!(config.journal_mode_wal);
    }

    #[test]
    fn test_invalid_document_is_invalid_input() {
        let err = StoreConfig::from_toml_str("busy_timeout_ms = \"soon\"").unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::InvalidInput);
    }

    #[test]
    fn test_missing_file_is_io() {
        let err = StoreConfig::from_file("/definitely/not/here.toml").unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::Io);
    }
}
