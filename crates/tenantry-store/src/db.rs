//! Database connection management
//!
//! Provides utilities for opening and configuring SQLite connections

use std::path::Path;
use std::time::Duration;

use rusqlite::Connection;

use crate::config::StoreConfig;
use crate::errors::{from_rusqlite, Result};

/// Open a SQLite database at the given path
pub fn open<P: AsRef<Path>>(path: P) -> Result<Connection> {
    Connection::open(path).map_err(from_rusqlite)
}

/// Open an in-memory SQLite database (for testing)
pub fn open_in_memory() -> Result<Connection> {
    Connection::open_in_memory().map_err(from_rusqlite)
}

/// Open and configure the database described by `config`
pub fn open_with(config: &StoreConfig) -> Result<Connection> {
    let conn = match &config.database_path {
        Some(path) => open(path)?,
        None => open_in_memory()?,
    };
    configure(&conn, config)?;
    Ok(conn)
}

/// Apply connection settings from `config`
pub fn configure(conn: &Connection, config: &StoreConfig) -> Result<()> {
    conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))
        .map_err(from_rusqlite)?;

    conn.pragma_update(None, "foreign_keys", config.foreign_keys)
        .map_err(from_rusqlite)?;

    // journal_mode answers with the resulting mode; in-memory databases stay "memory"
    if config.journal_mode_wal && config.database_path.is_some() {
        let mode: String = conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
            .map_err(from_rusqlite)?;
        tracing::debug!(journal_mode = %mode, "journal mode set");
    }

    Ok(())
}
