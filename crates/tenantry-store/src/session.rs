//! Session tenant state on SQLite
//!
//! SQLite has no server-side session variables, so each connection gets two
//! application-defined functions backed by a per-connection slot:
//!
//! - `set_tenant(text)` stores its argument and returns it
//! - `get_tenant()` returns the stored value, or NULL
//!
//! The dialect's set-context statement is an `UPDATE` of a one-row temp
//! table that calls `set_tenant`, so it yields no result rows. The owning
//! connection resets the slot after every command, which gives the same
//! lifetime as `SET LOCAL` under autocommit.

use std::sync::{Arc, Mutex};

use rusqlite::functions::FunctionFlags;
use rusqlite::Connection;
use tenantry_core::interceptor::SessionContextDialect;
use tenantry_core::TenantId;

use crate::errors::{from_rusqlite, Result};

/// SQLite dialect for the set-context statement
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl SessionContextDialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn set_context_statement(&self, tenant: TenantId) -> String {
        format!(
            "UPDATE temp.tenantry_session SET tenant_id = set_tenant('{}');\n",
            tenant
        )
    }
}

/// Per-connection session tenant slot
#[derive(Debug, Clone, Default)]
pub struct SessionSlot {
    value: Arc<Mutex<Option<String>>>,
}

impl SessionSlot {
    /// Value last stored by `set_tenant`
    pub fn current(&self) -> Option<String> {
        self.value.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn reset(&self) {
        self.store(None);
    }

    fn store(&self, value: Option<String>) {
        if let Ok(mut slot) = self.value.lock() {
            *slot = value;
        }
    }
}

/// Register the session functions and the session table on `conn`
pub fn install(conn: &Connection) -> Result<SessionSlot> {
    let slot = SessionSlot::default();

    let setter = slot.clone();
    conn.create_scalar_function("set_tenant", 1, FunctionFlags::SQLITE_UTF8, move |ctx| {
        let value: Option<String> = ctx.get(0)?;
        setter.store(value.clone());
        Ok(value)
    })
    .map_err(from_rusqlite)?;

    // Innocuous so it may appear in column DEFAULT expressions
    let getter = slot.clone();
    conn.create_scalar_function(
        "get_tenant",
        0,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_INNOCUOUS,
        move |_ctx| Ok(getter.current()),
    )
    .map_err(from_rusqlite)?;

    conn.execute_batch(
        "CREATE TEMP TABLE IF NOT EXISTS tenantry_session (tenant_id TEXT);
         INSERT INTO temp.tenantry_session (tenant_id)
             SELECT NULL WHERE NOT EXISTS (SELECT 1 FROM temp.tenantry_session);",
    )
    .map_err(from_rusqlite)?;

    Ok(slot)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_context_statement_returns_no_rows() {
        let conn = Connection::open_in_memory().unwrap();
        let slot = install(&conn).unwrap();
        let tenant = TenantId::generate();

        let changed = conn
            .execute(SqliteDialect.set_context_statement(tenant).trim_end(), [])
            .unwrap();
        assert_eq!(changed, 1);
        assert_eq!(slot.current(), Some(tenant.to_string()));

        let seen: Option<String> = conn
            .query_row("SELECT get_tenant()", [], |row| row.get(0))
            .unwrap();
        assert_eq!(seen, Some(tenant.to_string()));
    }

    #[test]
    fn test_reset_clears_session() {
        let conn = Connection::open_in_memory().unwrap();
        let slot = install(&conn).unwrap();
        conn.execute("UPDATE temp.tenantry_session SET tenant_id = set_tenant('x')", [])
            .unwrap();

        slot.reset();
        let seen: Option<String> = conn
            .query_row("SELECT get_tenant()", [], |row| row.get(0))
            .unwrap();
        assert_eq!(seen, None);
    }

    #[test]
    fn test_install_is_idempotent_for_session_table() {
        let conn = Connection::open_in_memory().unwrap();
        install(&conn).unwrap();
        install(&conn).unwrap();
        let rows: i64 = conn
            .query_row("SELECT count(*) FROM temp.tenantry_session", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }
}
