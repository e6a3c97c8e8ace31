//! Tenant-aware SQLite connection
//!
//! Every command goes through the connection's `CommandInterceptor` before
//! it reaches SQLite. The (possibly rewritten) text may hold several
//! statements; all but the last run without parameters, the last one binds
//! the caller's parameters and produces the caller's result.

use std::sync::Arc;

use rusqlite::{Batch, Connection, Params, Statement, Transaction, TransactionBehavior};
use tenantry_core::errors::{ExError, ExErrorKind};
use tenantry_core::interceptor::{Command, CommandInterceptor, CommandKind, TenancyCommandInterceptor};

use crate::config::StoreConfig;
use crate::db;
use crate::errors::{from_rusqlite, Result};
use crate::session::{self, SessionSlot, SqliteDialect};

pub struct TenantConnection {
    conn: Connection,
    session: SessionSlot,
    interceptor: Arc<dyn CommandInterceptor>,
}

impl TenantConnection {
    /// Open a connection with the tenancy interceptor for SQLite
    pub fn open(config: &StoreConfig) -> Result<Self> {
        Self::with_interceptor(
            db::open_with(config)?,
            Arc::new(TenancyCommandInterceptor::new(SqliteDialect)),
        )
    }

    /// Wrap an already configured connection
    pub fn with_interceptor(
        conn: Connection,
        interceptor: Arc<dyn CommandInterceptor>,
    ) -> Result<Self> {
        let session = session::install(&conn)?;
        Ok(Self {
            conn,
            session,
            interceptor,
        })
    }

    /// Session tenant currently visible to `get_tenant()`
    ///
    /// Always `None` between commands.
    pub fn session_tenant(&self) -> Option<String> {
        self.session.current()
    }

    /// Run a command that returns an affected-row count
    pub fn execute<P: Params>(&self, sql: &str, params: P) -> Result<usize> {
        self.run(CommandKind::NonQuery, sql, |stmt| stmt.execute(params))
    }

    /// Run a command that returns at most one value
    pub fn query_scalar<T, P>(&self, sql: &str, params: P) -> Result<Option<T>>
    where
        T: rusqlite::types::FromSql,
        P: Params,
    {
        self.run(CommandKind::Scalar, sql, |stmt| {
            let mut rows = stmt.query(params)?;
            match rows.next()? {
                Some(row) => row.get(0).map(Some),
                None => Ok(None),
            }
        })
    }

    /// Run a command that returns rows, mapping each with `f`
    pub fn query_rows<T, P, F>(&self, sql: &str, params: P, mut f: F) -> Result<Vec<T>>
    where
        P: Params,
        F: FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
    {
        self.run(CommandKind::Reader, sql, |stmt| {
            let mut rows = stmt.query(params)?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                out.push(f(row)?);
            }
            Ok(out)
        })
    }

    /// Run `f` inside one immediate transaction
    ///
    /// Commits when `f` succeeds; any error rolls everything back.
    pub fn transaction<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&Self) -> Result<T>,
    {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)
            .map_err(from_rusqlite)?;
        // Dropping `tx` on the error path rolls back
        let out = f(self)?;
        tx.commit().map_err(from_rusqlite)?;
        Ok(out)
    }

    fn run<T, F>(&self, kind: CommandKind, sql: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut Statement<'_>) -> rusqlite::Result<T>,
    {
        let command = self.interceptor.executing(Command::new(sql, kind));
        tracing::trace!(kind = ?kind, sql = %command.text, "executing command");

        let result = self.run_batch(&command.text, f);
        self.session.reset();
        result
    }

    fn run_batch<T, F>(&self, text: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut Statement<'_>) -> rusqlite::Result<T>,
    {
        let mut batch = Batch::new(&self.conn, text);
        let mut statements = Vec::new();
        while let Some(stmt) = batch.next().map_err(from_rusqlite)? {
            statements.push(stmt);
        }

        let Some(mut last) = statements.pop() else {
            return Err(ExError::new(ExErrorKind::InvalidInput)
                .with_op("execute")
                .with_message("command text holds no statement"));
        };
        for mut stmt in statements {
            stmt.execute([]).map_err(from_rusqlite)?;
        }
        f(&mut last).map_err(from_rusqlite)
    }
}
