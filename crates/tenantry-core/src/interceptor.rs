//! Command interception
//!
//! Every command bound for the store passes through a `CommandInterceptor`
//! before execution. The tenancy interceptor prepends a statement that
//! establishes the ambient tenant as session state on the server, so
//! partition defaults and row filters see it within the same round trip.
//!
//! The rewrite is a pure synchronous function of the command text and the
//! current tenant, so blocking and suspending call paths share it.

use std::borrow::Cow;

use tenantry_core_types::TenantId;

use crate::scope::TenantScope;

/// What the caller expects back from a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// Returns a result set
    Reader,
    /// Returns a single value
    Scalar,
    /// Returns an affected-row count
    NonQuery,
}

/// An outgoing command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command<'a> {
    pub text: Cow<'a, str>,
    pub kind: CommandKind,
}

impl<'a> Command<'a> {
    pub fn new(text: impl Into<Cow<'a, str>>, kind: CommandKind) -> Self {
        Self {
            text: text.into(),
            kind,
        }
    }
}

/// Produces the store-specific statement that sets session tenant state
///
/// The statement must yield no result rows and must end with a newline so
/// the original command text follows it verbatim.
pub trait SessionContextDialect: Send + Sync {
    fn name(&self) -> &'static str;

    fn set_context_statement(&self, tenant: TenantId) -> String;
}

/// PostgreSQL / Citus dialect
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    /// Session functions the Postgres dialect expects to exist on the server
    ///
    /// `SET LOCAL` scopes the value to the running transaction, so it never
    /// outlives the pooled connection's current use.
    pub const SESSION_FUNCTIONS_SQL: &'static str = r#"CREATE OR REPLACE FUNCTION set_tenant(tenant_id text) RETURNS void AS $$
BEGIN
    EXECUTE format('SET LOCAL tx.current_tenant_id = %L', tenant_id);
END
$$ LANGUAGE plpgsql;

CREATE OR REPLACE FUNCTION unset_tenant() RETURNS void AS $$
BEGIN
    SET LOCAL tx.current_tenant_id = '';
END
$$ LANGUAGE plpgsql;

CREATE OR REPLACE FUNCTION get_tenant() RETURNS text AS $$
BEGIN
    RETURN NULLIF(current_setting('tx.current_tenant_id', true), '');
END
$$ LANGUAGE plpgsql STABLE;
"#;
}

impl SessionContextDialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn set_context_statement(&self, tenant: TenantId) -> String {
        format!("DO $$ BEGIN PERFORM set_tenant('{}'); END $$;\n", tenant)
    }
}

/// Pre-execution hook for outgoing commands
///
/// Implementors provide `command_executing`; the per-kind hooks default to it.
pub trait CommandInterceptor: Send + Sync {
    fn command_executing<'a>(&self, command: Command<'a>) -> Command<'a>;

    fn reader_executing<'a>(&self, command: Command<'a>) -> Command<'a> {
        self.command_executing(command)
    }

    fn scalar_executing<'a>(&self, command: Command<'a>) -> Command<'a> {
        self.command_executing(command)
    }

    fn non_query_executing<'a>(&self, command: Command<'a>) -> Command<'a> {
        self.command_executing(command)
    }

    /// Dispatch to the hook matching the command's kind
    fn executing<'a>(&self, command: Command<'a>) -> Command<'a> {
        match command.kind {
            CommandKind::Reader => self.reader_executing(command),
            CommandKind::Scalar => self.scalar_executing(command),
            CommandKind::NonQuery => self.non_query_executing(command),
        }
    }
}

/// Prepends the dialect's set-context statement when a tenant is in scope
#[derive(Debug, Clone, Default)]
pub struct TenancyCommandInterceptor<D> {
    dialect: D,
}

impl<D: SessionContextDialect> TenancyCommandInterceptor<D> {
    pub fn new(dialect: D) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> &D {
        &self.dialect
    }

    /// Rewrite `text` for `tenant`; without a tenant the text is returned unchanged
    pub fn rewrite<'a>(&self, text: Cow<'a, str>, tenant: Option<TenantId>) -> Cow<'a, str> {
        match tenant {
            None => text,
            Some(tenant) => {
                let mut out = self.dialect.set_context_statement(tenant);
                out.push_str(&text);
                Cow::Owned(out)
            }
        }
    }
}

impl<D: SessionContextDialect> CommandInterceptor for TenancyCommandInterceptor<D> {
    fn command_executing<'a>(&self, command: Command<'a>) -> Command<'a> {
        let tenant = TenantScope::current_or_default();
        let tenant_field = tenant.map(|t| t.to_string());
        tracing::debug!(
            tenant_id = tenant_field.as_deref(),
            dialect = self.dialect.name(),
            kind = ?command.kind,
            "intercepting command"
        );
        Command {
            text: self.rewrite(command.text, tenant),
            kind: command.kind,
        }
    }
}
