//! Table DDL generated from entity declarations
//!
//! For bootstrapping test and scratch databases. Session-defaulted columns
//! get `DEFAULT (get_tenant())`. Foreign keys are emitted only when they
//! reference the principal's full primary key (SQLite's requirement) and are
//! deferred to commit, so a cascade's null-outs and the triggering delete can
//! be written in any order inside one transaction.

use tenantry_core::model::{ColumnDefault, ColumnKind, EntityType, Schema};

use crate::codec::quote;
use crate::connection::TenantConnection;
use crate::errors::Result;

fn sql_type(kind: ColumnKind) -> &'static str {
    match kind {
        ColumnKind::Bool | ColumnKind::Integer => "INTEGER",
        ColumnKind::Text | ColumnKind::Uuid => "TEXT",
    }
}

/// `CREATE TABLE` statement for `entity`
pub fn create_table_sql(entity: &EntityType, schema: &Schema) -> String {
    let mut lines: Vec<String> = entity
        .columns()
        .iter()
        .map(|c| {
            let mut line = format!("{} {}", quote(&c.name), sql_type(c.kind));
            if !c.nullable {
                line.push_str(" NOT NULL");
            }
            if c.default == ColumnDefault::SessionTenant {
                line.push_str(" DEFAULT (get_tenant())");
            }
            line
        })
        .collect();

    lines.push(format!(
        "PRIMARY KEY ({})",
        entity
            .primary_key()
            .iter()
            .map(|c| quote(c))
            .collect::<Vec<_>>()
            .join(", ")
    ));

    for fk in entity.foreign_keys() {
        let references_key = schema
            .entity(&fk.principal)
            .map(|p| p.primary_key() == fk.principal_columns.as_slice())
            .unwrap_or(false);
        if !references_key {
            continue;
        }
        let cols = |names: &[String]| names.iter().map(|c| quote(c)).collect::<Vec<_>>().join(", ");
        lines.push(format!(
            "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) DEFERRABLE INITIALLY DEFERRED",
            quote(&fk.name),
            cols(&fk.dependent_columns),
            quote(&fk.principal),
            cols(&fk.principal_columns)
        ));
    }

    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
        quote(entity.name()),
        lines.join(",\n    ")
    )
}

/// Create every table of `schema`, in registration order
pub fn create_tables(conn: &TenantConnection, schema: &Schema) -> Result<()> {
    for entity in schema.entities() {
        conn.execute(&create_table_sql(entity, schema), [])?;
        tracing::debug!(entity = entity.name(), "table ensured");
    }
    Ok(())
}
