//! SQLite repository for entity rows
//!
//! Generic over `EntityType`: statements are built from the declared columns
//! and primary key, and every statement runs through `TenantConnection`, so
//! the session tenant is established for each one.

use rusqlite::types::ToSql;
use tenantry_core::cascade::DependentSource;
use tenantry_core::errors::{ExError, ExErrorKind, ExResult};
use tenantry_core::model::{ColumnDefault, EntityKey, EntityType, Row, Value};

use crate::codec::{decode_row, quote, SqlValue};
use crate::connection::TenantConnection;
use crate::errors::{row_missing, Result};

/// SQLite repository for entity rows
pub struct SqliteRepo;

impl SqliteRepo {
    /// Insert a row
    ///
    /// Session-defaulted columns left null are omitted so the store fills
    /// them from `get_tenant()`. Their stored values are returned.
    pub fn insert(conn: &TenantConnection, entity: &EntityType, row: &Row) -> Result<Row> {
        let (provided, generated): (Vec<_>, Vec<_>) = entity.columns().iter().partition(|c| {
            !(c.default == ColumnDefault::SessionTenant && row.get(&c.name).is_null())
        });

        let names: Vec<String> = provided.iter().map(|c| quote(&c.name)).collect();
        let slots: Vec<String> = (1..=provided.len()).map(|i| format!("?{}", i)).collect();
        let values: Vec<SqlValue<'_>> = provided.iter().map(|c| SqlValue(row.get(&c.name))).collect();
        let params: Vec<&dyn ToSql> = values.iter().map(|v| v as &dyn ToSql).collect();

        let mut sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote(entity.name()),
            names.join(", "),
            slots.join(", ")
        );

        if generated.is_empty() {
            conn.execute(&sql, params.as_slice())?;
            return Ok(Row::new());
        }

        let returned: Vec<&str> = generated.iter().map(|c| c.name.as_str()).collect();
        sql.push_str(" RETURNING ");
        sql.push_str(
            &returned
                .iter()
                .map(|c| quote(c))
                .collect::<Vec<_>>()
                .join(", "),
        );

        let mut rows = conn.query_rows(&sql, params.as_slice(), |r| {
            Ok(decode_row(entity, &returned, r))
        })?;
        match rows.pop() {
            Some(decoded) => decoded,
            None => Err(row_missing("insert", entity.name(), "<new>")),
        }
    }

    /// Write every non-key column of `row`, matched by primary key
    pub fn update(conn: &TenantConnection, entity: &EntityType, row: &Row) -> Result<()> {
        let columns: Vec<&str> = entity
            .columns()
            .iter()
            .map(|c| c.name.as_str())
            .filter(|c| !entity.is_key_column(c))
            .collect();
        if columns.is_empty() {
            return Ok(());
        }

        let sets: Vec<String> = columns
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{} = ?{}", quote(c), i + 1))
            .collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE {}",
            quote(entity.name()),
            sets.join(", "),
            key_predicate(entity, columns.len())
        );

        let key = entity.key_of(row);
        let mut values: Vec<SqlValue<'_>> = columns.iter().map(|c| SqlValue(row.get(c))).collect();
        values.extend(key.values().iter().map(SqlValue));
        let params: Vec<&dyn ToSql> = values.iter().map(|v| v as &dyn ToSql).collect();

        let changed = conn.execute(&sql, params.as_slice())?;
        if changed == 0 {
            return Err(row_missing("update", entity.name(), &key.to_string()));
        }
        Ok(())
    }

    /// Delete the row with `key`
    pub fn delete(conn: &TenantConnection, entity: &EntityType, key: &EntityKey) -> Result<()> {
        entity.check_key(key)?;
        let sql = format!(
            "DELETE FROM {} WHERE {}",
            quote(entity.name()),
            key_predicate(entity, 0)
        );
        let values: Vec<SqlValue<'_>> = key.values().iter().map(SqlValue).collect();
        let params: Vec<&dyn ToSql> = values.iter().map(|v| v as &dyn ToSql).collect();

        let changed = conn.execute(&sql, params.as_slice())?;
        if changed == 0 {
            return Err(row_missing("delete", entity.name(), &key.to_string()));
        }
        Ok(())
    }

    /// Load the row with `key`
    pub fn find(conn: &TenantConnection, entity: &EntityType, key: &EntityKey) -> Result<Option<Row>> {
        entity.check_key(key)?;
        let columns = column_names(entity);
        let sql = format!(
            "{} WHERE {}",
            select_sql(entity, &columns),
            key_predicate(entity, 0)
        );
        let values: Vec<SqlValue<'_>> = key.values().iter().map(SqlValue).collect();
        let params: Vec<&dyn ToSql> = values.iter().map(|v| v as &dyn ToSql).collect();

        let mut rows = conn.query_rows(&sql, params.as_slice(), |r| {
            Ok(decode_row(entity, &columns, r))
        })?;
        rows.pop().transpose()
    }

    /// Every row of `entity`
    ///
    /// No predicate is applied; callers filter in process.
    pub fn fetch_all(conn: &TenantConnection, entity: &EntityType) -> Result<Vec<Row>> {
        let columns = column_names(entity);
        let sql = select_sql(entity, &columns);
        conn.query_rows(&sql, [], |r| Ok(decode_row(entity, &columns, r)))?
            .into_iter()
            .collect()
    }

    /// Rows of `entity` belonging to the session tenant
    ///
    /// Filters the session-defaulted partition column against `get_tenant()`
    /// inside the store, so the command must run with a tenant in scope.
    /// Without one `get_tenant()` is NULL and nothing matches.
    pub fn fetch_for_session_tenant(conn: &TenantConnection, entity: &EntityType) -> Result<Vec<Row>> {
        let partition = entity
            .columns()
            .iter()
            .find(|c| c.default == ColumnDefault::SessionTenant)
            .ok_or_else(|| {
                ExError::new(ExErrorKind::InvalidInput)
                    .with_op("fetch_for_session_tenant")
                    .with_entity(entity.name().to_string())
                    .with_message("entity has no session tenant column")
            })?;

        let columns = column_names(entity);
        let sql = format!(
            "{} WHERE {} = get_tenant()",
            select_sql(entity, &columns),
            quote(&partition.name)
        );
        conn.query_rows(&sql, [], |r| Ok(decode_row(entity, &columns, r)))?
            .into_iter()
            .collect()
    }

    pub fn count(conn: &TenantConnection, entity: &EntityType) -> Result<i64> {
        let sql = format!("SELECT count(*) FROM {}", quote(entity.name()));
        Ok(conn.query_scalar(&sql, [])?.unwrap_or(0))
    }
}

fn column_names(entity: &EntityType) -> Vec<&str> {
    entity.columns().iter().map(|c| c.name.as_str()).collect()
}

fn select_sql(entity: &EntityType, columns: &[&str]) -> String {
    format!(
        "SELECT {} FROM {}",
        columns.iter().map(|c| quote(c)).collect::<Vec<_>>().join(", "),
        quote(entity.name())
    )
}

/// `"k1" = ?n AND "k2" = ?n+1 ...`, numbering after `offset` earlier parameters
fn key_predicate(entity: &EntityType, offset: usize) -> String {
    entity
        .primary_key()
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{} = ?{}", quote(c), offset + i + 1))
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// `DependentSource` over a tenant connection, for the cascade fallback scan
pub struct RepoSource<'a> {
    conn: &'a TenantConnection,
}

impl<'a> RepoSource<'a> {
    pub fn new(conn: &'a TenantConnection) -> Self {
        Self { conn }
    }
}

impl DependentSource for RepoSource<'_> {
    fn fetch_all(&mut self, entity: &EntityType) -> ExResult<Vec<Row>> {
        SqliteRepo::fetch_all(self.conn, entity)
    }
}

/// Convenience for building a key from values
pub fn key<I, V>(values: I) -> EntityKey
where
    I: IntoIterator<Item = V>,
    V: Into<Value>,
{
    EntityKey::new(values.into_iter().map(Into::into).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::ddl;
    use tenantry_core::model::{ColumnKind, Schema};
    use tenantry_core::{TenantId, TenantScope};
    use uuid::Uuid;

    fn setup() -> (TenantConnection, Schema) {
        let schema = Schema::builder(1)
            .entity(
                EntityType::builder("vehicles")
                    .tenant_column("dealership_id")
                    .column("id", ColumnKind::Uuid)
                    .nullable_column("make", ColumnKind::Text)
                    .column("in_stock", ColumnKind::Bool)
                    .primary_key(&["dealership_id", "id"])
                    .build(),
            )
            .build()
            .unwrap();
        let conn = TenantConnection::open(&StoreConfig::in_memory()).unwrap();
        ddl::create_tables(&conn, &schema).unwrap();
        (conn, schema)
    }

    #[test]
    fn test_insert_fills_tenant_from_session() {
        let (conn, schema) = setup();
        let vehicles = schema.entity("vehicles").unwrap();
        let tenant = TenantId::generate();
        let id = Uuid::new_v4();

        let generated = TenantScope::with(tenant, || {
            SqliteRepo::insert(
                &conn,
                vehicles,
                &Row::new().with("id", id).with("in_stock", true),
            )
        })
        .unwrap();

        assert_eq!(generated.get("dealership_id"), &Value::from(tenant));
        let stored = SqliteRepo::find(&conn, vehicles, &key([Value::from(tenant), Value::from(id)]))
            .unwrap()
            .expect("row should exist");
        assert_eq!(stored.get("in_stock"), &Value::Bool(true));
        assert!(stored.get("make").is_null());
    }

    #[test]
    fn test_insert_without_tenant_violates_not_null() {
        let (conn, schema) = setup();
        let vehicles = schema.entity("vehicles").unwrap();
        let err = SqliteRepo::insert(
            &conn,
            vehicles,
            &Row::new().with("id", Uuid::new_v4()).with("in_stock", false),
        )
        .unwrap_err();
        assert_eq!(err.code(), "ERR_PERSISTENCE");
    }

    #[test]
    fn test_update_delete_and_count() {
        let (conn, schema) = setup();
        let vehicles = schema.entity("vehicles").unwrap();
        let (tenant, id) = (Uuid::new_v4(), Uuid::new_v4());
        let row = Row::new()
            .with("dealership_id", tenant)
            .with("id", id)
            .with("make", "Saab")
            .with("in_stock", true);

        SqliteRepo::insert(&conn, vehicles, &row).unwrap();
        SqliteRepo::update(&conn, vehicles, &row.clone().with("make", "Volvo")).unwrap();

        let k = key([tenant, id]);
        let stored = SqliteRepo::find(&conn, vehicles, &k).unwrap().unwrap();
        assert_eq!(stored.get("make").as_text(), Some("Volvo"));
        assert_eq!(SqliteRepo::count(&conn, vehicles).unwrap(), 1);

        SqliteRepo::delete(&conn, vehicles, &k).unwrap();
        assert_eq!(SqliteRepo::count(&conn, vehicles).unwrap(), 0);

        let again = SqliteRepo::delete(&conn, vehicles, &k).unwrap_err();
        assert_eq!(again.code(), "ERR_CONCURRENCY");
    }

    #[test]
    fn test_fetch_for_session_tenant_filters_in_store() {
        // GIVEN rows of two tenants in one table
        let (conn, schema) = setup();
        let vehicles = schema.entity("vehicles").unwrap();
        let (a, b) = (TenantId::generate(), TenantId::generate());
        for (tenant, n) in [(a, 2), (b, 3)] {
            TenantScope::with(tenant, || {
                for _ in 0..n {
                    SqliteRepo::insert(
                        &conn,
                        vehicles,
                        &Row::new().with("id", Uuid::new_v4()).with("in_stock", true),
                    )
                    .unwrap();
                }
            });
        }

        // WHEN each tenant reads through the session filter
        let seen_a = TenantScope::with(a, || SqliteRepo::fetch_for_session_tenant(&conn, vehicles)).unwrap();
        let seen_b = TenantScope::with(b, || SqliteRepo::fetch_for_session_tenant(&conn, vehicles)).unwrap();

        // THEN only its own rows come back, and none without a tenant
        assert_eq!(seen_a.len(), 2);
        assert!(seen_a.iter().all(|r| r.get("dealership_id") == &Value::from(a)));
        assert_eq!(seen_b.len(), 3);
        assert!(seen_b.iter().all(|r| r.get("dealership_id") == &Value::from(b)));
        assert!(SqliteRepo::fetch_for_session_tenant(&conn, vehicles).unwrap().is_empty());
    }

    #[test]
    fn test_fetch_for_session_tenant_requires_tenant_column() {
        let conn = TenantConnection::open(&StoreConfig::in_memory()).unwrap();
        let notes = EntityType::builder("notes")
            .column("id", ColumnKind::Uuid)
            .primary_key(&["id"])
            .build();
        let err = SqliteRepo::fetch_for_session_tenant(&conn, &notes).unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::InvalidInput);
    }

    #[test]
    fn test_fetch_all_is_unfiltered() {
        let (conn, schema) = setup();
        let vehicles = schema.entity("vehicles").unwrap();
        for tenant in [TenantId::generate(), TenantId::generate()] {
            TenantScope::with(tenant, || {
                SqliteRepo::insert(
                    &conn,
                    vehicles,
                    &Row::new().with("id", Uuid::new_v4()).with("in_stock", true),
                )
            })
            .unwrap();
        }

        let all = SqliteRepo::fetch_all(&conn, vehicles).unwrap();
        assert_eq!(all.len(), 2);
        assert_ne!(all[0].get("dealership_id"), all[1].get("dealership_id"));
    }
}
