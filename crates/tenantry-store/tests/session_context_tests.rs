#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use tempfile::TempDir;
use tenantry_core::interceptor::{Command, CommandInterceptor};
use tenantry_core::model::{ColumnKind, EntityType, Row, Schema, Value};
use tenantry_core::{TenantId, TenantScope};
use tenantry_store::{ddl, SqliteRepo, StoreConfig, TenantConnection};
use uuid::Uuid;

fn schema() -> Schema {
    Schema::builder(1)
        .entity(
            EntityType::builder("customers")
                .tenant_column("dealership_id")
                .column("id", ColumnKind::Uuid)
                .column("name", ColumnKind::Text)
                .primary_key(&["dealership_id", "id"])
                .build(),
        )
        .build()
        .expect("schema should be valid")
}

fn file_config(dir: &TempDir) -> StoreConfig {
    StoreConfig::file(dir.path().join("tenants.db"))
}

/// Records every command it sees and forwards it unchanged
#[derive(Default)]
struct Recorder {
    seen: std::sync::Mutex<Vec<String>>,
}

impl CommandInterceptor for Recorder {
    fn command_executing<'a>(&self, command: Command<'a>) -> Command<'a> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(command.text.to_string());
        }
        command
    }
}

#[test]
fn test_concurrent_threads_fill_their_own_tenant() {
    // GIVEN a file database shared by two connections
    let dir = TempDir::new().unwrap();
    let config = file_config(&dir);
    let schema = Arc::new(schema());
    {
        let conn = TenantConnection::open(&config).unwrap();
        ddl::create_tables(&conn, &schema).unwrap();
    }

    let (a, b) = (TenantId::generate(), TenantId::generate());

    // WHEN each thread inserts rows without setting the partition column
    let handles: Vec<_> = [a, b]
        .into_iter()
        .map(|tenant| {
            let config = config.clone();
            let schema = schema.clone();
            std::thread::spawn(move || {
                let _guard = TenantScope::begin(tenant);
                let conn = TenantConnection::open(&config).unwrap();
                let customers = schema.entity("customers").unwrap();
                let mut ids = Vec::new();
                for i in 0..10 {
                    let id = Uuid::new_v4();
                    SqliteRepo::insert(
                        &conn,
                        customers,
                        &Row::new().with("id", id).with("name", format!("customer {}", i)),
                    )
                    .unwrap();
                    ids.push(id);
                }
                ids
            })
        })
        .collect();
    let ids: Vec<Vec<Uuid>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    // THEN every row carries the tenant of the thread that wrote it
    let conn = TenantConnection::open(&config).unwrap();
    let rows = SqliteRepo::fetch_all(&conn, schema.entity("customers").unwrap()).unwrap();
    assert_eq!(rows.len(), 20);
    for row in rows {
        let id = row.get("id").as_uuid().unwrap();
        let expected = if ids[0].contains(&id) { a } else { b };
        assert_eq!(row.get("dealership_id"), &Value::from(expected));
    }
}

#[test]
fn test_custom_interceptor_sees_every_command_kind() {
    let recorder = Arc::new(Recorder::default());
    let conn = TenantConnection::with_interceptor(
        tenantry_store::db::open_in_memory().unwrap(),
        recorder.clone(),
    )
    .unwrap();

    conn.execute("CREATE TABLE t (x INTEGER)", []).unwrap();
    conn.query_scalar::<i64, _>("SELECT count(*) FROM t", []).unwrap();
    conn.query_rows("SELECT x FROM t", [], |r| r.get::<_, i64>(0)).unwrap();

    let seen = recorder.seen.lock().unwrap().clone();
    assert_eq!(
        seen,
        [
            "CREATE TABLE t (x INTEGER)",
            "SELECT count(*) FROM t",
            "SELECT x FROM t"
        ]
    );
}

#[test]
fn test_config_file_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("store.toml");
    let db_path = dir.path().join("data.db");
    std::fs::write(
        &path,
        format!(
            "database_path = {:?}\nbusy_timeout_ms = 1500\n",
            db_path.to_string_lossy()
        ),
    )
    .unwrap();

    let config = StoreConfig::from_file(&path).unwrap();
    assert_eq!(config.database_path.as_deref(), Some(db_path.as_path()));
    assert_eq!(config.busy_timeout_ms, 1500);

    let conn = TenantConnection::open(&config).unwrap();
    let mode: Option<String> = conn.query_scalar("PRAGMA journal_mode", []).unwrap();
    assert_eq!(mode.as_deref(), Some("wal"));
    let fk: Option<i64> = conn.query_scalar("PRAGMA foreign_keys", []).unwrap();
    assert_eq!(fk, Some(1));
}
