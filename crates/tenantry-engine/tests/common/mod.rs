//! On-disk dealership database for engine integration tests
//!
//! dealerships <- vehicles <- parts_orders (vehicle_id nulled on delete)
//!             <- customers <- service_records (customer_id, vehicle_id nulled on delete)

#![allow(dead_code)]

use std::sync::Arc;

use tempfile::TempDir;
use tenantry_core::model::{ColumnKind, EntityKey, EntityType, Row, Schema, Value};
use tenantry_core::{TenantId, TenantScope};
use tenantry_engine::DbContext;
use tenantry_store::StoreConfig;
use uuid::Uuid;

pub fn dealership_schema() -> Arc<Schema> {
    let dealerships = EntityType::builder("dealerships")
        .column("id", ColumnKind::Uuid)
        .column("name", ColumnKind::Text)
        .primary_key(&["id"])
        .build();

    let vehicles = EntityType::builder("vehicles")
        .tenant_column("dealership_id")
        .column("id", ColumnKind::Uuid)
        .column("vin", ColumnKind::Text)
        .primary_key(&["dealership_id", "id"])
        .foreign_key("fk_vehicles_dealership", &["dealership_id"], "dealerships", &["id"])
        .build();

    let parts_orders = EntityType::builder("parts_orders")
        .tenant_column("dealership_id")
        .column("id", ColumnKind::Uuid)
        .nullable_column("vehicle_id", ColumnKind::Uuid)
        .column("part", ColumnKind::Text)
        .primary_key(&["dealership_id", "id"])
        .foreign_key(
            "fk_parts_orders_vehicle",
            &["dealership_id", "vehicle_id"],
            "vehicles",
            &["dealership_id", "id"],
        )
        .set_null_on_delete("vehicle_id", "fk_parts_orders_vehicle")
        .build();

    let customers = EntityType::builder("customers")
        .tenant_column("dealership_id")
        .column("id", ColumnKind::Uuid)
        .column("name", ColumnKind::Text)
        .primary_key(&["dealership_id", "id"])
        .build();

    let service_records = EntityType::builder("service_records")
        .tenant_column("dealership_id")
        .column("id", ColumnKind::Uuid)
        .nullable_column("customer_id", ColumnKind::Uuid)
        .nullable_column("vehicle_id", ColumnKind::Uuid)
        .column("summary", ColumnKind::Text)
        .primary_key(&["dealership_id", "id"])
        .foreign_key(
            "fk_service_records_customer",
            &["dealership_id", "customer_id"],
            "customers",
            &["dealership_id", "id"],
        )
        .foreign_key(
            "fk_service_records_vehicle",
            &["dealership_id", "vehicle_id"],
            "vehicles",
            &["dealership_id", "id"],
        )
        .set_null_on_delete("customer_id", "fk_service_records_customer")
        .set_null_on_delete("vehicle_id", "fk_service_records_vehicle")
        .build();

    Arc::new(
        Schema::builder(1)
            .entity(dealerships)
            .entity(vehicles)
            .entity(parts_orders)
            .entity(customers)
            .entity(service_records)
            .build()
            .expect("dealership schema should be valid"),
    )
}

/// Scratch database file with the dealership tables created
pub struct Fixture {
    _dir: TempDir,
    pub config: StoreConfig,
    pub schema: Arc<Schema>,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("temp dir");
        let config = StoreConfig::file(dir.path().join("dealerships.db"));
        let schema = dealership_schema();
        DbContext::open(schema.clone(), &config)
            .and_then(|ctx| ctx.ensure_tables())
            .expect("tables should be created");
        Self {
            _dir: dir,
            config,
            schema,
        }
    }

    /// New unit of work on its own connection
    pub fn context(&self) -> DbContext {
        DbContext::open(self.schema.clone(), &self.config).expect("context should open")
    }
}

/// Ids of one seeded dealership
///
/// V1 is referenced by PO1 and SR1, V2 by PO2. PO3 references no vehicle.
#[derive(Debug, Clone, Copy)]
pub struct Dealership {
    pub tenant: TenantId,
    pub id: Uuid,
    pub v1: Uuid,
    pub v2: Uuid,
    pub po1: Uuid,
    pub po2: Uuid,
    pub po3: Uuid,
    pub sr1: Uuid,
}

impl Dealership {
    pub fn key(&self, id: Uuid) -> EntityKey {
        EntityKey::new(vec![Value::from(self.id), Value::from(id)])
    }
}

/// Seed one dealership under its own tenant scope
///
/// Dependent rows leave `dealership_id` unset so the store fills it from the
/// session tenant.
pub fn seed_dealership(fx: &Fixture, name: &str) -> Dealership {
    let tenant = TenantId::generate();
    let d = Dealership {
        tenant,
        id: Uuid::from(tenant),
        v1: Uuid::new_v4(),
        v2: Uuid::new_v4(),
        po1: Uuid::new_v4(),
        po2: Uuid::new_v4(),
        po3: Uuid::new_v4(),
        sr1: Uuid::new_v4(),
    };

    TenantScope::with(tenant, || {
        let mut ctx = fx.context();
        ctx.add("dealerships", Row::new().with("id", d.id).with("name", name))
            .unwrap();
        for v in [d.v1, d.v2] {
            ctx.add("vehicles", vehicle(v)).unwrap();
        }
        ctx.add("parts_orders", parts_order(d.po1, Some(d.v1))).unwrap();
        ctx.add("parts_orders", parts_order(d.po2, Some(d.v2))).unwrap();
        ctx.add("parts_orders", parts_order(d.po3, None)).unwrap();
        ctx.add(
            "service_records",
            Row::new()
                .with("id", d.sr1)
                .with("vehicle_id", d.v1)
                .with("summary", "oil change"),
        )
        .unwrap();
        ctx.save_changes().expect("seed should save");
    });
    d
}

/// Vehicle row without its partition column
pub fn vehicle(id: Uuid) -> Row {
    Row::new()
        .with("id", id)
        .with("vin", format!("VIN-{}", id.simple()))
}

/// Parts order row without its partition column
pub fn parts_order(id: Uuid, vehicle: Option<Uuid>) -> Row {
    Row::new()
        .with("id", id)
        .with("vehicle_id", vehicle)
        .with("part", "brake pads")
}
