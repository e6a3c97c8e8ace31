//! Dealership schema shared by the integration tests
//!
//! dealerships <- vehicles <- parts_orders (vehicle_id nulled on delete)
//!             <- customers <- service_records (customer_id nulled on delete)

use std::sync::Arc;

use tenantry_core::model::{ColumnKind, EntityType, Row, Schema};
use uuid::Uuid;

#[allow(dead_code)]
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

#[allow(dead_code)]
pub fn vehicle(dealership: Uuid, id: Uuid) -> Row {
    Row::new()
        .with("dealership_id", dealership)
        .with("id", id)
        .with("vin", format!("VIN-{}", id.simple()))
}

#[allow(dead_code)]
pub fn parts_order(dealership: Uuid, id: Uuid, vehicle: Option<Uuid>) -> Row {
    Row::new()
        .with("dealership_id", dealership)
        .with("id", id)
        .with("vehicle_id", vehicle)
        .with("part", "brake pads")
}

#[allow(dead_code)]
pub fn service_record(
    dealership: Uuid,
    id: Uuid,
    customer: Option<Uuid>,
    vehicle: Option<Uuid>,
) -> Row {
    Row::new()
        .with("dealership_id", dealership)
        .with("id", id)
        .with("customer_id", customer)
        .with("vehicle_id", vehicle)
        .with("summary", "oil change")
}
