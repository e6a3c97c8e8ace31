pub mod entity;
pub mod schema;
pub mod value;

pub use entity::{
    ColumnDef, ColumnDefault, EntityType, EntityTypeBuilder, ForeignKeyDescriptor,
    NullableCascadeMarker,
};
pub use schema::{Schema, SchemaBuilder};
pub use value::{ColumnKind, EntityKey, Row, Value};
