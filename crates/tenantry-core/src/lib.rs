//! tenantry core - I/O-free tenancy kernel
//!
//! This crate provides:
//! - The schema model (entity types, foreign keys, set-null-on-delete markers)
//! - The dependency index derived from those markers
//! - The ambient tenant scope and the command interceptor that reads it
//! - The change tracker for one unit of work and its lifecycle state machine
//! - The cascade engine that stages SET NULL effects of pending deletes
//!
//! Nothing here talks to a database. The store crate supplies connections
//! and row access; the engine crate ties both into a unit of work.

pub mod cascade;
pub mod errors;
pub mod index;
pub mod interceptor;
pub mod logging_facility;
pub mod model;
pub mod scope;
pub mod tracking;

// Used by the logging macros
pub use tenantry_core_types;

// Re-export commonly used types
pub use cascade::{CascadeEngine, CascadeReport, CascadeSource, DependentSource, NulledDependent};
pub use errors::{ExError, ExErrorKind, ExResult, Result, TenancyError};
pub use index::{DependencyIndex, DependencyIndexEntry};
pub use interceptor::{
    Command, CommandInterceptor, CommandKind, PostgresDialect, SessionContextDialect,
    TenancyCommandInterceptor,
};
pub use model::{ColumnKind, EntityKey, EntityType, Row, Schema, Value};
pub use scope::{TenantGuard, TenantScope};
pub use tenantry_core_types::TenantId;
pub use tracking::{ChangeTracker, EntityState, EntryId, TrackedEntry};
