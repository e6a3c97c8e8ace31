//! tenantry engine - unit of work orchestration
//!
//! Ties the core kernel and the SQLite store together: a `DbContext` tracks
//! entity changes, runs the SET NULL cascade when saving, and writes
//! everything in one transaction.

pub mod context;
pub mod plan;

pub use context::{DbContext, SaveOutcome};
pub use plan::{Write, WritePlan};
