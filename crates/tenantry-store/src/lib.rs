//! tenantry store - SQLite data-access layer
//!
//! Provides:
//! - Connection setup from `StoreConfig`
//! - Session tenant support (`set_tenant` / `get_tenant`) on each connection
//! - `TenantConnection`, which routes every command through the tenancy interceptor
//! - Row persistence for declared entity types, including the unfiltered
//!   scan the cascade fallback consumes
//! - DDL generation for bootstrapping databases

pub mod codec;
pub mod config;
pub mod connection;
pub mod db;
pub mod ddl;
pub mod errors;
pub mod repo;
pub mod session;

// Re-export key types
pub use config::StoreConfig;
pub use connection::TenantConnection;
pub use errors::Result;
pub use repo::{RepoSource, SqliteRepo};
pub use session::SqliteDialect;
