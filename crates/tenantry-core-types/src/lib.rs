//! Core types shared across tenantry facilities
//!
//! This crate provides foundational types used by the kernel, the store
//! and the engine:
//!
//! - **Tenant identity**: `TenantId`, the opaque partition identifier carried
//!   by the ambient tenant scope
//! - **Schema constants**: Canonical field keys and event names for structured logging

pub mod schema;
pub mod tenant;

pub use tenant::TenantId;
