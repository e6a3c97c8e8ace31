//! Dependency metadata index
//!
//! Maps each principal entity type to the dependents that declared a
//! set-null-on-delete marker against it. Built once per `Schema` and
//! read-only afterwards, so it can be shared across flows behind an `Arc`.

use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::{Result, TenancyError};
use crate::model::{EntityType, ForeignKeyDescriptor, Schema};

/// One dependent relationship of a principal type
#[derive(Debug, Clone)]
pub struct DependencyIndexEntry {
    /// Entity type holding the marked column
    pub dependent: Arc<EntityType>,

    /// Column nulled when the principal is deleted
    pub column: String,

    /// Relationship the marker names
    pub foreign_key: ForeignKeyDescriptor,
}

/// Principal type name -> dependent entries, in declaration order
#[derive(Debug, Default)]
pub struct DependencyIndex {
    by_principal: HashMap<String, Vec<DependencyIndexEntry>>,
}

impl DependencyIndex {
    /// Build the index from every marker in the schema
    ///
    /// Entries for a principal follow entity registration order, then marker
    /// declaration order within each entity.
    ///
    /// # Errors
    ///
    /// `InvalidCascadeMarker` when a marker names a foreign key the entity
    /// does not declare, or targets a column that is undeclared, part of the
    /// entity's own primary key, not nullable, or not one of the foreign
    /// key's dependent columns.
    pub fn build(schema: &Schema) -> Result<Self> {
        let mut by_principal: HashMap<String, Vec<DependencyIndexEntry>> = HashMap::new();

        for entity in schema.entities() {
            for marker in entity.markers() {
                let reject = |reason: &str| TenancyError::InvalidCascadeMarker {
                    entity: entity.name().to_string(),
                    column: marker.column.clone(),
                    reason: reason.to_string(),
                };

                let fk = entity
                    .foreign_key(&marker.foreign_key)
                    .ok_or_else(|| reject(&format!("foreign key {} does not exist", marker.foreign_key)))?;
                let column = entity
                    .column(&marker.column)
                    .ok_or_else(|| reject("column is not declared"))?;
                if entity.is_key_column(&marker.column) {
                    return Err(reject("column is part of the primary key"));
                }
                if !column.nullable {
                    return Err(reject("column is not nullable"));
                }
                if !fk.dependent_columns.contains(&marker.column) {
                    return Err(reject(&format!(
                        "column is not a dependent column of {}",
                        fk.name
                    )));
                }

                by_principal
                    .entry(fk.principal.clone())
                    .or_default()
                    .push(DependencyIndexEntry {
                        dependent: entity.clone(),
                        column: marker.column.clone(),
                        foreign_key: fk.clone(),
                    });
            }
        }

        tracing::debug!(
            principals = by_principal.len(),
            entries = by_principal.values().map(Vec::len).sum::<usize>(),
            "dependency index built"
        );
        Ok(Self { by_principal })
    }

    /// Dependents of `principal`, empty when none are declared
    pub fn lookup(&self, principal: &str) -> &[DependencyIndexEntry] {
        self.by_principal
            .get(principal)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.by_principal.is_empty()
    }
}
