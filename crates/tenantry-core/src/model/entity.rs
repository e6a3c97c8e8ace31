use serde::{Deserialize, Serialize};

use super::value::{ColumnKind, EntityKey, Row, Value};
use crate::errors::{Result, TenancyError};

/// How the store fills a column that an insert leaves unset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnDefault {
    /// No store-side default
    None,
    /// Filled from the session tenant (`get_tenant()`) established by the interceptor
    SessionTenant,
}

/// Column declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub kind: ColumnKind,
    pub nullable: bool,
    pub default: ColumnDefault,
}

/// A declared foreign key relationship
///
/// `dependent_columns[i]` references `principal_columns[i]`. The two lists are
/// always the same length and are compared by position, never by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyDescriptor {
    /// Relationship name, referenced by cascade markers
    pub name: String,

    /// Columns on the dependent entity, in order
    pub dependent_columns: Vec<String>,

    /// Name of the referenced (principal) entity type
    pub principal: String,

    /// Referenced columns on the principal entity, in order
    pub principal_columns: Vec<String>,
}

impl ForeignKeyDescriptor {
    /// Extract the principal's values for this relationship, in FK order
    pub fn principal_values(&self, principal_row: &Row) -> Vec<Value> {
        self.principal_columns
            .iter()
            .map(|c| principal_row.get(c).clone())
            .collect()
    }

    /// Full positional composite match of a dependent row against principal values
    ///
    /// Every component must match and a null on either side never matches.
    pub fn references(&self, dependent_row: &Row, principal_values: &[Value]) -> bool {
        self.dependent_columns.len() == principal_values.len()
            && self
                .dependent_columns
                .iter()
                .zip(principal_values)
                .all(|(col, expected)| dependent_row.get(col).matches(expected))
    }
}

/// Declaration that deleting the principal of `foreign_key` nulls `column`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NullableCascadeMarker {
    pub column: String,
    pub foreign_key: String,
}

/// Schema-level description of a record kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityType {
    name: String,
    columns: Vec<ColumnDef>,
    primary_key: Vec<String>,
    foreign_keys: Vec<ForeignKeyDescriptor>,
    markers: Vec<NullableCascadeMarker>,
}

impl EntityType {
    /// Start declaring an entity type (the name doubles as the table name)
    pub fn builder(name: impl Into<String>) -> EntityTypeBuilder {
        EntityTypeBuilder {
            entity: EntityType {
                name: name.into(),
                columns: Vec::new(),
                primary_key: Vec::new(),
                foreign_keys: Vec::new(),
                markers: Vec::new(),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn primary_key(&self) -> &[String] {
        &self.primary_key
    }

    pub fn is_key_column(&self, name: &str) -> bool {
        self.primary_key.iter().any(|c| c == name)
    }

    pub fn foreign_keys(&self) -> &[ForeignKeyDescriptor] {
        &self.foreign_keys
    }

    pub fn foreign_key(&self, name: &str) -> Option<&ForeignKeyDescriptor> {
        self.foreign_keys.iter().find(|fk| fk.name == name)
    }

    pub fn markers(&self) -> &[NullableCascadeMarker] {
        &self.markers
    }

    /// Primary key of a row, in primary key column order
    pub fn key_of(&self, row: &Row) -> EntityKey {
        EntityKey::new(
            self.primary_key
                .iter()
                .map(|c| row.get(c).clone())
                .collect(),
        )
    }

    /// Check a key's arity against the primary key
    pub fn check_key(&self, key: &EntityKey) -> Result<()> {
        if key.len() != self.primary_key.len() {
            return Err(TenancyError::KeyArity {
                entity: self.name.clone(),
                expected: self.primary_key.len(),
                actual: key.len(),
            });
        }
        Ok(())
    }

    /// Validate a row against the column declarations
    ///
    /// Columns with a session tenant default may be left null; the store
    /// fills them on insert.
    pub fn check_row(&self, row: &Row) -> Result<()> {
        for (name, value) in row.iter() {
            let col = self.column(name).ok_or_else(|| TenancyError::UnknownColumn {
                entity: self.name.clone(),
                column: name.to_string(),
            })?;
            if !value.fits(col.kind) {
                return Err(TenancyError::TypeMismatch {
                    entity: self.name.clone(),
                    column: name.to_string(),
                    expected: col.kind,
                    actual: format!("{:?}", value),
                });
            }
        }

        for col in &self.columns {
            let defaulted = col.default == ColumnDefault::SessionTenant;
            if !col.nullable && !defaulted && row.get(&col.name).is_null() {
                return Err(if self.is_key_column(&col.name) {
                    TenancyError::MissingKeyValue {
                        entity: self.name.clone(),
                        column: col.name.clone(),
                    }
                } else {
                    TenancyError::NullViolation {
                        entity: self.name.clone(),
                        column: col.name.clone(),
                    }
                });
            }
        }
        Ok(())
    }
}

/// Builder for `EntityType`
///
/// Structural validation happens when the owning `Schema` is built.
#[derive(Debug, Clone)]
pub struct EntityTypeBuilder {
    entity: EntityType,
}

impl EntityTypeBuilder {
    fn push_column(mut self, name: &str, kind: ColumnKind, nullable: bool, default: ColumnDefault) -> Self {
        self.entity.columns.push(ColumnDef {
            name: name.to_string(),
            kind,
            nullable,
            default,
        });
        self
    }

    /// Declare a NOT NULL column
    pub fn column(self, name: &str, kind: ColumnKind) -> Self {
        self.push_column(name, kind, false, ColumnDefault::None)
    }

    /// Declare a nullable column
    pub fn nullable_column(self, name: &str, kind: ColumnKind) -> Self {
        self.push_column(name, kind, true, ColumnDefault::None)
    }

    /// Declare a NOT NULL UUID partition column filled from the session tenant
    pub fn tenant_column(self, name: &str) -> Self {
        self.push_column(name, ColumnKind::Uuid, false, ColumnDefault::SessionTenant)
    }

    pub fn primary_key(mut self, columns: &[&str]) -> Self {
        self.entity.primary_key = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn foreign_key(
        mut self,
        name: &str,
        dependent_columns: &[&str],
        principal: &str,
        principal_columns: &[&str],
    ) -> Self {
        self.entity.foreign_keys.push(ForeignKeyDescriptor {
            name: name.to_string(),
            dependent_columns: dependent_columns.iter().map(|c| c.to_string()).collect(),
            principal: principal.to_string(),
            principal_columns: principal_columns.iter().map(|c| c.to_string()).collect(),
        });
        self
    }

    /// Mark `column` to be nulled when the principal of `foreign_key` is deleted
    pub fn set_null_on_delete(mut self, column: &str, foreign_key: &str) -> Self {
        self.entity.markers.push(NullableCascadeMarker {
            column: column.to_string(),
            foreign_key: foreign_key.to_string(),
        });
        self
    }

    pub fn build(self) -> EntityType {
        self.entity
    }
}
