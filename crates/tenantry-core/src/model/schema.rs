//! Schema: the registered entity types of one schema version
//!
//! The dependency index is derived from the schema lazily and cached for the
//! schema's lifetime. A schema change means building a new `Schema`.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};

use super::entity::EntityType;
use crate::errors::{Result, TenancyError};
use crate::index::DependencyIndex;

/// Immutable set of entity types for one schema version
#[derive(Debug)]
pub struct Schema {
    version: u32,
    entities: Vec<Arc<EntityType>>,
    by_name: HashMap<String, usize>,
    index: OnceLock<Arc<DependencyIndex>>,
}

impl Schema {
    pub fn builder(version: u32) -> SchemaBuilder {
        SchemaBuilder {
            version,
            entities: Vec::new(),
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Entity types in registration order
    pub fn entities(&self) -> &[Arc<EntityType>] {
        &self.entities
    }

    pub fn entity(&self, name: &str) -> Option<&Arc<EntityType>> {
        self.by_name.get(name).map(|&i| &self.entities[i])
    }

    pub fn require(&self, name: &str) -> Result<&Arc<EntityType>> {
        self.entity(name).ok_or_else(|| TenancyError::UnknownEntity {
            entity: name.to_string(),
        })
    }

    /// The dependency index for this schema, built on first use
    pub fn dependency_index(&self) -> Result<Arc<DependencyIndex>> {
        if let Some(index) = self.index.get() {
            return Ok(index.clone());
        }
        let built = Arc::new(DependencyIndex::build(self)?);
        // A racing builder may have won; both results are identical.
        Ok(self.index.get_or_init(|| built).clone())
    }
}

/// Builder for `Schema`
pub struct SchemaBuilder {
    version: u32,
    entities: Vec<EntityType>,
}

impl SchemaBuilder {
    pub fn entity(mut self, entity: EntityType) -> Self {
        self.entities.push(entity);
        self
    }

    /// Validate structure and build
    ///
    /// Also builds the dependency index eagerly so that invalid cascade
    /// markers are reported here rather than at the first save.
    pub fn build(self) -> Result<Schema> {
        let mut by_name = HashMap::new();
        for (i, entity) in self.entities.iter().enumerate() {
            if by_name.insert(entity.name().to_string(), i).is_some() {
                return Err(invalid(format!("entity {} declared twice", entity.name())));
            }
        }

        for entity in &self.entities {
            validate_entity(entity, &self.entities, &by_name)?;
        }

        let schema = Schema {
            version: self.version,
            entities: self.entities.into_iter().map(Arc::new).collect(),
            by_name,
            index: OnceLock::new(),
        };
        schema.dependency_index()?;

        tracing::debug!(
            version = schema.version,
            entities = schema.entities.len(),
            "schema built"
        );
        Ok(schema)
    }
}

fn invalid(reason: String) -> TenancyError {
    TenancyError::InvalidSchema { reason }
}

fn validate_entity(
    entity: &EntityType,
    all: &[EntityType],
    by_name: &HashMap<String, usize>,
) -> Result<()> {
    let name = entity.name();

    let mut seen = HashSet::new();
    for col in entity.columns() {
        if !seen.insert(col.name.as_str()) {
            return Err(invalid(format!("column {}.{} declared twice", name, col.name)));
        }
    }

    if entity.primary_key().is_empty() {
        return Err(invalid(format!("entity {} has no primary key", name)));
    }
    for col in entity.primary_key() {
        match entity.column(col) {
            None => return Err(invalid(format!("primary key column {}.{} is not declared", name, col))),
            Some(def) if def.nullable => {
                return Err(invalid(format!("primary key column {}.{} is nullable", name, col)))
            }
            Some(_) => {}
        }
    }

    let mut fk_names = HashSet::new();
    for fk in entity.foreign_keys() {
        if !fk_names.insert(fk.name.as_str()) {
            return Err(invalid(format!("foreign key {} declared twice on {}", fk.name, name)));
        }
        if fk.dependent_columns.is_empty()
            || fk.dependent_columns.len() != fk.principal_columns.len()
        {
            return Err(invalid(format!(
                "foreign key {} on {} maps {} columns to {}",
                fk.name,
                name,
                fk.dependent_columns.len(),
                fk.principal_columns.len()
            )));
        }
        if let Some(col) = fk.dependent_columns.iter().find(|c| entity.column(c).is_none()) {
            return Err(invalid(format!(
                "foreign key {} uses undeclared column {}.{}",
                fk.name, name, col
            )));
        }
        let principal = by_name
            .get(&fk.principal)
            .map(|&i| &all[i])
            .ok_or_else(|| {
                invalid(format!(
                    "foreign key {} on {} references unknown entity {}",
                    fk.name, name, fk.principal
                ))
            })?;
        if let Some(col) = fk
            .principal_columns
            .iter()
            .find(|c| principal.column(c).is_none())
        {
            return Err(invalid(format!(
                "foreign key {} references undeclared column {}.{}",
                fk.name, fk.principal, col
            )));
        }
    }
    Ok(())
}
