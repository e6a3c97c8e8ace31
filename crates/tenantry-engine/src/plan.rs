//! Write plan for one commit
//!
//! Derived from the change tracker after the cascade has staged its nulls.
//! Writes are ordered inserts, then updates, then deletes; foreign keys are
//! checked at commit, so the order only has to be deterministic.

use std::collections::HashMap;
use std::sync::Arc;

use tenantry_core::errors::TenancyError;
use tenantry_core::model::{EntityKey, EntityType, Row};
use tenantry_core::tracking::{ChangeTracker, EntityState, EntryId};
use tenantry_store::connection::TenantConnection;
use tenantry_store::errors::Result;
use tenantry_store::repo::SqliteRepo;
use tokio_util::sync::CancellationToken;

/// One statement-level change
#[derive(Debug, Clone)]
pub enum Write {
    Insert {
        id: EntryId,
        entity: Arc<EntityType>,
        row: Row,
    },
    Update {
        entity: Arc<EntityType>,
        row: Row,
    },
    Delete {
        entity: Arc<EntityType>,
        key: EntityKey,
    },
}

impl Write {
    pub fn entity(&self) -> &str {
        match self {
            Write::Insert { entity, .. }
            | Write::Update { entity, .. }
            | Write::Delete { entity, .. } => entity.name(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct WritePlan {
    inserts: Vec<Write>,
    updates: Vec<Write>,
    deletes: Vec<Write>,
}

impl WritePlan {
    /// Collect the pending writes of `tracker`
    ///
    /// A Modified entry that was never persisted is still an insert. A
    /// Deleted entry that was never persisted needs no write.
    pub fn from_tracker(tracker: &ChangeTracker) -> Self {
        let mut plan = Self::default();
        for entry in tracker.entries() {
            let entity = entry.entity().clone();
            match (entry.state(), entry.is_persisted()) {
                (EntityState::Unchanged, _) | (EntityState::Deleted, false) => {}
                (EntityState::Added | EntityState::Modified, false) => plan.inserts.push(Write::Insert {
                    id: entry.id(),
                    entity,
                    row: entry.values().clone(),
                }),
                (EntityState::Added | EntityState::Modified, true) => plan.updates.push(Write::Update {
                    entity,
                    row: entry.values().clone(),
                }),
                (EntityState::Deleted, true) => plan.deletes.push(Write::Delete {
                    entity,
                    key: entry.key().clone(),
                }),
            }
        }
        plan
    }

    /// Writes in execution order
    pub fn writes(&self) -> impl Iterator<Item = &Write> {
        self.inserts
            .iter()
            .chain(self.updates.iter())
            .chain(self.deletes.iter())
    }

    pub fn inserts(&self) -> usize {
        self.inserts.len()
    }

    pub fn updates(&self) -> usize {
        self.updates.len()
    }

    pub fn deletes(&self) -> usize {
        self.deletes.len()
    }

    pub fn len(&self) -> usize {
        self.inserts.len() + self.updates.len() + self.deletes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Execute every write on `conn`
    ///
    /// Meant to run inside a transaction: an error part way leaves earlier
    /// writes for the caller to roll back. Returns the store-generated values
    /// of each insert.
    pub fn apply(
        &self,
        conn: &TenantConnection,
        cancel: &CancellationToken,
    ) -> Result<HashMap<EntryId, Row>> {
        let mut generated = HashMap::new();
        for write in self.writes() {
            if cancel.is_cancelled() {
                return Err(TenancyError::Cancelled {
                    op: "save_changes".to_string(),
                }
                .into());
            }
            tracing::trace!(entity = write.entity(), "applying write");
            match write {
                Write::Insert { id, entity, row } => {
                    let filled = SqliteRepo::insert(conn, entity, row)?;
                    if !filled.is_empty() {
                        generated.insert(*id, filled);
                    }
                }
                Write::Update { entity, row } => SqliteRepo::update(conn, entity, row)?,
                Write::Delete { entity, key } => SqliteRepo::delete(conn, entity, key)?,
            }
        }
        Ok(generated)
    }
}
