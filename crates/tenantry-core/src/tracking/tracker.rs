//! Change tracker: the table of entities in a unit of work
//!
//! Each entry is (identity, lifecycle state, column values). All state
//! changes go through `EntityState::apply`; the tracker only records the
//! outcome. A tracker belongs to exactly one unit of work and is not shared
//! between concurrent flows.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Serialize;

use super::state::{EntityState, StateEvent, Transition};
use crate::errors::{Result, TenancyError};
use crate::model::{EntityKey, EntityType, Row, Value};

/// Handle to a tracked entry, stable for the entry's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EntryId(u64);

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One tracked entity instance
#[derive(Debug, Clone)]
pub struct TrackedEntry {
    id: EntryId,
    entity: Arc<EntityType>,
    key: EntityKey,
    state: EntityState,
    values: Row,
    persisted: bool,
}

impl TrackedEntry {
    pub fn id(&self) -> EntryId {
        self.id
    }

    pub fn entity(&self) -> &Arc<EntityType> {
        &self.entity
    }

    /// Primary key; may hold nulls while store-filled key columns are pending
    pub fn key(&self) -> &EntityKey {
        &self.key
    }

    pub fn state(&self) -> EntityState {
        self.state
    }

    pub fn values(&self) -> &Row {
        &self.values
    }

    /// Whether a row for this entity exists in the store
    pub fn is_persisted(&self) -> bool {
        self.persisted
    }
}

type Position = (String, EntityKey);

/// Tracked entities in tracking order
#[derive(Debug, Default)]
pub struct ChangeTracker {
    entries: BTreeMap<EntryId, TrackedEntry>,
    positions: HashMap<Position, EntryId>,
    next_seq: u64,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new entity that does not exist in the store yet
    pub fn add(&mut self, entity: Arc<EntityType>, values: Row) -> Result<EntryId> {
        entity.check_row(&values)?;
        self.track(entity, values, EntityState::Added, false)
    }

    /// Track an entity loaded from the store
    pub fn attach(&mut self, entity: Arc<EntityType>, values: Row) -> Result<EntryId> {
        entity.check_row(&values)?;
        if let Some(col) = entity
            .primary_key()
            .iter()
            .find(|c| values.get(c).is_null())
        {
            return Err(TenancyError::MissingKeyValue {
                entity: entity.name().to_string(),
                column: col.clone(),
            });
        }
        self.track(entity, values, EntityState::Unchanged, true)
    }

    fn track(
        &mut self,
        entity: Arc<EntityType>,
        values: Row,
        state: EntityState,
        persisted: bool,
    ) -> Result<EntryId> {
        let key = entity.key_of(&values);
        let position = (entity.name().to_string(), key.clone());
        if self.positions.contains_key(&position) {
            return Err(TenancyError::DuplicateKey {
                entity: entity.name().to_string(),
                key: key.to_string(),
            });
        }

        let id = EntryId(self.next_seq);
        self.next_seq += 1;
        self.positions.insert(position, id);
        self.entries.insert(
            id,
            TrackedEntry {
                id,
                entity,
                key,
                state,
                values,
                persisted,
            },
        );
        Ok(id)
    }

    /// Apply column changes to a tracked entity
    ///
    /// Primary key columns are immutable once tracked.
    pub fn update(&mut self, id: EntryId, changes: Row) -> Result<()> {
        let entry = self.entry_mut(id)?;
        for (col, value) in changes.iter() {
            if entry.entity.is_key_column(col) && entry.values.get(col) != value {
                return Err(TenancyError::ImmutableKey {
                    entity: entry.entity.name().to_string(),
                    column: col.to_string(),
                });
            }
        }
        let next = transition(entry, StateEvent::Edit)?;

        let mut merged = entry.values.clone();
        merged.merge(&changes);
        entry.entity.check_row(&merged)?;

        entry.values = merged;
        entry.state = next;
        Ok(())
    }

    /// Mark a tracked entity for deletion
    pub fn remove(&mut self, id: EntryId) -> Result<()> {
        let entry = self.entry_mut(id)?;
        entry.state = transition(entry, StateEvent::Delete)?;
        Ok(())
    }

    /// Null `column` on a tracked entity and mark it Modified
    ///
    /// Returns `false` without touching the entry when the column is already
    /// null or the entry is Deleted.
    pub fn null_column(&mut self, id: EntryId, column: &str) -> Result<bool> {
        let entry = self.entry_mut(id)?;
        if entry.state == EntityState::Deleted || entry.values.get(column).is_null() {
            return Ok(false);
        }
        let next = transition(entry, StateEvent::Edit)?;
        entry.values.set(column, Value::Null);
        entry.state = next;
        Ok(true)
    }

    pub fn get(&self, id: EntryId) -> Option<&TrackedEntry> {
        self.entries.get(&id)
    }

    pub fn find_id(&self, entity: &str, key: &EntityKey) -> Option<EntryId> {
        self.positions
            .get(&(entity.to_string(), key.clone()))
            .copied()
    }

    pub fn state_of(&self, id: EntryId) -> Option<EntityState> {
        self.entries.get(&id).map(|e| e.state)
    }

    /// All entries in tracking order
    pub fn entries(&self) -> impl Iterator<Item = &TrackedEntry> {
        self.entries.values()
    }

    /// Entries currently in state Deleted, in tracking order
    pub fn deleted(&self) -> Vec<EntryId> {
        self.entries
            .values()
            .filter(|e| e.state == EntityState::Deleted)
            .map(|e| e.id)
            .collect()
    }

    pub fn has_changes(&self) -> bool {
        self.entries.values().any(|e| e.state.is_pending())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record a successful commit
    ///
    /// `generated` holds values the store filled in on insert (session
    /// defaults); they are merged before keys are recomputed. Deleted entries
    /// are detached, everything else becomes Unchanged and persisted.
    pub fn accept_changes(&mut self, generated: HashMap<EntryId, Row>) -> Result<()> {
        let ids: Vec<EntryId> = self.entries.keys().copied().collect();
        for id in ids {
            let Some(entry) = self.entries.get_mut(&id) else {
                continue;
            };
            if let Some(row) = generated.get(&id) {
                entry.values.merge(row);
            }
            match entry.state.apply(StateEvent::Commit) {
                Some(Transition::To(state)) => {
                    entry.state = state;
                    entry.persisted = true;
                    let old = (entry.entity.name().to_string(), entry.key.clone());
                    let key = entry.entity.key_of(&entry.values);
                    if key != entry.key {
                        entry.key = key.clone();
                        let new = (entry.entity.name().to_string(), key);
                        self.positions.remove(&old);
                        self.positions.insert(new, id);
                    }
                }
                Some(Transition::Detach) => {
                    let position = (entry.entity.name().to_string(), entry.key.clone());
                    self.entries.remove(&id);
                    self.positions.remove(&position);
                }
                None => {
                    return Err(TenancyError::Internal {
                        message: format!("commit rejected for entry {}", id),
                    })
                }
            }
        }
        Ok(())
    }

    fn entry_mut(&mut self, id: EntryId) -> Result<&mut TrackedEntry> {
        self.entries
            .get_mut(&id)
            .ok_or_else(|| TenancyError::NotTracked {
                entity: "<unknown>".to_string(),
                key: id.to_string(),
            })
    }
}

fn transition(entry: &TrackedEntry, event: StateEvent) -> Result<EntityState> {
    match entry.state.apply(event) {
        Some(Transition::To(state)) => Ok(state),
        _ => Err(TenancyError::IllegalTransition {
            entity: entry.entity.name().to_string(),
            key: entry.key.to_string(),
            from: entry.state,
            event,
        }),
    }
}
