//! Virtual SET NULL cascade
//!
//! Runs once per save, before anything is written. For every entity the unit
//! of work is about to delete, each dependent declared in the dependency
//! index is searched first among tracked entities and then among persisted
//! rows. Matches get their marked column nulled and are staged as Modified
//! in the same tracker, so they are written by the same commit as the
//! deletes that triggered them.
//!
//! Cascades are single-level: only entities already Deleted when the pass
//! starts act as triggers.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::errors::{ExResult, TenancyError};
use crate::index::DependencyIndexEntry;
use crate::model::{EntityKey, EntityType, Row, Schema, Value};
use crate::tracking::{ChangeTracker, EntityState, EntryId};

/// Access to persisted rows for the cascade fallback
pub trait DependentSource {
    /// Every persisted row of `entity`
    ///
    /// The cascade filters the result in process. Implementations are not
    /// expected to push the foreign key predicate down to the store, which
    /// makes this a full scan of the dependent table.
    fn fetch_all(&mut self, entity: &EntityType) -> ExResult<Vec<Row>>;
}

/// Where a nulled dependent was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CascadeSource {
    /// Already tracked by the unit of work
    InMemory,
    /// Loaded by the fallback scan and attached
    Persisted,
}

/// A dependent whose marked column was nulled
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NulledDependent {
    pub entity: String,
    pub key: EntityKey,
    pub column: String,
    pub foreign_key: String,
    pub principal: EntityKey,
    pub source: CascadeSource,
}

/// Outcome of one cascade pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CascadeReport {
    nulled: Vec<NulledDependent>,
}

impl CascadeReport {
    /// Nulled dependents, in processing order
    pub fn nulled(&self) -> &[NulledDependent] {
        &self.nulled
    }

    pub fn len(&self) -> usize {
        self.nulled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nulled.is_empty()
    }

    pub fn count(&self, source: CascadeSource) -> usize {
        self.nulled.iter().filter(|n| n.source == source).count()
    }
}

/// Computes and stages SET NULL effects of pending deletes
#[derive(Debug, Clone)]
pub struct CascadeEngine {
    schema: Arc<Schema>,
}

impl CascadeEngine {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Run one cascade pass over `tracker`
    ///
    /// # Errors
    ///
    /// `Cancelled` if `cancel` fires; nulls staged so far stay in the tracker
    /// as Modified and are discarded with it. Errors from `source` are
    /// returned unchanged.
    pub fn run(
        &self,
        tracker: &mut ChangeTracker,
        source: &mut dyn DependentSource,
        cancel: &CancellationToken,
    ) -> ExResult<CascadeReport> {
        let mut report = CascadeReport::default();

        let deleted = tracker.deleted();
        if deleted.is_empty() {
            return Ok(report);
        }

        let index = self.schema.dependency_index()?;
        let mut persisted: HashMap<String, Vec<Row>> = HashMap::new();

        for principal_id in deleted {
            let Some(principal) = tracker.get(principal_id) else {
                continue;
            };
            let principal_type = principal.entity().clone();
            let principal_key = principal.key().clone();
            let principal_row = principal.values().clone();

            for entry in index.lookup(principal_type.name()) {
                check_cancelled(cancel)?;

                let values = entry.foreign_key.principal_values(&principal_row);
                if values.iter().any(Value::is_null) {
                    continue;
                }

                let pass = Pass {
                    entry,
                    values: &values,
                    principal: &principal_key,
                };
                pass.null_tracked(tracker, &mut report)?;

                check_cancelled(cancel)?;
                let dependent = entry.dependent.name();
                if !persisted.contains_key(dependent) {
                    let fetched = source.fetch_all(&entry.dependent)?;
                    tracing::debug!(dependent, rows = fetched.len(), "fallback scan");
                    persisted.insert(dependent.to_string(), fetched);
                }
                let rows = persisted.get(dependent).map(Vec::as_slice).unwrap_or(&[]);
                pass.null_persisted(tracker, rows, cancel, &mut report)?;
            }
        }

        tracing::debug!(
            nulled = report.len(),
            in_memory = report.count(CascadeSource::InMemory),
            persisted = report.count(CascadeSource::Persisted),
            "cascade pass complete"
        );
        Ok(report)
    }
}

/// One (deleted principal, dependency entry) pair
struct Pass<'a> {
    entry: &'a DependencyIndexEntry,
    values: &'a [Value],
    principal: &'a EntityKey,
}

impl Pass<'_> {
    fn null_tracked(&self, tracker: &mut ChangeTracker, report: &mut CascadeReport) -> ExResult<()> {
        let dependent = self.entry.dependent.name();
        let matches: Vec<EntryId> = tracker
            .entries()
            .filter(|e| {
                e.entity().name() == dependent
                    && e.state() != EntityState::Deleted
                    && self.entry.foreign_key.references(e.values(), self.values)
            })
            .map(|e| e.id())
            .collect();

        for id in matches {
            if tracker.null_column(id, &self.entry.column)? {
                self.record(tracker, id, CascadeSource::InMemory, report);
            }
        }
        Ok(())
    }

    fn null_persisted(
        &self,
        tracker: &mut ChangeTracker,
        rows: &[Row],
        cancel: &CancellationToken,
        report: &mut CascadeReport,
    ) -> ExResult<()> {
        let dependent = &self.entry.dependent;
        for row in rows {
            check_cancelled(cancel)?;

            // Tracked copies were judged by the in-memory scan
            let key = dependent.key_of(row);
            if tracker.find_id(dependent.name(), &key).is_some() {
                continue;
            }
            if !self.entry.foreign_key.references(row, self.values)
                || row.get(&self.entry.column).is_null()
            {
                continue;
            }

            let id = tracker.attach(dependent.clone(), row.clone())?;
            if tracker.null_column(id, &self.entry.column)? {
                self.record(tracker, id, CascadeSource::Persisted, report);
            }
        }
        Ok(())
    }

    fn record(
        &self,
        tracker: &ChangeTracker,
        id: EntryId,
        source: CascadeSource,
        report: &mut CascadeReport,
    ) {
        let key = tracker
            .get(id)
            .map(|e| e.key().clone())
            .unwrap_or_else(|| EntityKey::new(Vec::new()));
        tracing::debug!(
            dependent = self.entry.dependent.name(),
            column = %self.entry.column,
            foreign_key = %self.entry.foreign_key.name,
            key = %key,
            ?source,
            "dependent nulled"
        );
        report.nulled.push(NulledDependent {
            entity: self.entry.dependent.name().to_string(),
            key,
            column: self.entry.column.clone(),
            foreign_key: self.entry.foreign_key.name.clone(),
            principal: self.principal.clone(),
            source,
        });
    }
}

fn check_cancelled(cancel: &CancellationToken) -> ExResult<()> {
    if cancel.is_cancelled() {
        return Err(TenancyError::Cancelled {
            op: "cascade".to_string(),
        }
        .into());
    }
    Ok(())
}
