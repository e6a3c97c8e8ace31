//! Unit of work over a tenant connection
//!
//! A `DbContext` owns one connection and one change tracker. Entities are
//! added, loaded, edited and removed in memory; `save_changes` runs the
//! cascade and writes the result atomically.

#![allow(clippy::result_large_err)]

use std::sync::Arc;

use serde::Serialize;
use tenantry_core::cascade::{CascadeEngine, CascadeReport};
use tenantry_core::errors::TenancyError;
use tenantry_core::model::{EntityKey, Row, Schema};
use tenantry_core::tracking::{ChangeTracker, EntityState, EntryId, TrackedEntry};
use tenantry_core::{log_op_end, log_op_error, log_op_start, TenantScope};
use tenantry_store::config::StoreConfig;
use tenantry_store::connection::TenantConnection;
use tenantry_store::ddl;
use tenantry_store::errors::Result;
use tenantry_store::repo::{RepoSource, SqliteRepo};
use tokio_util::sync::CancellationToken;

use crate::plan::WritePlan;

/// What one `save_changes` wrote
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SaveOutcome {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
    pub cascade: CascadeReport,
}

impl SaveOutcome {
    pub fn writes(&self) -> usize {
        self.inserted + self.updated + self.deleted
    }
}

pub struct DbContext {
    schema: Arc<Schema>,
    conn: TenantConnection,
    tracker: ChangeTracker,
    cascade: CascadeEngine,
}

impl DbContext {
    /// Create a unit of work on `conn`
    ///
    /// # Errors
    ///
    /// `InvalidCascadeMarker` if the schema's markers do not form a valid
    /// dependency index.
    pub fn new(schema: Arc<Schema>, conn: TenantConnection) -> Result<Self> {
        schema.dependency_index()?;
        Ok(Self {
            cascade: CascadeEngine::new(schema.clone()),
            schema,
            conn,
            tracker: ChangeTracker::new(),
        })
    }

    /// Open a connection from `config` and create a unit of work on it
    pub fn open(schema: Arc<Schema>, config: &StoreConfig) -> Result<Self> {
        Self::new(schema, TenantConnection::open(config)?)
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn connection(&self) -> &TenantConnection {
        &self.conn
    }

    pub fn tracker(&self) -> &ChangeTracker {
        &self.tracker
    }

    /// Create any missing tables of the schema
    pub fn ensure_tables(&self) -> Result<()> {
        ddl::create_tables(&self.conn, &self.schema)
    }

    /// Track a new entity of type `entity`
    pub fn add(&mut self, entity: &str, values: Row) -> Result<EntryId> {
        let entity = self.schema.require(entity)?.clone();
        Ok(self.tracker.add(entity, values)?)
    }

    /// Track an entity known to exist in the store
    pub fn attach(&mut self, entity: &str, values: Row) -> Result<EntryId> {
        let entity = self.schema.require(entity)?.clone();
        Ok(self.tracker.attach(entity, values)?)
    }

    pub fn update(&mut self, id: EntryId, changes: Row) -> Result<()> {
        Ok(self.tracker.update(id, changes)?)
    }

    /// Mark a tracked entity for deletion
    pub fn remove(&mut self, id: EntryId) -> Result<()> {
        Ok(self.tracker.remove(id)?)
    }

    /// Find an entity by primary key
    ///
    /// A tracked entity is returned as is, whatever its state. Otherwise the
    /// row is loaded from the store and attached as Unchanged.
    pub fn find(&mut self, entity: &str, key: &EntityKey) -> Result<Option<EntryId>> {
        let entity = self.schema.require(entity)?.clone();
        entity.check_key(key)?;
        if let Some(id) = self.tracker.find_id(entity.name(), key) {
            return Ok(Some(id));
        }
        match SqliteRepo::find(&self.conn, &entity, key)? {
            Some(row) => Ok(Some(self.tracker.attach(entity, row)?)),
            None => Ok(None),
        }
    }

    /// Every stored row of `entity`, without tracking them
    pub fn query_all(&self, entity: &str) -> Result<Vec<Row>> {
        let entity = self.schema.require(entity)?;
        SqliteRepo::fetch_all(&self.conn, entity)
    }

    /// Stored rows of `entity` owned by the current tenant, without tracking them
    ///
    /// The filter is evaluated by the store against the session tenant.
    pub fn query_current_tenant(&self, entity: &str) -> Result<Vec<Row>> {
        let entity = self.schema.require(entity)?;
        SqliteRepo::fetch_for_session_tenant(&self.conn, entity)
    }

    pub fn entry(&self, id: EntryId) -> Option<&TrackedEntry> {
        self.tracker.get(id)
    }

    /// Current values of a tracked entity
    pub fn values(&self, id: EntryId) -> Option<&Row> {
        self.tracker.get(id).map(TrackedEntry::values)
    }

    pub fn state_of(&self, id: EntryId) -> Option<EntityState> {
        self.tracker.state_of(id)
    }

    pub fn entries(&self) -> impl Iterator<Item = &TrackedEntry> {
        self.tracker.entries()
    }

    pub fn has_changes(&self) -> bool {
        self.tracker.has_changes()
    }

    /// Save every pending change
    ///
    /// See `save_changes_with`.
    pub fn save_changes(&mut self) -> Result<SaveOutcome> {
        self.save_changes_with(&CancellationToken::new())
    }

    /// Save every pending change, stopping if `cancel` fires
    ///
    /// Runs the SET NULL cascade for pending deletes, then writes inserts,
    /// updates (cascade nulls included) and deletes in one transaction. On
    /// success the tracker accepts the changes: deleted entities are
    /// detached and the rest become Unchanged.
    ///
    /// # Errors
    ///
    /// Any failure rolls the transaction back. The tracker is not accepted,
    /// so staged changes, including cascade nulls, are still pending and a
    /// later save retries them.
    pub fn save_changes_with(&mut self, cancel: &CancellationToken) -> Result<SaveOutcome> {
        let tenant = TenantScope::current_or_default().map(|t| t.to_string());
        log_op_start!(
            "save_changes",
            tenant_id = tenant.as_deref(),
            tracked = self.tracker.len()
        );
        let start = std::time::Instant::now();

        let outcome = self.save_changes_impl(cancel).map_err(|e| {
            log_op_error!(
                "save_changes",
                e.clone(),
                duration_ms = start.elapsed().as_millis() as u64
            );
            e
        })?;

        log_op_end!(
            "save_changes",
            duration_ms = start.elapsed().as_millis() as u64,
            writes = outcome.writes(),
            nulled = outcome.cascade.len()
        );

        Ok(outcome)
    }

    fn save_changes_impl(&mut self, cancel: &CancellationToken) -> Result<SaveOutcome> {
        let cascade = {
            let mut source = RepoSource::new(&self.conn);
            self.cascade.run(&mut self.tracker, &mut source, cancel)?
        };
        match serde_json::to_string(&cascade) {
            Ok(report) => tracing::debug!(nulled = cascade.len(), report = %report, "cascade staged"),
            Err(e) => tracing::debug!(nulled = cascade.len(), error = %e, "cascade report not serializable"),
        }

        let plan = WritePlan::from_tracker(&self.tracker);
        if cancel.is_cancelled() {
            return Err(TenancyError::Cancelled {
                op: "save_changes".to_string(),
            }
            .into());
        }

        let generated = if plan.is_empty() {
            Default::default()
        } else {
            self.conn.transaction(|conn| plan.apply(conn, cancel))?
        };
        self.tracker.accept_changes(generated)?;

        Ok(SaveOutcome {
            inserted: plan.inserts(),
            updated: plan.updates(),
            deleted: plan.deletes(),
            cascade,
        })
    }
}

impl std::fmt::Debug for DbContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbContext")
            .field("schema_version", &self.schema.version())
            .field("tracked", &self.tracker.len())
            .finish()
    }
}
