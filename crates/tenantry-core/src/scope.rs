//! Ambient tenant scope
//!
//! Holds the current `TenantId` for one logical flow without threading it
//! through every call. Three storage slots back the scope:
//!
//! - a tokio task-local, active inside `TenantScope::flow`, `run`, `with`,
//!   and every task or thread started through `spawn*`. It follows the flow
//!   across `.await` points and worker-thread migration.
//! - a per-task table keyed by `tokio::task::Id`, used by runtime tasks
//!   that never entered a flow. Sibling tasks sharing a worker thread, and
//!   tasks migrating between workers, each keep their own value.
//! - a thread-local, used by plain threads outside any runtime task.
//!
//! Child flows started with `spawn`, `spawn_blocking` or `spawn_thread`
//! receive a copy of the parent's value at spawn time; later changes on
//! either side stay invisible to the other.
//!
//! A task-table entry lives until `clear` or the owning guard's drop removes
//! it. Task ids are never reused, so a stale entry is never read by another
//! task.

use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::{Mutex, MutexGuard, OnceLock};

use tenantry_core_types::TenantId;
use tokio::task::{Id as TaskId, JoinHandle};

use crate::errors::{Result, TenancyError};

tokio::task_local! {
    static FLOW_TENANT: RefCell<Option<TenantId>>;
}

thread_local! {
    static THREAD_TENANT: RefCell<Option<TenantId>> = const { RefCell::new(None) };
}

static TASK_TENANTS: OnceLock<Mutex<HashMap<TaskId, TenantId>>> = OnceLock::new();

fn task_tenants() -> MutexGuard<'static, HashMap<TaskId, TenantId>> {
    TASK_TENANTS
        .get_or_init(Default::default)
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Flow,
    Task(TaskId),
    Thread,
}

fn slot() -> Slot {
    if FLOW_TENANT.try_with(|_| ()).is_ok() {
        return Slot::Flow;
    }
    match tokio::task::try_id() {
        Some(id) => Slot::Task(id),
        None => Slot::Thread,
    }
}

fn read() -> Option<TenantId> {
    match slot() {
        Slot::Flow => FLOW_TENANT.try_with(|cell| *cell.borrow()).ok().flatten(),
        Slot::Task(id) => task_tenants().get(&id).copied(),
        Slot::Thread => THREAD_TENANT.with(|cell| *cell.borrow()),
    }
}

fn write(value: Option<TenantId>) -> Slot {
    let slot = slot();
    store(slot, value);
    slot
}

fn store(slot: Slot, value: Option<TenantId>) {
    match slot {
        Slot::Flow => {
            // The flow may already have ended (guard outlived `with`)
            let _ = FLOW_TENANT.try_with(|cell| *cell.borrow_mut() = value);
        }
        Slot::Task(id) => {
            let mut tenants = task_tenants();
            match value {
                Some(tenant) => tenants.insert(id, tenant),
                None => tenants.remove(&id),
            };
        }
        Slot::Thread => THREAD_TENANT.with(|cell| *cell.borrow_mut() = value),
    }
}

/// Entry points of the ambient tenant scope
pub struct TenantScope;

impl TenantScope {
    /// Set the tenant for the remainder of the current flow
    pub fn set_current(tenant: TenantId) {
        let slot = write(Some(tenant));
        tracing::trace!(tenant_id = %tenant, ?slot, "tenant set");
    }

    /// The current tenant
    ///
    /// # Errors
    ///
    /// `MissingContext` when no tenant is set in this flow.
    pub fn current() -> Result<TenantId> {
        read().ok_or(TenancyError::MissingContext)
    }

    /// The current tenant, if any
    pub fn current_or_default() -> Option<TenantId> {
        read()
    }

    /// Remove the tenant from the current flow
    pub fn clear() {
        write(None);
    }

    /// Set `tenant` and return a guard that clears it when dropped
    ///
    /// The guard is `!Send`; in async code prefer `run`, which scopes the
    /// value to a future instead.
    #[must_use = "the tenant is cleared as soon as the guard is dropped"]
    pub fn begin(tenant: TenantId) -> TenantGuard {
        let slot = write(Some(tenant));
        TenantGuard {
            slot,
            _not_send: PhantomData,
        }
    }

    /// Run `fut` as a new flow whose tenant starts as `tenant`
    ///
    /// The value is gone once `fut` completes, whatever its outcome.
    pub fn run<F>(tenant: TenantId, fut: F) -> impl Future<Output = F::Output>
    where
        F: Future,
    {
        FLOW_TENANT.scope(RefCell::new(Some(tenant)), fut)
    }

    /// Run `f` synchronously as a new flow whose tenant starts as `tenant`
    pub fn with<F, R>(tenant: TenantId, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        FLOW_TENANT.sync_scope(RefCell::new(Some(tenant)), f)
    }

    /// Wrap `fut` in a new flow that inherits a copy of the current tenant
    pub fn flow<F>(fut: F) -> impl Future<Output = F::Output>
    where
        F: Future,
    {
        FLOW_TENANT.scope(RefCell::new(read()), fut)
    }

    /// Spawn a tokio task that inherits a copy of the current tenant
    pub fn spawn<F>(fut: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        tokio::spawn(Self::flow(fut))
    }

    /// Run blocking work on tokio's blocking pool with a copy of the current tenant
    pub fn spawn_blocking<F, R>(f: F) -> JoinHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let inherited = read();
        tokio::task::spawn_blocking(move || FLOW_TENANT.sync_scope(RefCell::new(inherited), f))
    }

    /// Start an OS thread with a copy of the current tenant
    pub fn spawn_thread<F, R>(f: F) -> std::thread::JoinHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let inherited = read();
        std::thread::spawn(move || FLOW_TENANT.sync_scope(RefCell::new(inherited), f))
    }
}

/// Clears the tenant it was created with when dropped
pub struct TenantGuard {
    slot: Slot,
    _not_send: PhantomData<*const ()>,
}

impl Drop for TenantGuard {
    fn drop(&mut self) {
        store(self.slot, None);
    }
}
