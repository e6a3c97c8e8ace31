//! Lifecycle state machine for tracked entities
//!
//! ```text
//! Unchanged --edit--> Modified      Added --edit--> Modified
//! any       --delete--> Deleted
//! Added | Modified | Unchanged --commit--> Unchanged
//! Deleted --commit--> detached
//! ```
//!
//! Edits to a Deleted entity are rejected; a deletion cannot be revived.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityState {
    Unchanged,
    Added,
    Modified,
    Deleted,
}

impl std::fmt::Display for EntityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EntityState::Unchanged => "Unchanged",
            EntityState::Added => "Added",
            EntityState::Modified => "Modified",
            EntityState::Deleted => "Deleted",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateEvent {
    /// Explicit update or cascade null-out
    Edit,
    /// Explicit delete
    Delete,
    /// Successful commit of the unit of work
    Commit,
}

impl std::fmt::Display for StateEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StateEvent::Edit => "edit",
            StateEvent::Delete => "delete",
            StateEvent::Commit => "commit",
        };
        f.write_str(s)
    }
}

/// Outcome of applying an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    To(EntityState),
    /// Stop tracking the entity
    Detach,
}

impl EntityState {
    /// Apply `event`, or `None` when the transition is not allowed
    pub fn apply(self, event: StateEvent) -> Option<Transition> {
        use EntityState::*;
        match (self, event) {
            (Unchanged | Added | Modified, StateEvent::Edit) => Some(Transition::To(Modified)),
            (Deleted, StateEvent::Edit) => None,
            (_, StateEvent::Delete) => Some(Transition::To(Deleted)),
            (Unchanged | Added | Modified, StateEvent::Commit) => Some(Transition::To(Unchanged)),
            (Deleted, StateEvent::Commit) => Some(Transition::Detach),
        }
    }

    /// Whether commit has to write this entity
    pub fn is_pending(self) -> bool {
        self != EntityState::Unchanged
    }
}
