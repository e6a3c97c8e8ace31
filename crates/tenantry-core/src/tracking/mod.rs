//! Tracked entities of one unit of work

pub mod state;
pub mod tracker;

pub use state::{EntityState, StateEvent, Transition};
pub use tracker::{ChangeTracker, EntryId, TrackedEntry};
