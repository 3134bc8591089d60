//! Client-held mirror of the assignment table.
//!
//! The grid reads [`AssignmentIndex`] synchronously once per visible cell.
//! Three things write to it: [`MutationCoordinator`] after a confirmed place
//! or delete, explicit loads, and [`InvalidationListener`] when a sibling
//! entity (subject, teacher, group, classroom) changes and the denormalized
//! fields may be stale.

mod coordinator;
mod error;
mod index;
mod listener;
mod model;
mod payload;
mod service;

#[cfg(test)]
mod testing;

pub use coordinator::{MutationCoordinator, PlaceOutcome};
pub use error::CacheError;
pub use index::{AssignmentIndex, IndexState, LoadOutcome, Snapshot};
pub use listener::{ChangeBus, InvalidationListener, Topic};
pub use model::{AssignmentRecord, CacheEntry, CacheKey, Day};
pub use payload::DropPayload;
pub use service::{AssignmentService, PlaceRequest};
