//! Ballast Sync - Optimistic Update Coordination
//!
//! Keeps client-visible selection state consistent with server-confirmed
//! state under concurrent, possibly-failing updates: per-key serialization,
//! debounced relevance writes, rollback on rejection, and coalesced plan
//! recomputes, with failures pushed to subscribers.

mod coordinator;
mod events;

pub use coordinator::{SelectionOutcome, SyncCoordinator};
pub use events::SyncEvent;
