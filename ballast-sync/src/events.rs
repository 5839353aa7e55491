//! Events pushed to the external notification layer.
//!
//! Failures and recomputed plans are pushed, not polled: the coordinator
//! broadcasts and any number of subscribers (UI sessions, audit sinks)
//! receive their own copy.

use ballast_core::{ContentId, ContextId, EntityId, TokenBudgetPlan};
use serde::{Deserialize, Serialize};

/// An event emitted by the sync coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SyncEvent {
    /// A relevance write was rejected; the optimistic value was rolled back.
    RelevanceUpdateFailed {
        context_id: ContextId,
        content_id: ContentId,
        attempted: f32,
        rolled_back_to: f32,
        actor_id: Option<EntityId>,
        reason: String,
    },
    /// A selection write was rejected; the optimistic value was rolled back.
    SelectionUpdateFailed {
        context_id: ContextId,
        content_id: ContentId,
        attempted: bool,
        rolled_back_to: bool,
        actor_id: Option<EntityId>,
        reason: String,
    },
    /// A coalesced recompute produced a fresh plan for a context.
    PlanRecomputed {
        context_id: ContextId,
        plan: TokenBudgetPlan,
    },
    /// A coalesced recompute failed.
    RecomputeFailed {
        context_id: ContextId,
        reason: String,
    },
}

impl SyncEvent {
    /// The context this event concerns.
    pub fn context_id(&self) -> ContextId {
        match self {
            SyncEvent::RelevanceUpdateFailed { context_id, .. }
            | SyncEvent::SelectionUpdateFailed { context_id, .. }
            | SyncEvent::PlanRecomputed { context_id, .. }
            | SyncEvent::RecomputeFailed { context_id, .. } => *context_id,
        }
    }

    /// Whether the event reports a rolled-back optimistic update.
    pub fn is_rollback(&self) -> bool {
        matches!(
            self,
            SyncEvent::RelevanceUpdateFailed { .. } | SyncEvent::SelectionUpdateFailed { .. }
        )
    }
}
