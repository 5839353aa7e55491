//! Token budget plan - the output of one optimization pass.
//!
//! Plans are ephemeral: they are returned to the caller and never persisted.
//! A plan contains no wall-clock data so that identical inputs produce
//! byte-identical plans across repeated runs.

use crate::{ContentId, ContextId, PlanReason};
use serde::{Deserialize, Serialize};

/// One candidate's outcome in a plan, in evaluation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanEntry {
    pub content_id: ContentId,
    /// Cached token cost at evaluation time (0 when the cost was unknown).
    pub tokens: i32,
    /// Effective relevance used for ranking (after inheritance dampening).
    pub relevance: f32,
    pub included: bool,
    pub reason: PlanReason,
}

/// Action recorded in the plan's audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlanAction {
    /// Candidate admitted, consuming budget
    Admit,
    /// Candidate skipped, evaluation continued with smaller items
    Skip,
    /// Candidate excluded outright
    Exclude,
}

/// Decision made during an optimization pass, for the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDecision {
    pub action: PlanAction,
    pub content_id: ContentId,
    pub reason: PlanReason,
    /// Tokens consumed by this decision (0 for skips and exclusions).
    pub tokens_affected: i32,
}

/// The admitted subset plus ordering produced by one optimization run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenBudgetPlan {
    pub context_id: ContextId,
    pub token_budget: i32,
    /// Entries in evaluation order: pinned by position first, then rankable
    /// by effective relevance.
    pub entries: Vec<PlanEntry>,
    pub total_selected_tokens: i32,
    pub total_available_tokens: i32,
    /// True iff pinned items alone exhausted the budget and some pinned items
    /// had to be excluded.
    pub truncated: bool,
    /// Full audit trail of admit/skip/exclude decisions.
    pub decisions: Vec<PlanDecision>,
}

impl TokenBudgetPlan {
    /// Create an empty plan for a context and budget.
    pub fn new(context_id: ContextId, token_budget: i32) -> Self {
        Self {
            context_id,
            token_budget,
            entries: Vec::new(),
            total_selected_tokens: 0,
            total_available_tokens: 0,
            truncated: false,
            decisions: Vec::new(),
        }
    }

    /// Remaining budget after the admitted entries.
    pub fn remaining_tokens(&self) -> i32 {
        self.token_budget - self.total_selected_tokens
    }

    /// Ids of the admitted entries, in plan order.
    pub fn admitted_ids(&self) -> Vec<ContentId> {
        self.entries
            .iter()
            .filter(|e| e.included)
            .map(|e| e.content_id)
            .collect()
    }

    /// Whether a specific content item was admitted.
    pub fn is_admitted(&self, content_id: ContentId) -> bool {
        self.entries
            .iter()
            .any(|e| e.included && e.content_id == content_id)
    }

    /// Record a decision and its matching entry.
    pub fn push_outcome(&mut self, entry: PlanEntry) {
        let action = if entry.included {
            PlanAction::Admit
        } else if entry.reason == PlanReason::ExceedsRemainingBudget {
            PlanAction::Skip
        } else {
            PlanAction::Exclude
        };
        self.decisions.push(PlanDecision {
            action,
            content_id: entry.content_id,
            reason: entry.reason,
            tokens_affected: if entry.included { entry.tokens } else { 0 },
        });
        if entry.included {
            self.total_selected_tokens += entry.tokens;
        }
        self.entries.push(entry);
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::new_entity_id;

    fn entry(tokens: i32, included: bool, reason: PlanReason) -> PlanEntry {
        PlanEntry {
            content_id: new_entity_id(),
            tokens,
            relevance: 0.5,
            included,
            reason,
        }
    }

    #[test]
    fn test_push_outcome_tracks_totals() {
        let mut plan = TokenBudgetPlan::new(new_entity_id(), 100);
        plan.push_outcome(entry(40, true, PlanReason::Pinned));
        plan.push_outcome(entry(90, false, PlanReason::ExceedsRemainingBudget));
        plan.push_outcome(entry(30, true, PlanReason::Ranked));

        assert_eq!(plan.total_selected_tokens, 70);
        assert_eq!(plan.remaining_tokens(), 30);
        assert_eq!(plan.admitted_ids().len(), 2);
        assert_eq!(plan.decisions.len(), 3);
        assert_eq!(plan.decisions[1].action, PlanAction::Skip);
        assert_eq!(plan.decisions[1].tokens_affected, 0);
    }

    #[test]
    fn test_excluded_pinned_is_an_exclude_action() {
        let mut plan = TokenBudgetPlan::new(new_entity_id(), 10);
        plan.push_outcome(entry(20, false, PlanReason::BudgetExceededByPinned));
        assert_eq!(plan.decisions[0].action, PlanAction::Exclude);
        assert!(!plan.entries[0].included);
    }

    #[test]
    fn test_is_admitted() {
        let mut plan = TokenBudgetPlan::new(new_entity_id(), 100);
        let e = entry(10, true, PlanReason::Ranked);
        let id = e.content_id;
        plan.push_outcome(e);
        assert!(plan.is_admitted(id));
        assert!(!plan.is_admitted(new_entity_id()));
    }
}

// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================
