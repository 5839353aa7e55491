//! Selection optimizer - the budget-constrained admission pass.
//!
//! A pure, stateless computation over a snapshot of candidates. Safe to run
//! concurrently for any number of contexts; persistence of the resulting
//! selection is the sync coordinator's decision, never this module's.

use ballast_core::{
    ContextId, OptimizerError, PlanEntry, PlanReason, TokenBudgetPlan,
};

/// One scored, token-costed candidate for admission.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub content_id: ballast_core::ContentId,
    pub tokens: i32,
    pub relevance: f32,
    pub position: i32,
    /// Selection explicitly forced by a user action; bypasses ranking.
    pub pinned: bool,
    /// Hierarchy distance from the querying context (0 = own item).
    pub inherited_distance: u32,
}

impl Candidate {
    /// Create a candidate with default position, unpinned, own-context.
    pub fn new(content_id: ballast_core::ContentId, tokens: i32, relevance: f32) -> Self {
        Self {
            content_id,
            tokens,
            relevance,
            position: 0,
            pinned: false,
            inherited_distance: 0,
        }
    }

    /// Set the manual position tie-break.
    pub fn with_position(mut self, position: i32) -> Self {
        self.position = position;
        self
    }

    /// Mark the candidate as pinned.
    pub fn with_pinned(mut self, pinned: bool) -> Self {
        self.pinned = pinned;
        self
    }

    /// Tag the candidate with its hierarchy distance.
    pub fn with_distance(mut self, inherited_distance: u32) -> Self {
        self.inherited_distance = inherited_distance;
        self
    }
}

/// Ranking knobs for one optimization pass.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerOptions {
    /// Rankable candidates strictly below this effective relevance are
    /// excluded (0.0 disables).
    pub relevance_threshold: f32,
    /// Per-level relevance multiplier for inherited candidates (1.0 disables).
    pub inheritance_dampening: f32,
}

impl Default for OptimizerOptions {
    fn default() -> Self {
        Self {
            relevance_threshold: 0.0,
            inheritance_dampening: 1.0,
        }
    }
}

/// Relevance after inheritance dampening; this is the ranking key.
pub fn effective_relevance(candidate: &Candidate, dampening: f32) -> f32 {
    candidate.relevance * dampening.powi(candidate.inherited_distance as i32)
}

/// Produce the admitted subset plus ordering for a candidate set and budget.
///
/// Policy:
/// 1. Pinned candidates are admitted first, in ascending position order.
///    Once one fails to fit, the budget counts as exhausted for pinned
///    admission: it and every remaining pinned candidate is excluded with
///    `BudgetExceededByPinned` and the plan is marked truncated.
/// 2. Rankable candidates are sorted by effective relevance descending, then
///    position ascending, then content id ascending, and admitted greedily.
/// 3. A rankable candidate larger than the entire remaining budget is
///    skipped, and evaluation continues with smaller items further down the
///    ranking. This is a bin-packing relaxation, not a prefix cut.
///
/// All tie-breaks are total, so identical input yields a byte-identical plan.
pub fn optimize(
    context_id: ContextId,
    candidates: &[Candidate],
    token_budget: i32,
    options: &OptimizerOptions,
) -> Result<TokenBudgetPlan, OptimizerError> {
    if token_budget <= 0 {
        return Err(OptimizerError::InvalidBudget {
            budget: token_budget,
        });
    }

    let mut plan = TokenBudgetPlan::new(context_id, token_budget);
    plan.total_available_tokens = candidates.iter().map(|c| c.tokens).sum();

    let (mut pinned, mut rankable): (Vec<&Candidate>, Vec<&Candidate>) =
        candidates.iter().partition(|c| c.pinned);

    pinned.sort_by(|a, b| {
        a.position
            .cmp(&b.position)
            .then_with(|| a.content_id.cmp(&b.content_id))
    });

    let mut pinned_exhausted = false;
    for candidate in pinned {
        let relevance = effective_relevance(candidate, options.inheritance_dampening);
        if !pinned_exhausted && candidate.tokens <= plan.remaining_tokens() {
            plan.push_outcome(PlanEntry {
                content_id: candidate.content_id,
                tokens: candidate.tokens,
                relevance,
                included: true,
                reason: PlanReason::Pinned,
            });
        } else {
            pinned_exhausted = true;
            plan.truncated = true;
            plan.push_outcome(PlanEntry {
                content_id: candidate.content_id,
                tokens: candidate.tokens,
                relevance,
                included: false,
                reason: PlanReason::BudgetExceededByPinned,
            });
        }
    }

    rankable.sort_by(|a, b| {
        let rel_a = effective_relevance(a, options.inheritance_dampening);
        let rel_b = effective_relevance(b, options.inheritance_dampening);
        rel_b
            .total_cmp(&rel_a)
            .then_with(|| a.position.cmp(&b.position))
            .then_with(|| a.content_id.cmp(&b.content_id))
    });

    for candidate in rankable {
        let relevance = effective_relevance(candidate, options.inheritance_dampening);
        let reason = if options.relevance_threshold > 0.0 && relevance < options.relevance_threshold
        {
            PlanReason::BelowThreshold
        } else if candidate.tokens > plan.remaining_tokens() {
            PlanReason::ExceedsRemainingBudget
        } else {
            PlanReason::Ranked
        };
        plan.push_outcome(PlanEntry {
            content_id: candidate.content_id,
            tokens: candidate.tokens,
            relevance,
            included: reason == PlanReason::Ranked,
            reason,
        });
    }

    Ok(plan)
}

// ============================================================================
// TESTS
// ============================================================================


// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================

#[cfg(test)]
mod prop_tests {
    use super::*;
    use ballast_core::new_entity_id;
    use proptest::prelude::*;

    fn arb_candidate() -> impl Strategy<Value = Candidate> {
        (
            any::<[u8; 16]>(),
            1i32..2000,
            0.0f32..=1.0,
            -100i32..100,
            any::<bool>(),
            0u32..4,
        )
            .prop_map(|(id_bytes, tokens, relevance, position, pinned, distance)| {
                Candidate {
                    content_id: uuid::Uuid::from_bytes(id_bytes),
                    tokens,
                    relevance,
                    position,
                    pinned,
                    inherited_distance: distance,
                }
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Selected tokens never exceed the budget; excess pinned items are
        /// excluded, never silently included.
        #[test]
        fn prop_budget_respected(
            candidates in prop::collection::vec(arb_candidate(), 0..30),
            budget in 1i32..3000,
        ) {
            let plan = optimize(new_entity_id(), &candidates, budget, &OptimizerOptions::default())
                .unwrap();
            prop_assert!(plan.total_selected_tokens <= budget);
            let excluded_pinned = plan
                .entries
                .iter()
                .any(|e| e.reason == ballast_core::PlanReason::BudgetExceededByPinned);
            prop_assert_eq!(plan.truncated, excluded_pinned);
        }

        /// Calling optimize twice on the same snapshot yields identical plans.
        #[test]
        fn prop_idempotent(
            candidates in prop::collection::vec(arb_candidate(), 0..30),
            budget in 1i32..3000,
        ) {
            let context_id = new_entity_id();
            let options = OptimizerOptions::default();
            let first = optimize(context_id, &candidates, budget, &options).unwrap();
            let second = optimize(context_id, &candidates, budget, &options).unwrap();
            prop_assert_eq!(
                serde_json::to_string(&first).unwrap(),
                serde_json::to_string(&second).unwrap()
            );
        }

        /// No excluded rankable item could have fit by removing one
        /// lower-ranked admitted item (the bin-packing relaxation bound).
        #[test]
        fn prop_no_wrongly_starved_candidate(
            candidates in prop::collection::vec(arb_candidate(), 0..30),
            budget in 1i32..3000,
        ) {
            let plan = optimize(new_entity_id(), &candidates, budget, &OptimizerOptions::default())
                .unwrap();
            let remaining = plan.remaining_tokens();

            // Walk rankable entries in plan (= rank) order.
            let rankable: Vec<_> = plan
                .entries
                .iter()
                .filter(|e| {
                    e.reason == ballast_core::PlanReason::Ranked
                        || e.reason == ballast_core::PlanReason::ExceedsRemainingBudget
                })
                .collect();
            for (i, excluded) in rankable.iter().enumerate() {
                if excluded.included {
                    continue;
                }
                for admitted in rankable.iter().skip(i + 1).filter(|e| e.included) {
                    prop_assert!(
                        excluded.tokens > remaining + admitted.tokens,
                        "excluded item of {} tokens would fit by evicting a lower-ranked \
                         admitted item of {} tokens ({} remaining)",
                        excluded.tokens,
                        admitted.tokens,
                        remaining
                    );
                }
            }
        }
    }
}
