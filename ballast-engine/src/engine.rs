//! The optimization engine facade.
//!
//! Wires the store, hierarchy manager, relevance model and ingestion surface
//! behind one config-validated entry point. `optimize` itself is a pure pass
//! over a snapshot; store reads are its only suspension points, each bounded
//! by the configured timeout and retried with backoff when the upstream is
//! unavailable.

use crate::hierarchy::HierarchyManager;
use crate::ingest::ContentIngest;
use crate::optimizer::{self, Candidate, OptimizerOptions};
use crate::relevance::RelevanceModel;
use ballast_core::{
    BallastResult, ContentId, ContentItem, Context, ContextId, EngineConfig, EntityType,
    GraphError, PlanEntry, PlanReason, ProjectId, TokenBudgetPlan, TokenError,
    UnknownContentPolicy,
};
use ballast_store::{with_read_retry, GraphStore};
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// The context optimization engine.
///
/// Cheap to share behind an `Arc`; all methods take `&self` and the engine
/// holds no per-call state, so any number of contexts can be optimized
/// concurrently without coordination.
pub struct OptimizationEngine<S> {
    store: Arc<S>,
    config: EngineConfig,
    hierarchy: HierarchyManager<S>,
    relevance: RelevanceModel<S>,
    ingest: ContentIngest<S>,
}

impl<S: GraphStore> OptimizationEngine<S> {
    /// Create an engine over a store. Fails when the configuration is invalid.
    pub fn new(store: Arc<S>, config: EngineConfig) -> BallastResult<Self> {
        config.validate()?;
        let hierarchy = HierarchyManager::new(Arc::clone(&store), config.max_hierarchy_depth);
        let relevance = RelevanceModel::new(Arc::clone(&store));
        let ingest = ContentIngest::new(Arc::clone(&store), config.unknown_content);
        Ok(Self {
            store,
            config,
            hierarchy,
            relevance,
            ingest,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<S> {
        Arc::clone(&self.store)
    }

    pub fn hierarchy(&self) -> &HierarchyManager<S> {
        &self.hierarchy
    }

    pub fn relevance(&self) -> &RelevanceModel<S> {
        &self.relevance
    }

    pub fn ingest(&self) -> &ContentIngest<S> {
        &self.ingest
    }

    /// Run one optimization pass for a context.
    ///
    /// The budget resolves in order: explicit argument, the context's
    /// `token_budget` setting, the engine default. The effective candidate
    /// set is derived per the configured inheritance policy; the candidate's
    /// *effective* selection (pending value if present) decides pinning, so
    /// an optimistic selection influences the plan immediately.
    pub async fn optimize(
        &self,
        context_id: ContextId,
        token_budget: Option<i32>,
    ) -> BallastResult<TokenBudgetPlan> {
        let context = with_read_retry(&self.config.retry, || self.fetch_context(context_id))
            .await?;
        let budget = token_budget
            .or(context.settings.token_budget)
            .unwrap_or(self.config.token_budget);

        let policy = self.config.inheritance_policy;
        let effective = with_read_retry(&self.config.retry, || {
            self.timed(self.hierarchy.effective_candidates(context_id, policy))
        })
        .await?;

        let mut candidates = Vec::with_capacity(effective.len());
        let mut flagged = Vec::new();
        for candidate in &effective {
            let content = with_read_retry(&self.config.retry, || {
                self.fetch_content(candidate.item.content_id)
            })
            .await?;
            match content.tokens {
                Some(tokens) => candidates.push(
                    Candidate::new(content.content_id, tokens, candidate.item.relevance_score)
                        .with_position(candidate.item.position)
                        .with_pinned(candidate.item.effective_selected())
                        .with_distance(candidate.distance),
                ),
                None => match self.config.unknown_content {
                    UnknownContentPolicy::Reject => {
                        return Err(TokenError::UnsupportedContentType {
                            kind: content.content_type.to_string(),
                        }
                        .into());
                    }
                    UnknownContentPolicy::SkipAndFlag => {
                        flagged.push((content.content_id, candidate.item.relevance_score));
                    }
                },
            }
        }

        let options = OptimizerOptions {
            relevance_threshold: context
                .settings
                .relevance_threshold
                .unwrap_or(self.config.relevance_threshold),
            inheritance_dampening: self.config.inheritance_dampening,
        };
        let mut plan = optimizer::optimize(context_id, &candidates, budget, &options)?;

        for (content_id, relevance) in flagged {
            plan.push_outcome(PlanEntry {
                content_id,
                tokens: 0,
                relevance,
                included: false,
                reason: PlanReason::UnsupportedContent,
            });
        }

        debug!(
            context = %context_id,
            budget,
            admitted = plan.admitted_ids().len(),
            selected_tokens = plan.total_selected_tokens,
            truncated = plan.truncated,
            "optimization pass complete"
        );
        Ok(plan)
    }

    /// Clone a context (optionally with its sub-contexts) into a project.
    pub async fn clone_context(
        &self,
        context_id: ContextId,
        target_project_id: ProjectId,
        new_name: impl Into<String>,
        recurse: bool,
    ) -> BallastResult<ContextId> {
        self.hierarchy
            .clone_context(context_id, target_project_id, new_name, recurse)
            .await
    }

    /// Materialize a project's context hierarchy.
    pub async fn project_hierarchy(
        &self,
        project_id: ProjectId,
    ) -> BallastResult<Vec<crate::hierarchy::ContextTree>> {
        self.hierarchy.project_tree(project_id).await
    }

    async fn fetch_context(&self, context_id: ContextId) -> BallastResult<Context> {
        self.timed(self.store.context_get(context_id))
            .await?
            .ok_or_else(|| {
                GraphError::NotFound {
                    entity_type: EntityType::Context,
                    id: context_id,
                }
                .into()
            })
    }

    async fn fetch_content(&self, content_id: ContentId) -> BallastResult<ContentItem> {
        self.timed(self.store.content_get(content_id))
            .await?
            .ok_or_else(|| {
                GraphError::NotFound {
                    entity_type: EntityType::ContentItem,
                    id: content_id,
                }
                .into()
            })
    }

    /// Bound a store call by the configured timeout.
    async fn timed<T>(&self, fut: impl Future<Output = BallastResult<T>>) -> BallastResult<T> {
        match tokio::time::timeout(self.config.store_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(GraphError::Unavailable {
                reason: format!(
                    "store call timed out after {:?}",
                    self.config.store_timeout
                ),
            }
            .into()),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
