//! Relevance model - explicit scores per (context, content) pair.
//!
//! Scores are user/system input, not inference output; the engine only
//! consumes and updates them. Writes are last-writer-wins at this layer;
//! serializing rapid concurrent updates is the sync coordinator's job.

use ballast_core::{
    BallastResult, ContentId, ContextId, RelevanceError, DEFAULT_RELEVANCE,
};
use ballast_store::{ContextItemUpdate, GraphStore};
use std::sync::Arc;

/// Validate a relevance score.
pub fn validate_score(score: f32) -> Result<(), RelevanceError> {
    if score.is_nan() || !(0.0..=1.0).contains(&score) {
        return Err(RelevanceError::OutOfRange { score });
    }
    Ok(())
}

/// Reads and writes relevance scores through the graph store.
pub struct RelevanceModel<S> {
    store: Arc<S>,
}

impl<S: GraphStore> RelevanceModel<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Get the score for a pair, defaulting to 0.5 when unset.
    pub async fn score(&self, context_id: ContextId, content_id: ContentId) -> BallastResult<f32> {
        Ok(self
            .store
            .context_item_get(context_id, content_id)
            .await?
            .map(|item| item.relevance_score)
            .unwrap_or(DEFAULT_RELEVANCE))
    }

    /// Replace the score for a pair.
    ///
    /// Fails with `OutOfRange` for scores outside [0, 1] before touching the
    /// store.
    pub async fn set_score(
        &self,
        context_id: ContextId,
        content_id: ContentId,
        score: f32,
    ) -> BallastResult<()> {
        validate_score(score)?;
        self.store
            .context_item_update(
                context_id,
                content_id,
                ContextItemUpdate {
                    relevance_score: Some(score),
                    ..Default::default()
                },
            )
            .await
    }
}

// ============================================================================
// TESTS
// ============================================================================
