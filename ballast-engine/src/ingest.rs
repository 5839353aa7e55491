//! Content ingestion - the engine-facing half of the attach/detach surface.
//!
//! The external collaborator owns the payload bytes; this module owns the
//! derived state: token cost, payload hash, version, and the join row that
//! makes content a candidate for a context.

use crate::token::{cost, ContentPayload};
use ballast_core::{
    compute_content_hash, BallastResult, ContentId, ContentItem, ContentType, ContextId,
    ContextItem, Edge, EdgeType, TokenError, UnknownContentPolicy,
};
use ballast_store::{ContentUpdate, GraphMutation, GraphStore};
use std::sync::Arc;
use tracing::warn;

/// Creates and maintains content items and their context attachments.
pub struct ContentIngest<S> {
    store: Arc<S>,
    policy: UnknownContentPolicy,
}

impl<S: GraphStore> ContentIngest<S> {
    pub fn new(store: Arc<S>, policy: UnknownContentPolicy) -> Self {
        Self { store, policy }
    }

    /// Ingest a payload and attach it to a context in one atomic batch.
    ///
    /// Token cost and payload hash are computed here, once; optimization
    /// passes reuse the cached values.
    pub async fn attach_content(
        &self,
        context_id: ContextId,
        content_type: ContentType,
        payload: &ContentPayload,
        position: i32,
    ) -> BallastResult<(ContentItem, ContextItem)> {
        let tokens = self.tokens_for(payload)?;
        let content = ContentItem::new(
            content_type,
            format!("blob://{}", ballast_core::new_entity_id()),
            compute_content_hash(&payload.canonical_bytes()),
            tokens,
        );
        let item = ContextItem::new(context_id, content.content_id).with_position(position);

        self.store
            .apply_batch(vec![
                GraphMutation::InsertContent(content.clone()),
                GraphMutation::InsertContextItem(item.clone()),
            ])
            .await?;
        Ok((content, item))
    }

    /// Attach already-ingested content to another context.
    pub async fn attach_existing(
        &self,
        context_id: ContextId,
        content_id: ContentId,
        position: i32,
    ) -> BallastResult<ContextItem> {
        let item = ContextItem::new(context_id, content_id).with_position(position);
        self.store.context_item_insert(&item).await?;
        Ok(item)
    }

    /// Detach content from a context. This is a hard delete of the join row,
    /// not a tombstone; the content item itself survives.
    pub async fn detach_content(
        &self,
        context_id: ContextId,
        content_id: ContentId,
    ) -> BallastResult<()> {
        self.store.context_item_delete(context_id, content_id).await
    }

    /// Record a payload mutation: recount tokens, rehash, bump the version.
    ///
    /// A payload whose hash is unchanged is a no-op and does not bump the
    /// version.
    pub async fn update_payload(
        &self,
        content_id: ContentId,
        payload: &ContentPayload,
    ) -> BallastResult<ContentItem> {
        let current = self
            .store
            .content_get(content_id)
            .await?
            .ok_or(ballast_core::GraphError::NotFound {
                entity_type: ballast_core::EntityType::ContentItem,
                id: content_id,
            })?;

        let payload_hash = compute_content_hash(&payload.canonical_bytes());
        if payload_hash == current.payload_hash {
            return Ok(current);
        }

        let tokens = self.tokens_for(payload)?;
        self.store
            .content_update(
                content_id,
                ContentUpdate {
                    payload_hash: Some(payload_hash),
                    tokens: Some(tokens),
                    ..Default::default()
                },
            )
            .await?;

        self.store
            .content_get(content_id)
            .await?
            .ok_or_else(|| {
                ballast_core::GraphError::NotFound {
                    entity_type: ballast_core::EntityType::ContentItem,
                    id: content_id,
                }
                .into()
            })
    }

    /// Relate two content items.
    ///
    /// Symmetric relations are stored as two directed edges, inserted in one
    /// atomic batch so a duplicate in either direction rejects both.
    pub async fn relate_content(
        &self,
        source_id: ContentId,
        target_id: ContentId,
        edge_type: EdgeType,
        metadata: Option<serde_json::Value>,
    ) -> BallastResult<()> {
        let mut edge = Edge::new(source_id, target_id, edge_type);
        if let Some(metadata) = metadata {
            edge = edge.with_metadata(metadata);
        }

        if edge_type.is_symmetric() {
            let mirror = edge.reversed();
            self.store
                .apply_batch(vec![
                    GraphMutation::InsertEdge(edge),
                    GraphMutation::InsertEdge(mirror),
                ])
                .await
        } else {
            self.store.edge_insert(&edge).await
        }
    }

    /// Cost a payload under the configured unknown-content policy.
    fn tokens_for(&self, payload: &ContentPayload) -> Result<Option<i32>, TokenError> {
        match cost(payload) {
            Ok(tokens) => Ok(Some(tokens)),
            Err(err) => match self.policy {
                UnknownContentPolicy::Reject => Err(err),
                UnknownContentPolicy::SkipAndFlag => {
                    warn!(error = %err, "payload could not be costed, storing uncosted");
                    Ok(None)
                }
            },
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use ballast_core::{new_entity_id, BallastError, Context, GraphError};
    use ballast_store::{Direction, MemoryGraph};

    fn ingest(store: &Arc<MemoryGraph>, policy: UnknownContentPolicy) -> ContentIngest<MemoryGraph> {
        ContentIngest::new(Arc::clone(store), policy)
    }

    async fn insert_context(store: &MemoryGraph) -> Context {
        let context = Context::new(new_entity_id(), "ctx");
        store.context_insert(&context).await.unwrap();
        context
    }

    #[tokio::test]
    async fn test_attach_costs_and_joins() {
        let store = Arc::new(MemoryGraph::new());
        let ingest = ingest(&store, UnknownContentPolicy::default());
        let context = insert_context(&store).await;

        let payload = ContentPayload::Text("hello world".to_string());
        let (content, item) = ingest
            .attach_content(context.context_id, ContentType::Text, &payload, 3)
            .await
            .unwrap();

        assert_eq!(content.tokens, Some(4));
        assert_eq!(content.version, 1);
        assert_eq!(item.position, 3);
        assert_eq!(
            store
                .context_item_list(context.context_id)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_update_payload_bumps_version_and_recounts() {
        let store = Arc::new(MemoryGraph::new());
        let ingest = ingest(&store, UnknownContentPolicy::default());
        let context = insert_context(&store).await;

        let (content, _) = ingest
            .attach_content(
                context.context_id,
                ContentType::Text,
                &ContentPayload::Text("short".to_string()),
                0,
            )
            .await
            .unwrap();

        let updated = ingest
            .update_payload(
                content.content_id,
                &ContentPayload::Text("a noticeably longer payload".to_string()),
            )
            .await
            .unwrap();
        assert_eq!(updated.version, 2);
        assert!(updated.tokens.unwrap() > content.tokens.unwrap());

        // Same payload again: hash unchanged, version untouched.
        let unchanged = ingest
            .update_payload(
                content.content_id,
                &ContentPayload::Text("a noticeably longer payload".to_string()),
            )
            .await
            .unwrap();
        assert_eq!(unchanged.version, 2);
    }

    #[tokio::test]
    async fn test_opaque_payload_policy_reject() {
        let store = Arc::new(MemoryGraph::new());
        let ingest = ingest(&store, UnknownContentPolicy::Reject);
        let context = insert_context(&store).await;

        let err = ingest
            .attach_content(
                context.context_id,
                ContentType::Text,
                &ContentPayload::Opaque {
                    kind: "application/x-parquet".to_string(),
                },
                0,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BallastError::Token(_)));
        // Nothing was stored.
        assert_eq!(store.context_item_count(), 0);
    }

    #[tokio::test]
    async fn test_opaque_payload_policy_skip_stores_uncosted() {
        let store = Arc::new(MemoryGraph::new());
        let ingest = ingest(&store, UnknownContentPolicy::SkipAndFlag);
        let context = insert_context(&store).await;

        let (content, _) = ingest
            .attach_content(
                context.context_id,
                ContentType::Text,
                &ContentPayload::Opaque {
                    kind: "application/x-parquet".to_string(),
                },
                0,
            )
            .await
            .unwrap();
        assert_eq!(content.tokens, None);
        assert!(!content.is_costed());
    }

    #[tokio::test]
    async fn test_detach_is_a_hard_delete() {
        let store = Arc::new(MemoryGraph::new());
        let ingest = ingest(&store, UnknownContentPolicy::default());
        let context = insert_context(&store).await;

        let (content, _) = ingest
            .attach_content(
                context.context_id,
                ContentType::Text,
                &ContentPayload::Text("x".to_string()),
                0,
            )
            .await
            .unwrap();

        ingest
            .detach_content(context.context_id, content.content_id)
            .await
            .unwrap();
        assert_eq!(store.context_item_count(), 0);
        // The content item itself survives detachment.
        assert!(store
            .content_get(content.content_id)
            .await
            .unwrap()
            .is_some());

        let err = ingest
            .detach_content(context.context_id, content.content_id)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BallastError::Graph(GraphError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_similar_to_is_mirrored() {
        let store = Arc::new(MemoryGraph::new());
        let ingest = ingest(&store, UnknownContentPolicy::default());
        let a = new_entity_id();
        let b = new_entity_id();

        ingest
            .relate_content(a, b, EdgeType::SimilarTo, None)
            .await
            .unwrap();
        assert_eq!(store.edge_count(), 2);

        let forward = store
            .neighbors(a, EdgeType::SimilarTo, Direction::Outgoing)
            .await
            .unwrap();
        let backward = store
            .neighbors(b, EdgeType::SimilarTo, Direction::Outgoing)
            .await
            .unwrap();
        assert_eq!(forward, vec![b]);
        assert_eq!(backward, vec![a]);

        // Re-relating trips the duplicate key in either direction and the
        // batch leaves the edge count untouched.
        assert!(ingest
            .relate_content(b, a, EdgeType::SimilarTo, None)
            .await
            .is_err());
        assert_eq!(store.edge_count(), 2);
    }

    #[tokio::test]
    async fn test_directed_relation_single_edge() {
        let store = Arc::new(MemoryGraph::new());
        let ingest = ingest(&store, UnknownContentPolicy::default());
        let a = new_entity_id();
        let b = new_entity_id();

        ingest
            .relate_content(a, b, EdgeType::DerivedFrom, None)
            .await
            .unwrap();
        assert_eq!(store.edge_count(), 1);
    }
}
