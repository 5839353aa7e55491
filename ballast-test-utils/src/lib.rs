//! Test fixtures and fault-injecting store wrappers for the Ballast
//! workspace. Everything here is test support; nothing ships in production
//! paths.

use async_trait::async_trait;
use ballast_core::{
    compute_content_hash, new_entity_id, BallastResult, ContentId, ContentItem, ContentType,
    Context, ContextId, ContextItem, Edge, EdgeType, GraphError, ProjectId,
};
use ballast_store::{
    ContextItemUpdate, ContextUpdate, ContentUpdate, Direction, GraphMutation, GraphStore,
    MemoryGraph,
};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use uuid::Uuid;

// ============================================================================
// FIXTURES
// ============================================================================

/// A context with default settings in the given project.
pub fn make_context(project_id: ProjectId) -> Context {
    Context::new(project_id, "test-context")
}

/// A text content item with an explicit cached token cost.
pub fn make_content(tokens: i32) -> ContentItem {
    ContentItem::new(
        ContentType::Text,
        format!("blob://{}", new_entity_id()),
        compute_content_hash(format!("payload-{}", new_entity_id()).as_bytes()),
        Some(tokens),
    )
}

/// Insert a context and return it.
pub async fn seed_context(store: &dyn GraphStore, project_id: ProjectId) -> BallastResult<Context> {
    let context = make_context(project_id);
    store.context_insert(&context).await?;
    Ok(context)
}

/// Insert a content item and attach it to a context.
pub async fn seed_attached(
    store: &dyn GraphStore,
    context_id: ContextId,
    tokens: i32,
    relevance: f32,
    position: i32,
) -> BallastResult<ContentItem> {
    let content = make_content(tokens);
    store.content_insert(&content).await?;
    store
        .context_item_insert(
            &ContextItem::new(context_id, content.content_id)
                .with_relevance(relevance)
                .with_position(position),
        )
        .await?;
    Ok(content)
}

// ============================================================================
// FAULT INJECTION
// ============================================================================

/// Store wrapper that injects failures at configurable points.
///
/// - `fail_item_updates`: every `context_item_update` fails as unavailable,
///   for exercising optimistic rollback.
/// - `poison_batch_at(n)`: the next `apply_batch` has a guaranteed-failing
///   mutation spliced in after the first `n`, so the batch dies mid-apply.
///   The wrapped store's atomicity decides what stays visible.
#[derive(Debug)]
pub struct FailingGraph {
    inner: MemoryGraph,
    fail_item_updates: AtomicBool,
    poison_batch_at: AtomicI64,
}

impl FailingGraph {
    pub fn new() -> Self {
        Self {
            inner: MemoryGraph::new(),
            fail_item_updates: AtomicBool::new(false),
            poison_batch_at: AtomicI64::new(-1),
        }
    }

    /// The wrapped store, for seeding and direct assertions.
    pub fn inner(&self) -> &MemoryGraph {
        &self.inner
    }

    /// Make every context item update fail until disarmed.
    pub fn set_fail_item_updates(&self, fail: bool) {
        self.fail_item_updates.store(fail, Ordering::SeqCst);
    }

    /// Poison the next batch after `n` applied mutations.
    pub fn poison_batch_at(&self, n: usize) {
        self.poison_batch_at.store(n as i64, Ordering::SeqCst);
    }
}

#[async_trait]
impl GraphStore for FailingGraph {
    async fn context_insert(&self, c: &Context) -> BallastResult<()> {
        self.inner.context_insert(c).await
    }

    async fn context_get(&self, id: ContextId) -> BallastResult<Option<Context>> {
        self.inner.context_get(id).await
    }

    async fn context_update(&self, id: ContextId, update: ContextUpdate) -> BallastResult<()> {
        self.inner.context_update(id, update).await
    }

    async fn context_set_parent(
        &self,
        id: ContextId,
        parent_context_id: Option<ContextId>,
    ) -> BallastResult<()> {
        self.inner.context_set_parent(id, parent_context_id).await
    }

    async fn context_delete(&self, id: ContextId) -> BallastResult<()> {
        self.inner.context_delete(id).await
    }

    async fn context_children(&self, id: ContextId) -> BallastResult<Vec<Context>> {
        self.inner.context_children(id).await
    }

    async fn context_list_by_project(&self, project_id: ProjectId) -> BallastResult<Vec<Context>> {
        self.inner.context_list_by_project(project_id).await
    }

    async fn content_insert(&self, item: &ContentItem) -> BallastResult<()> {
        self.inner.content_insert(item).await
    }

    async fn content_get(&self, id: ContentId) -> BallastResult<Option<ContentItem>> {
        self.inner.content_get(id).await
    }

    async fn content_update(&self, id: ContentId, update: ContentUpdate) -> BallastResult<()> {
        self.inner.content_update(id, update).await
    }

    async fn context_item_insert(&self, item: &ContextItem) -> BallastResult<()> {
        self.inner.context_item_insert(item).await
    }

    async fn context_item_get(
        &self,
        context_id: ContextId,
        content_id: ContentId,
    ) -> BallastResult<Option<ContextItem>> {
        self.inner.context_item_get(context_id, content_id).await
    }

    async fn context_item_update(
        &self,
        context_id: ContextId,
        content_id: ContentId,
        update: ContextItemUpdate,
    ) -> BallastResult<()> {
        if self.fail_item_updates.load(Ordering::SeqCst) {
            return Err(GraphError::Unavailable {
                reason: "injected fault".to_string(),
            }
            .into());
        }
        self.inner
            .context_item_update(context_id, content_id, update)
            .await
    }

    async fn context_item_delete(
        &self,
        context_id: ContextId,
        content_id: ContentId,
    ) -> BallastResult<()> {
        self.inner.context_item_delete(context_id, content_id).await
    }

    async fn context_item_list(&self, context_id: ContextId) -> BallastResult<Vec<ContextItem>> {
        self.inner.context_item_list(context_id).await
    }

    async fn edge_insert(&self, e: &Edge) -> BallastResult<()> {
        self.inner.edge_insert(e).await
    }

    async fn edge_delete(
        &self,
        source_id: Uuid,
        target_id: Uuid,
        edge_type: EdgeType,
    ) -> BallastResult<()> {
        self.inner.edge_delete(source_id, target_id, edge_type).await
    }

    async fn neighbors(
        &self,
        id: Uuid,
        edge_type: EdgeType,
        direction: Direction,
    ) -> BallastResult<Vec<Uuid>> {
        self.inner.neighbors(id, edge_type, direction).await
    }

    async fn apply_batch(&self, mutations: Vec<GraphMutation>) -> BallastResult<()> {
        let poison_at = self.poison_batch_at.swap(-1, Ordering::SeqCst);
        if poison_at >= 0 {
            let mut poisoned: Vec<GraphMutation> =
                mutations.into_iter().take(poison_at as usize).collect();
            // Deleting a join row that cannot exist fails deterministically.
            poisoned.push(GraphMutation::DeleteContextItem {
                context_id: new_entity_id(),
                content_id: new_entity_id(),
            });
            return self.inner.apply_batch(poisoned).await;
        }
        self.inner.apply_batch(mutations).await
    }
}

// ============================================================================
// WRITE COUNTING
// ============================================================================

/// Store wrapper that counts writes, for debounce and coalescing assertions.
#[derive(Debug, Default)]
pub struct CountingGraph {
    inner: MemoryGraph,
    item_updates: AtomicUsize,
    batches: AtomicUsize,
}

impl CountingGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &MemoryGraph {
        &self.inner
    }

    /// Number of `context_item_update` calls so far.
    pub fn item_update_count(&self) -> usize {
        self.item_updates.load(Ordering::SeqCst)
    }

    /// Number of `apply_batch` calls so far.
    pub fn batch_count(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GraphStore for CountingGraph {
    async fn context_insert(&self, c: &Context) -> BallastResult<()> {
        self.inner.context_insert(c).await
    }

    async fn context_get(&self, id: ContextId) -> BallastResult<Option<Context>> {
        self.inner.context_get(id).await
    }

    async fn context_update(&self, id: ContextId, update: ContextUpdate) -> BallastResult<()> {
        self.inner.context_update(id, update).await
    }

    async fn context_set_parent(
        &self,
        id: ContextId,
        parent_context_id: Option<ContextId>,
    ) -> BallastResult<()> {
        self.inner.context_set_parent(id, parent_context_id).await
    }

    async fn context_delete(&self, id: ContextId) -> BallastResult<()> {
        self.inner.context_delete(id).await
    }

    async fn context_children(&self, id: ContextId) -> BallastResult<Vec<Context>> {
        self.inner.context_children(id).await
    }

    async fn context_list_by_project(&self, project_id: ProjectId) -> BallastResult<Vec<Context>> {
        self.inner.context_list_by_project(project_id).await
    }

    async fn content_insert(&self, item: &ContentItem) -> BallastResult<()> {
        self.inner.content_insert(item).await
    }

    async fn content_get(&self, id: ContentId) -> BallastResult<Option<ContentItem>> {
        self.inner.content_get(id).await
    }

    async fn content_update(&self, id: ContentId, update: ContentUpdate) -> BallastResult<()> {
        self.inner.content_update(id, update).await
    }

    async fn context_item_insert(&self, item: &ContextItem) -> BallastResult<()> {
        self.inner.context_item_insert(item).await
    }

    async fn context_item_get(
        &self,
        context_id: ContextId,
        content_id: ContentId,
    ) -> BallastResult<Option<ContextItem>> {
        self.inner.context_item_get(context_id, content_id).await
    }

    async fn context_item_update(
        &self,
        context_id: ContextId,
        content_id: ContentId,
        update: ContextItemUpdate,
    ) -> BallastResult<()> {
        self.item_updates.fetch_add(1, Ordering::SeqCst);
        self.inner
            .context_item_update(context_id, content_id, update)
            .await
    }

    async fn context_item_delete(
        &self,
        context_id: ContextId,
        content_id: ContentId,
    ) -> BallastResult<()> {
        self.inner.context_item_delete(context_id, content_id).await
    }

    async fn context_item_list(&self, context_id: ContextId) -> BallastResult<Vec<ContextItem>> {
        self.inner.context_item_list(context_id).await
    }

    async fn edge_insert(&self, e: &Edge) -> BallastResult<()> {
        self.inner.edge_insert(e).await
    }

    async fn edge_delete(
        &self,
        source_id: Uuid,
        target_id: Uuid,
        edge_type: EdgeType,
    ) -> BallastResult<()> {
        self.inner.edge_delete(source_id, target_id, edge_type).await
    }

    async fn neighbors(
        &self,
        id: Uuid,
        edge_type: EdgeType,
        direction: Direction,
    ) -> BallastResult<Vec<Uuid>> {
        self.inner.neighbors(id, edge_type, direction).await
    }

    async fn apply_batch(&self, mutations: Vec<GraphMutation>) -> BallastResult<()> {
        self.batches.fetch_add(1, Ordering::SeqCst);
        self.inner.apply_batch(mutations).await
    }
}

// ============================================================================
// TESTS
// ============================================================================
