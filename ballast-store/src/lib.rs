//! Ballast Store - Graph Store Trait and In-Memory Implementation
//!
//! Defines the narrow node/edge abstraction the engine requires from its
//! backing store. Any implementation works: an embedded adjacency structure
//! (provided here as `MemoryGraph`), a relational schema with edge tables,
//! or a dedicated graph engine.

pub mod memory;
pub mod retry;

pub use memory::MemoryGraph;
pub use retry::with_read_retry;

use async_trait::async_trait;
use ballast_core::{
    BallastResult, ContentHash, ContentId, ContentItem, ContentType, Context, ContextId,
    ContextItem, ContextSettings, Edge, EdgeType, ProjectId, TagId,
};
use std::collections::BTreeSet;
use uuid::Uuid;

// ============================================================================
// UPDATE TYPES
// ============================================================================

/// Update payload for contexts.
#[derive(Debug, Clone, Default)]
pub struct ContextUpdate {
    /// New name
    pub name: Option<String>,
    /// Whether the context is active
    pub is_active: Option<bool>,
    /// Replacement settings bag
    pub settings: Option<ContextSettings>,
}

/// Update payload for content items.
///
/// A payload mutation (new ref, hash, type, or token count) bumps the stored
/// version; tag changes do not.
#[derive(Debug, Clone, Default)]
pub struct ContentUpdate {
    /// New content type
    pub content_type: Option<ContentType>,
    /// New payload reference
    pub payload_ref: Option<String>,
    /// New payload hash
    pub payload_hash: Option<ContentHash>,
    /// New cached token count (outer None = leave unchanged,
    /// inner None = payload could not be costed)
    pub tokens: Option<Option<i32>>,
    /// Replacement tag set
    pub tags: Option<BTreeSet<TagId>>,
}

impl ContentUpdate {
    /// Whether this update invalidates the cached token count.
    pub fn is_payload_change(&self) -> bool {
        self.content_type.is_some()
            || self.payload_ref.is_some()
            || self.payload_hash.is_some()
            || self.tokens.is_some()
    }
}

/// Update payload for context items.
#[derive(Debug, Clone, Default)]
pub struct ContextItemUpdate {
    /// New relevance score (range-validated by the caller)
    pub relevance_score: Option<f32>,
    /// New manual position
    pub position: Option<i32>,
    /// New confirmed selection state
    pub selected: Option<bool>,
    /// New optimistic selection state (outer None = leave unchanged,
    /// inner None = clear the pending value)
    pub pending_selected: Option<Option<bool>>,
}

// ============================================================================
// BATCH MUTATIONS
// ============================================================================

/// One mutation in an atomic batch.
///
/// Batches are all-or-nothing: a failing mutation leaves no partial state
/// visible to subsequent reads. Context cloning relies on this.
#[derive(Debug, Clone)]
pub enum GraphMutation {
    InsertContext(Context),
    UpdateContext {
        context_id: ContextId,
        update: ContextUpdate,
    },
    SetParent {
        context_id: ContextId,
        parent_context_id: Option<ContextId>,
    },
    DeleteContext(ContextId),
    InsertContent(ContentItem),
    UpdateContent {
        content_id: ContentId,
        update: ContentUpdate,
    },
    InsertContextItem(ContextItem),
    UpdateContextItem {
        context_id: ContextId,
        content_id: ContentId,
        update: ContextItemUpdate,
    },
    DeleteContextItem {
        context_id: ContextId,
        content_id: ContentId,
    },
    InsertEdge(Edge),
    DeleteEdge {
        source_id: Uuid,
        target_id: Uuid,
        edge_type: EdgeType,
    },
}

/// Direction of a neighbor query relative to the queried node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Edges whose source is the queried node
    Outgoing,
    /// Edges whose target is the queried node
    Incoming,
}

// ============================================================================
// GRAPH STORE TRAIT
// ============================================================================

/// Async store trait for Ballast entities and edges.
///
/// Store calls are the engine's only suspension points. Implementations must
/// be cancellation-safe: a dropped future must not leave partial batch state
/// behind.
#[async_trait]
pub trait GraphStore: Send + Sync {
    // === Context Operations ===

    /// Insert a new context.
    async fn context_insert(&self, c: &Context) -> BallastResult<()>;

    /// Get a context by ID.
    async fn context_get(&self, id: ContextId) -> BallastResult<Option<Context>>;

    /// Update a context.
    async fn context_update(&self, id: ContextId, update: ContextUpdate) -> BallastResult<()>;

    /// Set or clear a context's parent.
    ///
    /// Cycle checking is the hierarchy manager's responsibility; the store
    /// only records the ownership.
    async fn context_set_parent(
        &self,
        id: ContextId,
        parent_context_id: Option<ContextId>,
    ) -> BallastResult<()>;

    /// Delete a context.
    async fn context_delete(&self, id: ContextId) -> BallastResult<()>;

    /// List direct children of a context, ordered by ID.
    async fn context_children(&self, id: ContextId) -> BallastResult<Vec<Context>>;

    /// List all contexts in a project, ordered by ID.
    async fn context_list_by_project(&self, project_id: ProjectId) -> BallastResult<Vec<Context>>;

    // === Content Operations ===

    /// Insert a new content item.
    async fn content_insert(&self, item: &ContentItem) -> BallastResult<()>;

    /// Get a content item by ID.
    async fn content_get(&self, id: ContentId) -> BallastResult<Option<ContentItem>>;

    /// Update a content item. Payload mutations bump the stored version.
    async fn content_update(&self, id: ContentId, update: ContentUpdate) -> BallastResult<()>;

    // === Context Item Operations ===

    /// Attach content to a context.
    async fn context_item_insert(&self, item: &ContextItem) -> BallastResult<()>;

    /// Get a context item by its (context, content) pair.
    async fn context_item_get(
        &self,
        context_id: ContextId,
        content_id: ContentId,
    ) -> BallastResult<Option<ContextItem>>;

    /// Update a context item.
    async fn context_item_update(
        &self,
        context_id: ContextId,
        content_id: ContentId,
        update: ContextItemUpdate,
    ) -> BallastResult<()>;

    /// Detach content from a context (hard delete).
    async fn context_item_delete(
        &self,
        context_id: ContextId,
        content_id: ContentId,
    ) -> BallastResult<()>;

    /// List a context's items, ordered by (position, content id).
    async fn context_item_list(&self, context_id: ContextId) -> BallastResult<Vec<ContextItem>>;

    // === Edge Operations ===

    /// Insert a new edge. Fails with `DuplicateEdge` when an edge with the
    /// same (source, target, type) already exists.
    async fn edge_insert(&self, e: &Edge) -> BallastResult<()>;

    /// Delete an edge by its uniqueness key.
    async fn edge_delete(
        &self,
        source_id: Uuid,
        target_id: Uuid,
        edge_type: EdgeType,
    ) -> BallastResult<()>;

    /// Fetch neighbor IDs by edge type and direction, ordered by ID.
    async fn neighbors(
        &self,
        id: Uuid,
        edge_type: EdgeType,
        direction: Direction,
    ) -> BallastResult<Vec<Uuid>>;

    // === Batch Operations ===

    /// Apply a mutation batch atomically: either every mutation is visible
    /// or none of them are.
    async fn apply_batch(&self, mutations: Vec<GraphMutation>) -> BallastResult<()>;
}
