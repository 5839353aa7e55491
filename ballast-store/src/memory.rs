//! In-memory graph store backed by an embedded adjacency structure.

use crate::{
    ContextItemUpdate, ContextUpdate, ContentUpdate, Direction, GraphMutation, GraphStore,
};
use async_trait::async_trait;
use ballast_core::{
    BallastResult, ContentId, ContentItem, Context, ContextId, ContextItem, Edge, EdgeType,
    EntityType, GraphError, ProjectId,
};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

type EdgeKey = (Uuid, Uuid, EdgeType);

/// The mutable tables. Batches stage a clone of this and swap it in on
/// success, which is what makes `apply_batch` atomic.
#[derive(Debug, Default, Clone)]
struct Inner {
    contexts: HashMap<ContextId, Context>,
    contents: HashMap<ContentId, ContentItem>,
    items: HashMap<(ContextId, ContentId), ContextItem>,
    edges: HashMap<EdgeKey, Edge>,
}

impl Inner {
    fn insert_context(&mut self, c: &Context) -> BallastResult<()> {
        if self.contexts.contains_key(&c.context_id) {
            return Err(GraphError::AlreadyExists {
                entity_type: EntityType::Context,
                id: c.context_id,
            }
            .into());
        }
        self.contexts.insert(c.context_id, c.clone());
        Ok(())
    }

    fn update_context(&mut self, id: ContextId, update: ContextUpdate) -> BallastResult<()> {
        let context = self.contexts.get_mut(&id).ok_or(GraphError::NotFound {
            entity_type: EntityType::Context,
            id,
        })?;
        if let Some(name) = update.name {
            context.name = name;
        }
        if let Some(is_active) = update.is_active {
            context.is_active = is_active;
        }
        if let Some(settings) = update.settings {
            context.settings = settings;
        }
        context.updated_at = Utc::now();
        Ok(())
    }

    fn set_parent(
        &mut self,
        id: ContextId,
        parent_context_id: Option<ContextId>,
    ) -> BallastResult<()> {
        let context = self.contexts.get_mut(&id).ok_or(GraphError::NotFound {
            entity_type: EntityType::Context,
            id,
        })?;
        let old_parent = context.parent_context_id;
        context.parent_context_id = parent_context_id;
        context.updated_at = Utc::now();

        // Keep the ParentOf adjacency in step with the ownership column.
        if let Some(old) = old_parent {
            self.edges.remove(&(old, id, EdgeType::ParentOf));
        }
        if let Some(new) = parent_context_id {
            self.edges
                .insert((new, id, EdgeType::ParentOf), Edge::new(new, id, EdgeType::ParentOf));
        }
        Ok(())
    }

    fn delete_context(&mut self, id: ContextId) -> BallastResult<()> {
        if self.contexts.remove(&id).is_none() {
            return Err(GraphError::NotFound {
                entity_type: EntityType::Context,
                id,
            }
            .into());
        }
        self.items.retain(|(context_id, _), _| *context_id != id);
        self.edges
            .retain(|(source, target, _), _| *source != id && *target != id);
        Ok(())
    }

    fn insert_content(&mut self, item: &ContentItem) -> BallastResult<()> {
        if self.contents.contains_key(&item.content_id) {
            return Err(GraphError::AlreadyExists {
                entity_type: EntityType::ContentItem,
                id: item.content_id,
            }
            .into());
        }
        self.contents.insert(item.content_id, item.clone());
        Ok(())
    }

    fn update_content(&mut self, id: ContentId, update: ContentUpdate) -> BallastResult<()> {
        let is_payload_change = update.is_payload_change();
        let content = self.contents.get_mut(&id).ok_or(GraphError::NotFound {
            entity_type: EntityType::ContentItem,
            id,
        })?;
        if let Some(content_type) = update.content_type {
            content.content_type = content_type;
        }
        if let Some(payload_ref) = update.payload_ref {
            content.payload_ref = payload_ref;
        }
        if let Some(payload_hash) = update.payload_hash {
            content.payload_hash = payload_hash;
        }
        if let Some(tokens) = update.tokens {
            content.tokens = tokens;
        }
        if let Some(tags) = update.tags {
            content.tags = tags;
        }
        if is_payload_change {
            content.version += 1;
        }
        content.updated_at = Utc::now();
        Ok(())
    }

    fn insert_item(&mut self, item: &ContextItem) -> BallastResult<()> {
        let key = (item.context_id, item.content_id);
        if self.items.contains_key(&key) {
            return Err(GraphError::AlreadyExists {
                entity_type: EntityType::ContextItem,
                id: item.content_id,
            }
            .into());
        }
        self.items.insert(key, item.clone());
        Ok(())
    }

    fn update_item(
        &mut self,
        context_id: ContextId,
        content_id: ContentId,
        update: ContextItemUpdate,
    ) -> BallastResult<()> {
        let item = self
            .items
            .get_mut(&(context_id, content_id))
            .ok_or(GraphError::NotFound {
                entity_type: EntityType::ContextItem,
                id: content_id,
            })?;
        if let Some(relevance_score) = update.relevance_score {
            item.relevance_score = relevance_score;
        }
        if let Some(position) = update.position {
            item.position = position;
        }
        if let Some(selected) = update.selected {
            item.selected = selected;
        }
        if let Some(pending_selected) = update.pending_selected {
            item.pending_selected = pending_selected;
        }
        item.updated_at = Utc::now();
        Ok(())
    }

    fn delete_item(&mut self, context_id: ContextId, content_id: ContentId) -> BallastResult<()> {
        if self.items.remove(&(context_id, content_id)).is_none() {
            return Err(GraphError::NotFound {
                entity_type: EntityType::ContextItem,
                id: content_id,
            }
            .into());
        }
        Ok(())
    }

    fn insert_edge(&mut self, e: &Edge) -> BallastResult<()> {
        let key = e.key();
        if self.edges.contains_key(&key) {
            return Err(GraphError::DuplicateEdge {
                source_id: e.source_id,
                target_id: e.target_id,
                edge_type: e.edge_type,
            }
            .into());
        }
        self.edges.insert(key, e.clone());
        Ok(())
    }

    fn delete_edge(
        &mut self,
        source_id: Uuid,
        target_id: Uuid,
        edge_type: EdgeType,
    ) -> BallastResult<()> {
        if self
            .edges
            .remove(&(source_id, target_id, edge_type))
            .is_none()
        {
            return Err(GraphError::NotFound {
                entity_type: EntityType::Edge,
                id: source_id,
            }
            .into());
        }
        Ok(())
    }

    fn apply(&mut self, mutation: GraphMutation) -> BallastResult<()> {
        match mutation {
            GraphMutation::InsertContext(c) => self.insert_context(&c),
            GraphMutation::UpdateContext { context_id, update } => {
                self.update_context(context_id, update)
            }
            GraphMutation::SetParent {
                context_id,
                parent_context_id,
            } => self.set_parent(context_id, parent_context_id),
            GraphMutation::DeleteContext(id) => self.delete_context(id),
            GraphMutation::InsertContent(item) => self.insert_content(&item),
            GraphMutation::UpdateContent { content_id, update } => {
                self.update_content(content_id, update)
            }
            GraphMutation::InsertContextItem(item) => self.insert_item(&item),
            GraphMutation::UpdateContextItem {
                context_id,
                content_id,
                update,
            } => self.update_item(context_id, content_id, update),
            GraphMutation::DeleteContextItem {
                context_id,
                content_id,
            } => self.delete_item(context_id, content_id),
            GraphMutation::InsertEdge(e) => self.insert_edge(&e),
            GraphMutation::DeleteEdge {
                source_id,
                target_id,
                edge_type,
            } => self.delete_edge(source_id, target_id, edge_type),
        }
    }
}

/// In-memory graph store.
///
/// Cheap to clone; clones share the same tables.
#[derive(Debug, Default, Clone)]
pub struct MemoryGraph {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryGraph {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all stored data.
    pub fn clear(&self) -> BallastResult<()> {
        let mut inner = self.write()?;
        *inner = Inner::default();
        Ok(())
    }

    /// Count of stored contexts.
    pub fn context_count(&self) -> usize {
        self.inner.read().map(|i| i.contexts.len()).unwrap_or(0)
    }

    /// Count of stored context items.
    pub fn context_item_count(&self) -> usize {
        self.inner.read().map(|i| i.items.len()).unwrap_or(0)
    }

    /// Count of stored edges.
    pub fn edge_count(&self) -> usize {
        self.inner.read().map(|i| i.edges.len()).unwrap_or(0)
    }

    fn read(&self) -> BallastResult<std::sync::RwLockReadGuard<'_, Inner>> {
        self.inner.read().map_err(|_| GraphError::LockPoisoned.into())
    }

    fn write(&self) -> BallastResult<std::sync::RwLockWriteGuard<'_, Inner>> {
        self.inner.write().map_err(|_| GraphError::LockPoisoned.into())
    }
}

#[async_trait]
impl GraphStore for MemoryGraph {
    async fn context_insert(&self, c: &Context) -> BallastResult<()> {
        self.write()?.insert_context(c)
    }

    async fn context_get(&self, id: ContextId) -> BallastResult<Option<Context>> {
        Ok(self.read()?.contexts.get(&id).cloned())
    }

    async fn context_update(&self, id: ContextId, update: ContextUpdate) -> BallastResult<()> {
        self.write()?.update_context(id, update)
    }

    async fn context_set_parent(
        &self,
        id: ContextId,
        parent_context_id: Option<ContextId>,
    ) -> BallastResult<()> {
        self.write()?.set_parent(id, parent_context_id)
    }

    async fn context_delete(&self, id: ContextId) -> BallastResult<()> {
        self.write()?.delete_context(id)
    }

    async fn context_children(&self, id: ContextId) -> BallastResult<Vec<Context>> {
        let inner = self.read()?;
        let mut children: Vec<Context> = inner
            .contexts
            .values()
            .filter(|c| c.parent_context_id == Some(id))
            .cloned()
            .collect();
        children.sort_by_key(|c| c.context_id);
        Ok(children)
    }

    async fn context_list_by_project(&self, project_id: ProjectId) -> BallastResult<Vec<Context>> {
        let inner = self.read()?;
        let mut contexts: Vec<Context> = inner
            .contexts
            .values()
            .filter(|c| c.project_id == project_id)
            .cloned()
            .collect();
        contexts.sort_by_key(|c| c.context_id);
        Ok(contexts)
    }

    async fn content_insert(&self, item: &ContentItem) -> BallastResult<()> {
        self.write()?.insert_content(item)
    }

    async fn content_get(&self, id: ContentId) -> BallastResult<Option<ContentItem>> {
        Ok(self.read()?.contents.get(&id).cloned())
    }

    async fn content_update(&self, id: ContentId, update: ContentUpdate) -> BallastResult<()> {
        self.write()?.update_content(id, update)
    }

    async fn context_item_insert(&self, item: &ContextItem) -> BallastResult<()> {
        self.write()?.insert_item(item)
    }

    async fn context_item_get(
        &self,
        context_id: ContextId,
        content_id: ContentId,
    ) -> BallastResult<Option<ContextItem>> {
        Ok(self.read()?.items.get(&(context_id, content_id)).cloned())
    }

    async fn context_item_update(
        &self,
        context_id: ContextId,
        content_id: ContentId,
        update: ContextItemUpdate,
    ) -> BallastResult<()> {
        self.write()?.update_item(context_id, content_id, update)
    }

    async fn context_item_delete(
        &self,
        context_id: ContextId,
        content_id: ContentId,
    ) -> BallastResult<()> {
        self.write()?.delete_item(context_id, content_id)
    }

    async fn context_item_list(&self, context_id: ContextId) -> BallastResult<Vec<ContextItem>> {
        let inner = self.read()?;
        let mut items: Vec<ContextItem> = inner
            .items
            .values()
            .filter(|i| i.context_id == context_id)
            .cloned()
            .collect();
        items.sort_by_key(|i| (i.position, i.content_id));
        Ok(items)
    }

    async fn edge_insert(&self, e: &Edge) -> BallastResult<()> {
        self.write()?.insert_edge(e)
    }

    async fn edge_delete(
        &self,
        source_id: Uuid,
        target_id: Uuid,
        edge_type: EdgeType,
    ) -> BallastResult<()> {
        self.write()?.delete_edge(source_id, target_id, edge_type)
    }

    async fn neighbors(
        &self,
        id: Uuid,
        edge_type: EdgeType,
        direction: Direction,
    ) -> BallastResult<Vec<Uuid>> {
        let inner = self.read()?;
        let mut neighbors: Vec<Uuid> = inner
            .edges
            .values()
            .filter(|e| e.edge_type == edge_type)
            .filter_map(|e| match direction {
                Direction::Outgoing if e.source_id == id => Some(e.target_id),
                Direction::Incoming if e.target_id == id => Some(e.source_id),
                _ => None,
            })
            .collect();
        neighbors.sort();
        Ok(neighbors)
    }

    async fn apply_batch(&self, mutations: Vec<GraphMutation>) -> BallastResult<()> {
        let mut inner = self.write()?;
        // Stage against a copy so a failing mutation leaves nothing visible.
        let mut staged = inner.clone();
        for mutation in mutations {
            staged.apply(mutation)?;
        }
        *inner = staged;
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
