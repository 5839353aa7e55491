//! Context hierarchy management.
//!
//! Maintains the parent tree, guarantees acyclicity at mutation time, derives
//! effective candidate sets by walking the hierarchy, and clones contexts
//! atomically. Every traversal is depth-capped so it terminates even over an
//! inconsistent store.

use ballast_core::{
    BallastResult, Context, ContextId, ContextItem, Edge, EdgeType, EntityType, GraphError,
    HierarchyError, InheritancePolicy, ProjectId, new_entity_id,
};
use ballast_store::{GraphMutation, GraphStore};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::info;

/// A context item surfaced by a hierarchy walk, tagged with its distance
/// from the querying context (0 = own item). The distance is an input to
/// relevance dampening downstream; it is not interpreted here.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveCandidate {
    pub item: ContextItem,
    pub distance: u32,
}

/// A materialized subtree of a project's context hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextTree {
    pub context: Context,
    pub children: Vec<ContextTree>,
}

/// Manages parent/child relationships between contexts.
pub struct HierarchyManager<S> {
    store: Arc<S>,
    max_depth: u32,
}

impl<S: GraphStore> HierarchyManager<S> {
    /// Create a manager over a store with a traversal depth cap.
    pub fn new(store: Arc<S>, max_depth: u32) -> Self {
        Self { store, max_depth }
    }

    /// Walk the ancestor chain of a context, nearest first.
    ///
    /// Fails with `TooDeep` when the chain exceeds the depth cap, which also
    /// bounds the damage of a corrupted (cyclic) parent column.
    pub async fn ancestors(&self, context_id: ContextId) -> BallastResult<Vec<ContextId>> {
        let mut chain = Vec::new();
        let mut current = self.require_context(context_id).await?.parent_context_id;

        while let Some(ancestor_id) = current {
            if chain.len() as u32 >= self.max_depth {
                return Err(HierarchyError::TooDeep {
                    context_id,
                    max_depth: self.max_depth,
                }
                .into());
            }
            chain.push(ancestor_id);
            current = self
                .require_context(ancestor_id)
                .await?
                .parent_context_id;
        }
        Ok(chain)
    }

    /// Set or clear a context's parent, rejecting moves that would create a
    /// cycle. On rejection the hierarchy is left unchanged.
    pub async fn set_parent(
        &self,
        context_id: ContextId,
        new_parent: Option<ContextId>,
    ) -> BallastResult<()> {
        self.require_context(context_id).await?;

        if let Some(parent_id) = new_parent {
            if parent_id == context_id {
                return Err(HierarchyError::CycleDetected {
                    context_id,
                    chain: vec![context_id],
                }
                .into());
            }
            // The move is illegal iff the context being moved already sits in
            // the proposed parent's ancestor chain.
            let mut chain = vec![parent_id];
            chain.extend(self.ancestors(parent_id).await?);
            if chain.contains(&context_id) {
                return Err(HierarchyError::CycleDetected { context_id, chain }.into());
            }
        }

        self.store.context_set_parent(context_id, new_parent).await
    }

    /// Derive the effective candidate set for a context.
    ///
    /// When the same content appears at several hierarchy levels, the
    /// occurrence nearest to the querying context wins.
    pub async fn effective_candidates(
        &self,
        context_id: ContextId,
        policy: InheritancePolicy,
    ) -> BallastResult<Vec<EffectiveCandidate>> {
        self.require_context(context_id).await?;

        let mut seen: HashSet<ballast_core::ContentId> = HashSet::new();
        let mut candidates = Vec::new();
        self.collect_level(context_id, 0, &mut seen, &mut candidates)
            .await?;

        match policy {
            InheritancePolicy::OwnOnly => {}
            InheritancePolicy::IncludeAncestors => {
                for (idx, ancestor_id) in self.ancestors(context_id).await?.iter().enumerate() {
                    self.collect_level(*ancestor_id, idx as u32 + 1, &mut seen, &mut candidates)
                        .await?;
                }
            }
            InheritancePolicy::IncludeDescendants => {
                let mut queue: VecDeque<(ContextId, u32)> = VecDeque::new();
                for child in self.store.context_children(context_id).await? {
                    queue.push_back((child.context_id, 1));
                }
                while let Some((descendant_id, distance)) = queue.pop_front() {
                    if distance > self.max_depth {
                        return Err(HierarchyError::TooDeep {
                            context_id,
                            max_depth: self.max_depth,
                        }
                        .into());
                    }
                    self.collect_level(descendant_id, distance, &mut seen, &mut candidates)
                        .await?;
                    for child in self.store.context_children(descendant_id).await? {
                        queue.push_back((child.context_id, distance + 1));
                    }
                }
            }
        }

        Ok(candidates)
    }

    /// Deep-copy a context and its items into a project.
    ///
    /// Cloning is shallow by default; `recurse` also clones the sub-context
    /// tree. The whole clone is one atomic batch: either the new context, all
    /// copied items, and the membership edge become visible together, or
    /// nothing does.
    pub async fn clone_context(
        &self,
        source_id: ContextId,
        target_project_id: ProjectId,
        new_name: impl Into<String>,
        recurse: bool,
    ) -> BallastResult<ContextId> {
        let source = self.require_context(source_id).await?;
        let mut mutations = Vec::new();

        let root_clone_id = self
            .stage_clone(&source, target_project_id, new_name.into(), None, &mut mutations)
            .await?;

        if recurse {
            // (source id, clone id of its parent) pairs, walked breadth-first.
            let mut queue: VecDeque<(ContextId, ContextId, u32)> = VecDeque::new();
            for child in self.store.context_children(source_id).await? {
                queue.push_back((child.context_id, root_clone_id, 1));
            }
            while let Some((descendant_id, parent_clone_id, distance)) = queue.pop_front() {
                if distance > self.max_depth {
                    return Err(HierarchyError::TooDeep {
                        context_id: source_id,
                        max_depth: self.max_depth,
                    }
                    .into());
                }
                let descendant = self.require_context(descendant_id).await?;
                let clone_id = self
                    .stage_clone(
                        &descendant,
                        target_project_id,
                        descendant.name.clone(),
                        Some(parent_clone_id),
                        &mut mutations,
                    )
                    .await?;
                for child in self.store.context_children(descendant_id).await? {
                    queue.push_back((child.context_id, clone_id, distance + 1));
                }
            }
        }

        let staged = mutations.len();
        self.store.apply_batch(mutations).await?;
        info!(
            source = %source_id,
            clone = %root_clone_id,
            mutations = staged,
            recurse,
            "cloned context"
        );
        Ok(root_clone_id)
    }

    /// Materialize a project's context hierarchy, roots first.
    pub async fn project_tree(&self, project_id: ProjectId) -> BallastResult<Vec<ContextTree>> {
        let contexts = self.store.context_list_by_project(project_id).await?;
        let ids: HashSet<ContextId> = contexts.iter().map(|c| c.context_id).collect();

        let mut by_parent: HashMap<Option<ContextId>, Vec<Context>> = HashMap::new();
        for context in contexts {
            // A parent outside the project makes the context a local root.
            let key = context
                .parent_context_id
                .filter(|parent| ids.contains(parent));
            by_parent.entry(key).or_default().push(context);
        }

        let roots = by_parent.remove(&None).unwrap_or_default();
        let mut visited = HashSet::new();
        Ok(roots
            .into_iter()
            .map(|root| Self::build_tree(root, &mut by_parent, &mut visited, 0, self.max_depth))
            .collect())
    }

    fn build_tree(
        context: Context,
        by_parent: &mut HashMap<Option<ContextId>, Vec<Context>>,
        visited: &mut HashSet<ContextId>,
        depth: u32,
        max_depth: u32,
    ) -> ContextTree {
        let context_id = context.context_id;
        // Visited tracking plus the cap keeps a corrupted graph from looping.
        if depth >= max_depth || !visited.insert(context_id) {
            return ContextTree {
                context,
                children: Vec::new(),
            };
        }
        let children = by_parent
            .remove(&Some(context_id))
            .unwrap_or_default()
            .into_iter()
            .map(|child| Self::build_tree(child, by_parent, visited, depth + 1, max_depth))
            .collect();
        ContextTree { context, children }
    }

    async fn collect_level(
        &self,
        context_id: ContextId,
        distance: u32,
        seen: &mut HashSet<ballast_core::ContentId>,
        out: &mut Vec<EffectiveCandidate>,
    ) -> BallastResult<()> {
        for item in self.store.context_item_list(context_id).await? {
            if seen.insert(item.content_id) {
                out.push(EffectiveCandidate { item, distance });
            }
        }
        Ok(())
    }

    /// Stage the mutations for one context clone and return the clone's id.
    async fn stage_clone(
        &self,
        source: &Context,
        target_project_id: ProjectId,
        name: String,
        parent_clone_id: Option<ContextId>,
        mutations: &mut Vec<GraphMutation>,
    ) -> BallastResult<ContextId> {
        let now = Utc::now();
        let clone_id = new_entity_id();
        mutations.push(GraphMutation::InsertContext(Context {
            context_id: clone_id,
            project_id: target_project_id,
            parent_context_id: parent_clone_id,
            name,
            is_active: source.is_active,
            settings: source.settings.clone(),
            created_at: now,
            updated_at: now,
        }));
        mutations.push(GraphMutation::InsertEdge(Edge::new(
            target_project_id,
            clone_id,
            EdgeType::HasContext,
        )));
        if let Some(parent_id) = parent_clone_id {
            mutations.push(GraphMutation::InsertEdge(Edge::new(
                parent_id,
                clone_id,
                EdgeType::ParentOf,
            )));
        }

        for item in self.store.context_item_list(source.context_id).await? {
            mutations.push(GraphMutation::InsertContextItem(ContextItem {
                context_id: clone_id,
                content_id: item.content_id,
                relevance_score: item.relevance_score,
                position: item.position,
                // Selection state does not survive a clone.
                selected: false,
                pending_selected: None,
                created_at: now,
                updated_at: now,
            }));
        }
        Ok(clone_id)
    }

    async fn require_context(&self, context_id: ContextId) -> BallastResult<Context> {
        self.store
            .context_get(context_id)
            .await?
            .ok_or_else(|| {
                GraphError::NotFound {
                    entity_type: EntityType::Context,
                    id: context_id,
                }
                .into()
            })
    }
}

// ============================================================================
// TESTS
// ============================================================================
