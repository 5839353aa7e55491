//! Core entity structures

use crate::{
    ContentHash, ContentId, ContentType, ContextId, EdgeId, EdgeType, ProjectId, TagId, Timestamp,
    new_entity_id,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Default relevance score for a context item whose score was never set.
pub const DEFAULT_RELEVANCE: f32 = 0.5;

/// ContentItem - an atomic piece of material with a cached token cost.
/// The payload bytes live in an external blob store; the engine only holds
/// the opaque reference, the hash, and the derived token count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub content_id: ContentId,
    pub content_type: ContentType,
    /// Cached token cost, computed at creation/update.
    /// `None` when the counter could not cost the payload (unsupported type
    /// under the skip-and-flag policy); such items are excluded from
    /// optimization and flagged in the plan.
    pub tokens: Option<i32>,
    /// Opaque handle into the external blob/text store.
    pub payload_ref: String,
    /// SHA-256 of the payload, used to detect payload changes.
    pub payload_hash: ContentHash,
    /// Monotonic version, incremented on each content mutation.
    /// Old versions are retained by the external store, not overwritten.
    pub version: i64,
    pub tags: BTreeSet<TagId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl ContentItem {
    /// Create a new content item with a freshly computed token cost.
    pub fn new(
        content_type: ContentType,
        payload_ref: impl Into<String>,
        payload_hash: ContentHash,
        tokens: Option<i32>,
    ) -> Self {
        let now = Utc::now();
        Self {
            content_id: new_entity_id(),
            content_type,
            tokens,
            payload_ref: payload_ref.into(),
            payload_hash,
            version: 1,
            tags: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Add tags.
    pub fn with_tags(mut self, tags: impl IntoIterator<Item = TagId>) -> Self {
        self.tags.extend(tags);
        self
    }

    /// Record a payload mutation: new hash, new token count, bumped version.
    pub fn apply_payload_change(&mut self, payload_hash: ContentHash, tokens: Option<i32>) {
        self.payload_hash = payload_hash;
        self.tokens = tokens;
        self.version += 1;
        self.updated_at = Utc::now();
    }

    /// Whether the cached token count is usable for optimization.
    pub fn is_costed(&self) -> bool {
        self.tokens.is_some()
    }
}

/// Settings bag carried by a context.
/// The engine reads only `token_budget` and `relevance_threshold`; everything
/// else is opaque and passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ContextSettings {
    /// Default token budget for optimization runs against this context.
    pub token_budget: Option<i32>,
    /// Minimum effective relevance for rankable admission.
    pub relevance_threshold: Option<f32>,
    /// Opaque key/value bag owned by the caller.
    pub metadata: Option<serde_json::Value>,
}

/// Context - a named, hierarchical grouping of content scoping a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Context {
    pub context_id: ContextId,
    pub project_id: ProjectId,
    /// At most one parent; cycles are rejected at mutation time.
    pub parent_context_id: Option<ContextId>,
    pub name: String,
    pub is_active: bool,
    pub settings: ContextSettings,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Context {
    /// Create a new root context in a project.
    pub fn new(project_id: ProjectId, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            context_id: new_entity_id(),
            project_id,
            parent_context_id: None,
            name: name.into(),
            is_active: true,
            settings: ContextSettings::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the parent context.
    pub fn with_parent(mut self, parent_context_id: ContextId) -> Self {
        self.parent_context_id = Some(parent_context_id);
        self
    }

    /// Set the settings bag.
    pub fn with_settings(mut self, settings: ContextSettings) -> Self {
        self.settings = settings;
        self
    }
}

/// ContextItem - the attachment of a ContentItem to a Context.
/// This join entity is the unit the optimizer operates over. It exists iff
/// content has been explicitly attached; removal is a hard delete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextItem {
    pub context_id: ContextId,
    pub content_id: ContentId,
    /// Relevance score in [0, 1], explicit user/system input.
    pub relevance_score: f32,
    /// Stable manual ordering tie-break.
    pub position: i32,
    /// Last server-confirmed selection state.
    pub selected: bool,
    /// Optimistic selection value awaiting confirmation.
    pub pending_selected: Option<bool>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl ContextItem {
    /// Attach content to a context with default relevance and position.
    pub fn new(context_id: ContextId, content_id: ContentId) -> Self {
        let now = Utc::now();
        Self {
            context_id,
            content_id,
            relevance_score: DEFAULT_RELEVANCE,
            position: 0,
            selected: false,
            pending_selected: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the relevance score.
    pub fn with_relevance(mut self, relevance_score: f32) -> Self {
        self.relevance_score = relevance_score;
        self
    }

    /// Set the manual position.
    pub fn with_position(mut self, position: i32) -> Self {
        self.position = position;
        self
    }

    /// Set the confirmed selection state.
    pub fn with_selected(mut self, selected: bool) -> Self {
        self.selected = selected;
        self
    }

    /// Effective selection: the optimistic value when present, otherwise the
    /// confirmed one.
    pub fn effective_selected(&self) -> bool {
        self.pending_selected.unwrap_or(self.selected)
    }
}

/// Edge - a typed, directed relationship between two graph nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub edge_id: EdgeId,
    pub source_id: uuid::Uuid,
    pub target_id: uuid::Uuid,
    pub edge_type: EdgeType,
    pub metadata: Option<serde_json::Value>,
    pub created_at: Timestamp,
}

impl Edge {
    /// Create a new edge.
    pub fn new(source_id: uuid::Uuid, target_id: uuid::Uuid, edge_type: EdgeType) -> Self {
        Self {
            edge_id: new_entity_id(),
            source_id,
            target_id,
            edge_type,
            metadata: None,
            created_at: Utc::now(),
        }
    }

    /// Attach metadata.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Uniqueness key: no two edges may share (source, target, type).
    pub fn key(&self) -> (uuid::Uuid, uuid::Uuid, EdgeType) {
        (self.source_id, self.target_id, self.edge_type)
    }

    /// The mirrored edge for symmetric relations.
    pub fn reversed(&self) -> Self {
        Self {
            edge_id: new_entity_id(),
            source_id: self.target_id,
            target_id: self.source_id,
            edge_type: self.edge_type,
            metadata: self.metadata.clone(),
            created_at: self.created_at,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute_content_hash;

    #[test]
    fn test_content_item_payload_change_bumps_version() {
        let mut item = ContentItem::new(
            ContentType::Text,
            "blob://a",
            compute_content_hash(b"v1"),
            Some(10),
        );
        assert_eq!(item.version, 1);

        item.apply_payload_change(compute_content_hash(b"v2"), Some(12));
        assert_eq!(item.version, 2);
        assert_eq!(item.tokens, Some(12));
        assert!(item.is_costed());
    }

    #[test]
    fn test_uncosted_content_is_flagged() {
        let item = ContentItem::new(
            ContentType::Image,
            "blob://img",
            compute_content_hash(b"img"),
            None,
        );
        assert!(!item.is_costed());
    }

    #[test]
    fn test_context_item_defaults() {
        let item = ContextItem::new(new_entity_id(), new_entity_id());
        assert_eq!(item.relevance_score, DEFAULT_RELEVANCE);
        assert_eq!(item.position, 0);
        assert!(!item.selected);
        assert!(item.pending_selected.is_none());
    }

    #[test]
    fn test_effective_selected_prefers_pending() {
        let mut item = ContextItem::new(new_entity_id(), new_entity_id()).with_selected(true);
        assert!(item.effective_selected());

        item.pending_selected = Some(false);
        assert!(!item.effective_selected());

        item.pending_selected = None;
        assert!(item.effective_selected());
    }

    #[test]
    fn test_edge_key_ignores_identity() {
        let a = new_entity_id();
        let b = new_entity_id();
        let e1 = Edge::new(a, b, EdgeType::SimilarTo);
        let e2 = Edge::new(a, b, EdgeType::SimilarTo);
        assert_ne!(e1.edge_id, e2.edge_id);
        assert_eq!(e1.key(), e2.key());
    }

    #[test]
    fn test_reversed_edge_swaps_endpoints() {
        let a = new_entity_id();
        let b = new_entity_id();
        let edge = Edge::new(a, b, EdgeType::SimilarTo);
        let mirror = edge.reversed();
        assert_eq!(mirror.source_id, b);
        assert_eq!(mirror.target_id, a);
        assert_eq!(mirror.edge_type, EdgeType::SimilarTo);
    }
}
